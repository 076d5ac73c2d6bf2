use thiserror::Error;

use crate::registry::OperatorType;
use crate::tensor::TensorRole;

#[derive(Debug, Error)]
pub enum Error {
    #[error("tensor error: {0}")]
    TensorError(#[from] kitsune_tensor::Error),
    #[error("model is frozen and cannot be mutated")]
    Frozen,
    #[error("model has not been built yet")]
    NotFrozen,
    #[error("model already holds tensors or operations")]
    NotEmpty,
    #[error("inputs and outputs have already been specified")]
    IoAlreadySpecified,
    #[error("inputs and outputs must be specified before build")]
    IoNotSpecified,
    #[error("tensor index {index} out of bounds, model has {count} tensors")]
    IndexOutOfBounds { index: usize, count: usize },
    #[error("no builder registered for operator {0:?}")]
    UnknownOperator(OperatorType),
    #[error("operator {op:?} expects {expected} and got {actual}")]
    ArityMismatch {
        op: OperatorType,
        expected: String,
        actual: usize,
    },
    #[error("tensor index {0} appears in both inputs and outputs")]
    InputOutputOverlap(usize),
    #[error("parameter tensor {0} carries no value")]
    ParameterWithoutValue(usize),
    #[error("tensor {0} already has a value")]
    ValueAlreadySet(usize),
    #[error("tensor {0} has a dynamic shape and cannot hold a value")]
    DynamicConstant(usize),
    #[error("value length {actual} does not match tensor byte size {expected}")]
    ValueLengthMismatch { expected: usize, actual: usize },
    #[error("tensor {0} is an operator parameter and cannot be graph input or output")]
    ParameterAsIo(usize),
    #[error("graph input {0} is produced by an operator")]
    InputIsProduced(usize),
    #[error("invalid fused-activation value {0}")]
    InvalidActivation(i8),
    #[error("operator {op:?} does not accept a parameter with role {role:?}")]
    UnexpectedParameter { op: OperatorType, role: TensorRole },
    #[error("parameter with role {role:?} must be a {expected}")]
    ParameterTypeMismatch {
        role: TensorRole,
        expected: &'static str,
    },
    #[error("operation has already been built")]
    OperationAlreadyBuilt,
    #[error("primitive requested before the operation was built")]
    OperationNotBuilt,
    #[error("per-channel quantisation length {len} matches no axis of shape {shape:?}")]
    QuantChannelMismatch { len: usize, shape: Vec<i32> },
    #[error("element counts differ between input ({input}) and output ({output})")]
    ElementCountMismatch { input: usize, output: usize },
    #[error("output tensor of cast must have a known element type")]
    UnknownCastTarget,
    #[error("malformed serialized graph: {0}")]
    MalformedGraph(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, self::Error>;
