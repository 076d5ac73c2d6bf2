//! Operator builders. Each builder parses the parameter tensors of one operator
//! type into a [`Primitive`](crate::Primitive), marking every parameter it consumes.
//! The model validates indices and arity before a builder runs; builders validate
//! everything about the parameters themselves.

use crate::primitive::Activation;
use crate::tensor::Tensor;
use crate::Result;

mod arithmetic;
mod cast;
mod matmul;
mod reshape;
mod scale;

pub use arithmetic::ArithmeticBuilder;
pub use cast::CastBuilder;
pub use matmul::MatmulBuilder;
pub use reshape::ReshapeBuilder;
pub use scale::ScaleBuilder;

/// Parses a fused-activation parameter tensor: an `Int8` scalar holding one of the
/// [`Activation`] wire values.
fn parse_activation(tensor: &mut Tensor) -> Result<Activation> {
    tensor.mark_parameter();
    let value = tensor.scalar_i8()?;
    Activation::from_i8(value)
}

/// Parses a transpose flag parameter tensor: a `Bool` scalar.
fn parse_flag(tensor: &mut Tensor) -> Result<bool> {
    tensor.mark_parameter();
    tensor.scalar_bool()
}

/// Parses an axis parameter tensor: an `Int64` scalar.
fn parse_axis(tensor: &mut Tensor) -> Result<i64> {
    tensor.mark_parameter();
    tensor.scalar_i64()
}

#[cfg(test)]
pub(crate) mod testing {
    use kitsune_tensor::{DataType, TensorDesc};

    use crate::tensor::{Tensor, TensorRole};

    /// Builds a scalar parameter tensor with the given role and raw value bytes.
    pub fn param(dtype: DataType, role: TensorRole, bytes: &[u8]) -> Tensor {
        let mut desc = TensorDesc::new();
        desc.set_dtype(dtype);
        desc.set_shape([]).unwrap();
        let mut tensor = Tensor::new(desc);
        tensor.set_role(role);
        tensor.set_value(0, bytes).unwrap();
        tensor
    }

    /// Builds a float32 data tensor of the given shape.
    pub fn data(shape: &[i32]) -> Tensor {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Float32);
        desc.set_shape(shape).unwrap();
        Tensor::new(desc)
    }
}
