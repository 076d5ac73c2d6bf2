//! Operator nodes. A node names its operator type, the tensor indices it consumes
//! and produces, and the primitive parsed out of its parameter tensors.

use serde::{Deserialize, Serialize};

use crate::primitive::Primitive;
use crate::registry::OperatorType;

/// One operator of the graph. All tensor references are indices into the graph's
/// flat tensor sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub op: OperatorType,
    pub inputs: Vec<usize>,
    pub params: Vec<usize>,
    pub outputs: Vec<usize>,
    pub primitive: Primitive,
}
