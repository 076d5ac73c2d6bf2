//! Backend-agnostic operator parameters. Each node owns one `Primitive`, the fully
//! parsed form of its parameter tensors. Backends pattern-match on the variant; no
//! backend ever re-reads the raw parameter tensors.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Activation fused into the producing operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    None,
    Relu,
    Relu6,
}

impl Activation {
    /// Decodes the wire form carried by activation parameter tensors.
    pub fn from_i8(value: i8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Relu),
            2 => Ok(Self::Relu6),
            other => Err(Error::InvalidActivation(other)),
        }
    }
}

/// Parsed operator parameters, one variant per registered operator type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Add { activation: Activation },
    Sub { activation: Activation },
    Mul { activation: Activation },
    Div { activation: Activation },
    Matmul {
        transpose_a: bool,
        transpose_b: bool,
        activation: Activation,
    },
    Scale { axis: i64, activation: Activation },
    Cast { to: kitsune_tensor::DataType },
    Reshape,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_wire_values() {
        assert_eq!(Activation::from_i8(0).unwrap(), Activation::None);
        assert_eq!(Activation::from_i8(1).unwrap(), Activation::Relu);
        assert_eq!(Activation::from_i8(2).unwrap(), Activation::Relu6);
        assert!(matches!(
            Activation::from_i8(3),
            Err(Error::InvalidActivation(3))
        ));
    }
}
