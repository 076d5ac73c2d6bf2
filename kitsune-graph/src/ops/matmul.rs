//! Builder for the matrix-multiplication operator: two optional transpose flags and
//! an optional fused activation.

use tracing::error;

use crate::ops::{parse_activation, parse_flag};
use crate::primitive::{Activation, Primitive};
use crate::registry::{OperatorBuilder, OperatorType};
use crate::tensor::{Tensor, TensorRole};
use crate::{Error, Result};

#[derive(Default)]
pub struct MatmulBuilder {
    transpose_a: bool,
    transpose_b: bool,
    activation: Activation,
    built: bool,
}

impl MatmulBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperatorBuilder for MatmulBuilder {
    fn build(
        &mut self,
        params: &[usize],
        _inputs: &[usize],
        _outputs: &[usize],
        tensors: &mut [Tensor],
    ) -> Result<()> {
        if self.built {
            return Err(Error::OperationAlreadyBuilt);
        }

        for &index in params {
            let tensor = &mut tensors[index];
            match tensor.role() {
                TensorRole::MatmulTransposeA => self.transpose_a = parse_flag(tensor)?,
                TensorRole::MatmulTransposeB => self.transpose_b = parse_flag(tensor)?,
                TensorRole::MatmulActivation => self.activation = parse_activation(tensor)?,
                role => {
                    error!("Matmul got a parameter with role {role:?}");
                    return Err(Error::UnexpectedParameter {
                        op: OperatorType::Matmul,
                        role,
                    });
                }
            }
        }

        self.built = true;
        Ok(())
    }

    fn primitive(&self) -> Result<Primitive> {
        if !self.built {
            return Err(Error::OperationNotBuilt);
        }
        Ok(Primitive::Matmul {
            transpose_a: self.transpose_a,
            transpose_b: self.transpose_b,
            activation: self.activation,
        })
    }
}

#[cfg(test)]
mod tests {
    use kitsune_tensor::DataType;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ops::testing::{data, param};

    #[test]
    fn parses_all_parameters() {
        let mut tensors = vec![
            data(&[2, 3]),
            data(&[2, 4]),
            param(DataType::Bool, TensorRole::MatmulTransposeA, &[1]),
            param(DataType::Bool, TensorRole::MatmulTransposeB, &[0]),
            param(DataType::Int8, TensorRole::MatmulActivation, &[2]),
            data(&[3, 4]),
        ];
        let mut builder = MatmulBuilder::new();
        builder.build(&[2, 3, 4], &[0, 1], &[5], &mut tensors).unwrap();
        assert_eq!(
            builder.primitive().unwrap(),
            Primitive::Matmul {
                transpose_a: true,
                transpose_b: false,
                activation: Activation::Relu6,
            }
        );
    }

    #[test]
    fn transpose_must_be_bool_scalar() {
        let mut tensors = vec![
            data(&[2, 3]),
            data(&[3, 4]),
            param(DataType::Int8, TensorRole::MatmulTransposeA, &[1]),
            data(&[2, 4]),
        ];
        let mut builder = MatmulBuilder::new();
        assert!(matches!(
            builder.build(&[2], &[0, 1], &[3], &mut tensors),
            Err(Error::ParameterTypeMismatch { .. })
        ));
    }
}
