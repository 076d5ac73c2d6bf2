//! Builder for the scale operator: `output = input * scale + bias` along an axis,
//! with an optional fused activation. Scale and bias arrive as the second and third
//! inputs; the axis and activation are parameter tensors.

use tracing::error;

use crate::ops::{parse_activation, parse_axis};
use crate::primitive::{Activation, Primitive};
use crate::registry::{OperatorBuilder, OperatorType};
use crate::tensor::{Tensor, TensorRole};
use crate::{Error, Result};

pub struct ScaleBuilder {
    axis: i64,
    activation: Activation,
    built: bool,
}

impl ScaleBuilder {
    pub fn new() -> Self {
        Self {
            axis: 0,
            activation: Activation::None,
            built: false,
        }
    }
}

impl Default for ScaleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorBuilder for ScaleBuilder {
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
                TensorRole::ScaleAxis => self.axis = parse_axis(tensor)?,
                TensorRole::ScaleActivation => self.activation = parse_activation(tensor)?,
                role => {
                    error!("Scale got a parameter with role {role:?}");
                    return Err(Error::UnexpectedParameter {
                        op: OperatorType::Scale,
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
        Ok(Primitive::Scale {
            axis: self.axis,
            activation: self.activation,
        })
    }
}
