//! Builder for the cast operator. The target element type is taken from the output
//! tensor's descriptor; cast accepts no parameter tensors.

use kitsune_tensor::DataType;
use tracing::error;

use crate::primitive::Primitive;
use crate::registry::OperatorBuilder;
use crate::tensor::Tensor;
use crate::{Error, Result};

#[derive(Default)]
pub struct CastBuilder {
    to: Option<DataType>,
}

impl CastBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperatorBuilder for CastBuilder {
    fn build(
        &mut self,
        _params: &[usize],
        _inputs: &[usize],
        outputs: &[usize],
        tensors: &mut [Tensor],
    ) -> Result<()> {
        if self.to.is_some() {
            return Err(Error::OperationAlreadyBuilt);
        }

        let to = tensors[outputs[0]].desc().dtype();
        if to == DataType::Unknown {
            error!("cast output tensor has no element type");
            return Err(Error::UnknownCastTarget);
        }
        self.to = Some(to);
        Ok(())
    }

    fn primitive(&self) -> Result<Primitive> {
        match self.to {
            Some(to) => Ok(Primitive::Cast { to }),
            None => Err(Error::OperationNotBuilt),
        }
    }
}
