//! Builder for the reshape operator. The new shape is the output tensor's
//! descriptor; the builder only checks that static element counts agree.

use tracing::error;

use crate::primitive::Primitive;
use crate::registry::OperatorBuilder;
use crate::tensor::Tensor;
use crate::{Error, Result};

#[derive(Default)]
pub struct ReshapeBuilder {
    built: bool,
}

impl ReshapeBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OperatorBuilder for ReshapeBuilder {
    fn build(
        &mut self,
        _params: &[usize],
        inputs: &[usize],
        outputs: &[usize],
        tensors: &mut [Tensor],
    ) -> Result<()> {
        if self.built {
            return Err(Error::OperationAlreadyBuilt);
        }

        let input = tensors[inputs[0]].desc();
        let output = tensors[outputs[0]].desc();
        if !input.is_dynamic() && !output.is_dynamic() {
            let (from, to) = (input.element_count(), output.element_count());
            if from != to {
                error!("reshape changes element count from {from} to {to}");
                return Err(Error::ElementCountMismatch { input: from, output: to });
            }
        }

        self.built = true;
        Ok(())
    }

    fn primitive(&self) -> Result<Primitive> {
        if !self.built {
            return Err(Error::OperationNotBuilt);
        }
        Ok(Primitive::Reshape)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ops::testing::data;

    #[test]
    fn element_counts_must_agree() {
        let mut tensors = vec![data(&[2, 6]), data(&[3, 4])];
        let mut builder = ReshapeBuilder::new();
        builder.build(&[], &[0], &[1], &mut tensors).unwrap();
        assert_eq!(builder.primitive().unwrap(), Primitive::Reshape);

        let mut tensors = vec![data(&[2, 6]), data(&[5])];
        let mut builder = ReshapeBuilder::new();
        assert!(matches!(
            builder.build(&[], &[0], &[1], &mut tensors),
            Err(Error::ElementCountMismatch { input: 12, output: 5 })
        ));
    }
}
