//! Builder for the four elementwise arithmetic operators. They differ only in the
//! primitive they emit; the single optional parameter is the fused activation.

use tracing::error;

use crate::ops::parse_activation;
use crate::primitive::{Activation, Primitive};
use crate::registry::{OperatorBuilder, OperatorType};
use crate::tensor::{Tensor, TensorRole};
use crate::{Error, Result};

pub struct ArithmeticBuilder {
    op: OperatorType,
    activation_role: TensorRole,
    activation: Activation,
    built: bool,
}

impl ArithmeticBuilder {
    pub fn add() -> Self {
        Self::new(OperatorType::Add, TensorRole::AddActivation)
    }

    pub fn sub() -> Self {
        Self::new(OperatorType::Sub, TensorRole::SubActivation)
    }

    pub fn mul() -> Self {
        Self::new(OperatorType::Mul, TensorRole::MulActivation)
    }

    pub fn div() -> Self {
        Self::new(OperatorType::Div, TensorRole::DivActivation)
    }

    fn new(op: OperatorType, activation_role: TensorRole) -> Self {
        Self {
            op,
            activation_role,
            activation: Activation::None,
            built: false,
        }
    }
}

impl OperatorBuilder for ArithmeticBuilder {
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
            let role = tensor.role();
            if role != self.activation_role {
                error!("{:?} got a parameter with role {role:?}", self.op);
                return Err(Error::UnexpectedParameter { op: self.op, role });
            }
            self.activation = parse_activation(tensor)?;
        }

        self.built = true;
        Ok(())
    }

    fn primitive(&self) -> Result<Primitive> {
        if !self.built {
            return Err(Error::OperationNotBuilt);
        }
        let activation = self.activation;
        Ok(match self.op {
            OperatorType::Add => Primitive::Add { activation },
            OperatorType::Sub => Primitive::Sub { activation },
            OperatorType::Mul => Primitive::Mul { activation },
            OperatorType::Div => Primitive::Div { activation },
            _ => unreachable!("arithmetic builder constructed for {:?}", self.op),
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
    fn parses_fused_activation() {
        let mut tensors = vec![
            data(&[1, 2]),
            data(&[1, 2]),
            param(DataType::Int8, TensorRole::AddActivation, &[1]),
            data(&[1, 2]),
        ];
        let mut builder = ArithmeticBuilder::add();
        builder.build(&[2], &[0, 1], &[3], &mut tensors).unwrap();
        assert_eq!(
            builder.primitive().unwrap(),
            Primitive::Add { activation: Activation::Relu }
        );
        assert!(tensors[2].is_parameter());
    }

    #[test]
    fn defaults_to_no_activation() {
        let mut tensors = vec![data(&[4]), data(&[4]), data(&[4])];
        let mut builder = ArithmeticBuilder::mul();
        builder.build(&[], &[0, 1], &[2], &mut tensors).unwrap();
        assert_eq!(
            builder.primitive().unwrap(),
            Primitive::Mul { activation: Activation::None }
        );
    }

    #[test]
    fn rejects_wrong_parameter_role() {
        let mut tensors = vec![
            data(&[4]),
            data(&[4]),
            param(DataType::Int8, TensorRole::MulActivation, &[0]),
            data(&[4]),
        ];
        let mut builder = ArithmeticBuilder::sub();
        assert!(matches!(
            builder.build(&[2], &[0, 1], &[3], &mut tensors),
            Err(Error::UnexpectedParameter { .. })
        ));
    }

    #[test]
    fn rejects_non_int8_activation() {
        let mut tensors = vec![
            data(&[4]),
            data(&[4]),
            param(DataType::Bool, TensorRole::DivActivation, &[0]),
            data(&[4]),
        ];
        let mut builder = ArithmeticBuilder::div();
        assert!(matches!(
            builder.build(&[2], &[0, 1], &[3], &mut tensors),
            Err(Error::ParameterTypeMismatch { .. })
        ));
    }

    #[test]
    fn build_twice_forbidden() {
        let mut tensors = vec![data(&[4]), data(&[4]), data(&[4])];
        let mut builder = ArithmeticBuilder::add();
        builder.build(&[], &[0, 1], &[2], &mut tensors).unwrap();
        assert!(matches!(
            builder.build(&[], &[0, 1], &[2], &mut tensors),
            Err(Error::OperationAlreadyBuilt)
        ));
    }

    #[test]
    fn primitive_before_build_forbidden() {
        let builder = ArithmeticBuilder::add();
        assert!(matches!(builder.primitive(), Err(Error::OperationNotBuilt)));
    }
}
