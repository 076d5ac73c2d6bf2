//! Process-wide operator registry. Every operator type the runtime understands is
//! registered here together with its declared arity and a builder factory. The
//! table is assembled once, before any model can observe it, and is read-only
//! thereafter; when two registrations name the same operator type the later entry
//! wins.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::ops::{
    ArithmeticBuilder, CastBuilder, MatmulBuilder, ReshapeBuilder, ScaleBuilder,
};
use crate::primitive::Primitive;
use crate::tensor::Tensor;
use crate::Result;

/// The closed set of operator types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorType {
    Add,
    Sub,
    Mul,
    Div,
    Matmul,
    Scale,
    Cast,
    Reshape,
}

/// Declared arity of an operator, checked by the model before the builder runs.
#[derive(Clone, Copy, Debug)]
pub struct Arity {
    pub inputs: usize,
    pub outputs: usize,
    pub max_params: usize,
}

/// Contract every operator builder satisfies.
///
/// `build` is called at most once per node; it validates the parameter tensors
/// (element type, scalar shape, value range), marks them as consumed, and records
/// the parsed parameters. `primitive` is legal only after a successful `build`.
pub trait OperatorBuilder: Send {
    fn build(
        &mut self,
        params: &[usize],
        inputs: &[usize],
        outputs: &[usize],
        tensors: &mut [Tensor],
    ) -> Result<()>;

    fn primitive(&self) -> Result<Primitive>;
}

type BuilderCtor = fn() -> Box<dyn OperatorBuilder>;

struct Registration {
    arity: Arity,
    ctor: BuilderCtor,
}

const fn arity(inputs: usize, outputs: usize, max_params: usize) -> Arity {
    Arity { inputs, outputs, max_params }
}

static REGISTRY: Lazy<HashMap<OperatorType, Registration>> = Lazy::new(|| {
    let entries: [(OperatorType, Arity, BuilderCtor); 8] = [
        (OperatorType::Add, arity(2, 1, 1), || Box::new(ArithmeticBuilder::add())),
        (OperatorType::Sub, arity(2, 1, 1), || Box::new(ArithmeticBuilder::sub())),
        (OperatorType::Mul, arity(2, 1, 1), || Box::new(ArithmeticBuilder::mul())),
        (OperatorType::Div, arity(2, 1, 1), || Box::new(ArithmeticBuilder::div())),
        (OperatorType::Matmul, arity(2, 1, 3), || Box::new(MatmulBuilder::new())),
        (OperatorType::Scale, arity(3, 1, 2), || Box::new(ScaleBuilder::new())),
        (OperatorType::Cast, arity(1, 1, 0), || Box::new(CastBuilder::new())),
        (OperatorType::Reshape, arity(1, 1, 0), || Box::new(ReshapeBuilder::new())),
    ];
    let mut map = HashMap::new();
    for (op, arity, ctor) in entries {
        // Duplicate registrations keep the later entry.
        map.insert(op, Registration { arity, ctor });
    }
    map
});

/// Returns the declared arity of an operator, if one is registered.
pub fn arity_of(op: OperatorType) -> Option<Arity> {
    REGISTRY.get(&op).map(|registration| registration.arity)
}

/// Instantiates a fresh builder for an operator, if one is registered.
pub fn builder_for(op: OperatorType) -> Option<Box<dyn OperatorBuilder>> {
    REGISTRY.get(&op).map(|registration| (registration.ctor)())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_is_registered() {
        for op in [
            OperatorType::Add,
            OperatorType::Sub,
            OperatorType::Mul,
            OperatorType::Div,
            OperatorType::Matmul,
            OperatorType::Scale,
            OperatorType::Cast,
            OperatorType::Reshape,
        ] {
            assert!(arity_of(op).is_some(), "{op:?} has no arity");
            assert!(builder_for(op).is_some(), "{op:?} has no builder");
        }
    }

    #[test]
    fn arithmetic_arity() {
        let arity = arity_of(OperatorType::Add).unwrap();
        assert_eq!(arity.inputs, 2);
        assert_eq!(arity.outputs, 1);
        assert_eq!(arity.max_params, 1);
    }
}
