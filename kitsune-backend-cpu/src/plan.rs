//! Lowering the graph IR into the interpreter's execution plan. The plan is a
//! self-contained, serializable image of the model: tensor metadata, constant
//! bytes, node list and IO index sets. Its byte form is also the backend's cache
//! and offline-model format, and the source of the model id.

use kitsune_backend::{Error, Result};
use kitsune_graph::{Graph, Node, Primitive};
use kitsune_tensor::{DataType, Format, TensorDesc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanTensor {
    pub dtype: DataType,
    pub format: Format,
    pub dims: Vec<i32>,
    pub data: Option<Vec<u8>>,
}

impl PlanTensor {
    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|&dim| dim as usize).product()
    }

    pub fn byte_size(&self) -> usize {
        self.element_count() * self.dtype.size()
    }

    /// Rebuilds the descriptor form of the tensor.
    pub fn desc(&self) -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(self.dtype);
        desc.set_format(self.format);
        desc.set_shape(self.dims.clone()).expect("plan dims were validated at lowering");
        desc
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanNode {
    pub primitive: Primitive,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

/// A lowered model, ready for the interpreter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plan {
    pub tensors: Vec<PlanTensor>,
    pub nodes: Vec<PlanNode>,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl Plan {
    /// Lowers a frozen graph, rejecting anything the interpreter cannot execute.
    pub fn lower(graph: &Graph) -> Result<Self> {
        for tensor in graph.tensors() {
            if tensor.desc().is_dynamic() {
                error!("cpu backend does not support dynamic axes");
                return Err(Error::Unsupported("dynamic input shapes".into()));
            }
        }
        for node in graph.nodes() {
            if !node_supported(graph, node) {
                error!("cpu backend cannot execute {:?}", node.op);
                return Err(Error::Unsupported(format!("operator {:?}", node.op)));
            }
        }

        let tensors = graph
            .tensors()
            .iter()
            .map(|tensor| PlanTensor {
                dtype: tensor.desc().dtype(),
                format: tensor.desc().format(),
                dims: tensor.desc().shape().to_vec(),
                data: tensor.value().map(<[u8]>::to_vec),
            })
            .collect();
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| PlanNode {
                primitive: node.primitive.clone(),
                inputs: node.inputs.clone(),
                outputs: node.outputs.clone(),
            })
            .collect();

        Ok(Self {
            tensors,
            nodes,
            inputs: graph.inputs().to_vec(),
            outputs: graph.outputs().to_vec(),
        })
    }

    /// Serializes the plan into the backend's cache format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|error| Error::Failed(format!("plan serialization: {error}")))
    }

    /// Restores a plan from its cache format.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|error| Error::InvalidFile(format!("malformed model cache: {error}")))
    }
}

/// Stable model identifier: the leading word of the plan digest.
pub fn model_id(plan_bytes: &[u8]) -> u32 {
    let digest = Sha256::digest(plan_bytes);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Element types the cast kernel converts between.
fn castable(dtype: DataType) -> bool {
    !matches!(dtype, DataType::Unknown | DataType::Float16)
}

/// Reports whether the interpreter can execute one node of a graph.
pub fn node_supported(graph: &Graph, node: &Node) -> bool {
    let dtype_of = |index: usize| {
        graph
            .tensor(index)
            .map(|tensor| tensor.desc().dtype())
            .unwrap_or(DataType::Unknown)
    };
    match &node.primitive {
        Primitive::Add { .. }
        | Primitive::Sub { .. }
        | Primitive::Mul { .. }
        | Primitive::Div { .. }
        | Primitive::Matmul { .. }
        | Primitive::Scale { .. } => node.inputs.iter().all(|&index| dtype_of(index) == DataType::Float32),
        Primitive::Cast { to } => castable(dtype_of(node.inputs[0])) && castable(*to),
        Primitive::Reshape => dtype_of(node.inputs[0]).size() > 0,
    }
}

#[cfg(test)]
mod tests {
    use kitsune_graph::{Model, OperatorType, TensorRole};
    use kitsune_tensor::TensorDesc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn float_desc(shape: &[i32]) -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Float32);
        desc.set_shape(shape).unwrap();
        desc
    }

    fn add_graph() -> Model {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[2, 2])).unwrap();
        let b = model.add_tensor(float_desc(&[2, 2])).unwrap();
        let mut scalar = TensorDesc::new();
        scalar.set_dtype(DataType::Int8);
        scalar.set_shape([]).unwrap();
        let activation = model.add_tensor(scalar).unwrap();
        model.set_tensor_role(activation, TensorRole::AddActivation).unwrap();
        model.set_tensor_value(activation, &[0]).unwrap();
        let out = model.add_tensor(float_desc(&[2, 2])).unwrap();
        model
            .add_operation(OperatorType::Add, &[activation], &[a, b], &[out])
            .unwrap();
        model.specify_inputs_and_outputs(&[a, b], &[out]).unwrap();
        model.build().unwrap();
        model
    }

    #[test]
    fn lowers_and_round_trips() {
        let model = add_graph();
        let plan = Plan::lower(model.graph().unwrap()).unwrap();
        assert_eq!(plan.nodes.len(), 1);
        assert_eq!(plan.inputs, vec![0, 1]);

        let bytes = plan.to_bytes().unwrap();
        let restored = Plan::from_bytes(&bytes).unwrap();
        assert_eq!(restored.to_bytes().unwrap(), bytes);
        assert_eq!(model_id(&bytes), model_id(&restored.to_bytes().unwrap()));
    }

    #[test]
    fn dynamic_shapes_rejected() {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[2, -1])).unwrap();
        model.specify_inputs_and_outputs(&[a], &[]).unwrap();
        model.build().unwrap();
        assert!(matches!(
            Plan::lower(model.graph().unwrap()),
            Err(Error::Unsupported(_))
        ));
    }
}
