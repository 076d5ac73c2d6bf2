//! Module for building and freezing computation graphs. The `Model` accumulates
//! tensors and operator nodes while *Open*, validating every addition, and turns
//! into an immutable [`Graph`] on `build()`. Once *Frozen*, every mutator fails and
//! the graph can only be traversed.

use kitsune_tensor::{QuantParams, TensorDesc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::extension::ExtensionConfig;
use crate::node::Node;
use crate::registry::{arity_of, builder_for, OperatorType};
use crate::tensor::{Tensor, TensorRole};
use crate::{Error, Result};

/// The frozen product of a [`Model`]: flat tensor and node sequences plus the
/// graph-level input and output index sets. This is the form backends consume and
/// the form that serializes for fingerprinting and graph adoption.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Graph {
    tensors: Vec<Tensor>,
    nodes: Vec<Node>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
}

impl Graph {
    /// Returns all tensors of the graph.
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Returns one tensor by index.
    pub fn tensor(&self, index: usize) -> Result<&Tensor> {
        self.tensors.get(index).ok_or(Error::IndexOutOfBounds {
            index,
            count: self.tensors.len(),
        })
    }

    /// Returns the operator nodes in execution order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the graph-level input indices.
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Returns the graph-level output indices.
    pub fn outputs(&self) -> &[usize] {
        &self.outputs
    }

    /// Returns the descriptors of the graph-level inputs, in order.
    pub fn input_descs(&self) -> Vec<TensorDesc> {
        self.inputs
            .iter()
            .map(|&index| self.tensors[index].desc().clone())
            .collect()
    }

    /// Returns the descriptors of the graph-level outputs, in order.
    pub fn output_descs(&self) -> Vec<TensorDesc> {
        self.outputs
            .iter()
            .map(|&index| self.tensors[index].desc().clone())
            .collect()
    }

    /// Serializes the graph into its canonical byte form.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Reconstructs a graph from its canonical byte form.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Verifies the structural invariants: every referenced index exists, operator
    /// outputs never overlap their inputs, parameter tensors stay out of the
    /// graph-level IO sets, and no graph input is produced by an operator.
    pub fn validate(&self) -> Result<()> {
        let count = self.tensors.len();
        let in_range = |index: usize| -> Result<()> {
            if index >= count {
                return Err(Error::IndexOutOfBounds { index, count });
            }
            Ok(())
        };

        for node in &self.nodes {
            for &index in node.inputs.iter().chain(&node.params).chain(&node.outputs) {
                in_range(index)?;
            }
            for &output in &node.outputs {
                if node.inputs.contains(&output) {
                    return Err(Error::InputOutputOverlap(output));
                }
            }
        }

        for &index in self.inputs.iter().chain(&self.outputs) {
            in_range(index)?;
            if self.tensors[index].is_parameter() {
                return Err(Error::ParameterAsIo(index));
            }
        }
        for &input in &self.inputs {
            if self.outputs.contains(&input) {
                return Err(Error::InputOutputOverlap(input));
            }
            if self.nodes.iter().any(|node| node.outputs.contains(&input)) {
                return Err(Error::InputIsProduced(input));
            }
        }

        Ok(())
    }
}

/// Graph builder with an *Open* → *Frozen* state machine.
#[derive(Debug, Default)]
pub struct Model {
    graph: Graph,
    extensions: ExtensionConfig,
    io_specified: bool,
    frozen: bool,
}

impl Model {
    /// Creates an empty open model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the model has been built or adopted a graph.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the extension configuration attached to this model.
    pub fn extensions(&self) -> &ExtensionConfig {
        &self.extensions
    }

    /// Returns the frozen graph. Fails until `build` succeeds.
    pub fn graph(&self) -> Result<&Graph> {
        if !self.frozen {
            return Err(Error::NotFrozen);
        }
        Ok(&self.graph)
    }

    /// Appends a tensor described by `desc` and returns its index.
    pub fn add_tensor(&mut self, desc: TensorDesc) -> Result<usize> {
        self.check_open()?;
        self.graph.tensors.push(Tensor::new(desc));
        Ok(self.graph.tensors.len() - 1)
    }

    /// Returns a tensor by index.
    pub fn tensor(&self, index: usize) -> Result<&Tensor> {
        self.graph.tensor(index)
    }

    /// Returns the number of tensors added so far.
    pub fn tensor_count(&self) -> usize {
        self.graph.tensors.len()
    }

    /// Re-tags a tensor with a parameter role.
    pub fn set_tensor_role(&mut self, index: usize, role: TensorRole) -> Result<()> {
        self.check_open()?;
        self.tensor_mut(index)?.set_role(role);
        Ok(())
    }

    /// Attaches validated quantisation parameters to a tensor.
    pub fn set_tensor_quant(&mut self, index: usize, params: &QuantParams) -> Result<()> {
        self.check_open()?;
        let quant = params.build()?;
        self.tensor_mut(index)?.set_quant(quant)
    }

    /// Sets the constant value of a tensor.
    ///
    /// Legal only for a static shape, with `bytes` exactly the descriptor's byte
    /// size, and only once per tensor.
    pub fn set_tensor_value(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        self.check_open()?;
        self.tensor_mut(index)?.set_value(index, bytes)
    }

    /// Appends an operator node.
    ///
    /// The model validates index ranges, input/output disjointness, the declared
    /// arity and that every parameter tensor carries a value; the registered
    /// builder then parses the parameters and emits the node's primitive.
    pub fn add_operation(
        &mut self,
        op: OperatorType,
        params: &[usize],
        inputs: &[usize],
        outputs: &[usize],
    ) -> Result<()> {
        self.check_open()?;

        let arity = arity_of(op).ok_or(Error::UnknownOperator(op))?;
        let count = self.graph.tensors.len();
        for &index in params.iter().chain(inputs).chain(outputs) {
            if index >= count {
                error!("operation {op:?} references tensor {index}, model has {count}");
                return Err(Error::IndexOutOfBounds { index, count });
            }
        }
        for &output in outputs {
            if inputs.contains(&output) {
                error!("operation {op:?} lists tensor {output} as both input and output");
                return Err(Error::InputOutputOverlap(output));
            }
        }
        if inputs.len() != arity.inputs {
            return Err(Error::ArityMismatch {
                op,
                expected: format!("{} inputs", arity.inputs),
                actual: inputs.len(),
            });
        }
        if outputs.len() != arity.outputs {
            return Err(Error::ArityMismatch {
                op,
                expected: format!("{} outputs", arity.outputs),
                actual: outputs.len(),
            });
        }
        if params.len() > arity.max_params {
            return Err(Error::ArityMismatch {
                op,
                expected: format!("at most {} parameters", arity.max_params),
                actual: params.len(),
            });
        }
        for &index in params {
            if !self.graph.tensors[index].has_value() {
                error!("parameter tensor {index} of {op:?} has no value");
                return Err(Error::ParameterWithoutValue(index));
            }
        }

        let mut builder = builder_for(op).ok_or(Error::UnknownOperator(op))?;
        builder.build(params, inputs, outputs, &mut self.graph.tensors)?;
        let primitive = builder.primitive()?;

        debug!("adding {op:?} node over inputs {inputs:?} -> outputs {outputs:?}");
        self.graph.nodes.push(Node {
            op,
            inputs: inputs.to_vec(),
            params: params.to_vec(),
            outputs: outputs.to_vec(),
            primitive,
        });
        Ok(())
    }

    /// Records the graph-level inputs and outputs. Must be called exactly once
    /// before `build`.
    pub fn specify_inputs_and_outputs(&mut self, inputs: &[usize], outputs: &[usize]) -> Result<()> {
        self.check_open()?;
        if self.io_specified {
            return Err(Error::IoAlreadySpecified);
        }

        let count = self.graph.tensors.len();
        for &index in inputs.iter().chain(outputs) {
            if index >= count {
                return Err(Error::IndexOutOfBounds { index, count });
            }
            if self.graph.tensors[index].is_parameter() {
                error!("tensor {index} is an operator parameter, cannot be graph IO");
                return Err(Error::ParameterAsIo(index));
            }
        }
        for &input in inputs {
            if outputs.contains(&input) {
                return Err(Error::InputOutputOverlap(input));
            }
            if self.graph.nodes.iter().any(|node| node.outputs.contains(&input)) {
                error!("tensor {input} is produced by an operator, cannot be graph input");
                return Err(Error::InputIsProduced(input));
            }
        }

        self.graph.inputs = inputs.to_vec();
        self.graph.outputs = outputs.to_vec();
        self.io_specified = true;
        Ok(())
    }

    /// Freezes the model. After a successful build the graph is immutable and
    /// every mutator fails with a frozen-state error.
    pub fn build(&mut self) -> Result<()> {
        if self.frozen {
            error!("model has already been built");
            return Err(Error::Frozen);
        }
        if !self.io_specified {
            error!("inputs and outputs must be specified before build");
            return Err(Error::IoNotSpecified);
        }
        self.graph.validate()?;
        self.frozen = true;
        Ok(())
    }

    /// Adopts a pre-existing graph verbatim. Legal only on a pristine open model;
    /// afterwards the model is frozen.
    pub fn import_graph(&mut self, graph: Graph, extensions: ExtensionConfig) -> Result<()> {
        self.check_open()?;
        if !self.graph.tensors.is_empty() || !self.graph.nodes.is_empty() {
            error!("cannot adopt a graph into a model that already holds tensors or nodes");
            return Err(Error::NotEmpty);
        }
        graph.validate()?;
        self.graph = graph;
        self.extensions = extensions;
        self.io_specified = true;
        self.frozen = true;
        Ok(())
    }

    /// Adopts a graph from its canonical serialized form.
    pub fn import_serialized(&mut self, bytes: &[u8], extensions: ExtensionConfig) -> Result<()> {
        let graph = Graph::deserialize(bytes)?;
        self.import_graph(graph, extensions)
    }

    fn check_open(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::Frozen);
        }
        Ok(())
    }

    fn tensor_mut(&mut self, index: usize) -> Result<&mut Tensor> {
        let count = self.graph.tensors.len();
        self.graph
            .tensors
            .get_mut(index)
            .ok_or(Error::IndexOutOfBounds { index, count })
    }
}

#[cfg(test)]
mod tests {
    use kitsune_tensor::DataType;
    use pretty_assertions::assert_eq;

    use super::*;

    fn float_desc(shape: &[i32]) -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Float32);
        desc.set_shape(shape).unwrap();
        desc
    }

    fn int8_scalar() -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Int8);
        desc.set_shape([]).unwrap();
        desc
    }

    /// Two inputs, a fused-activation parameter and one output, wired into Add.
    fn add_model() -> Model {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        let b = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        let activation = model.add_tensor(int8_scalar()).unwrap();
        model.set_tensor_role(activation, TensorRole::AddActivation).unwrap();
        model.set_tensor_value(activation, &[0]).unwrap();
        let out = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        model
            .add_operation(OperatorType::Add, &[activation], &[a, b], &[out])
            .unwrap();
        model.specify_inputs_and_outputs(&[a, b], &[out]).unwrap();
        model
    }

    #[test]
    fn builds_a_simple_graph() {
        let mut model = add_model();
        model.build().unwrap();
        let graph = model.graph().unwrap();
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.inputs(), &[0, 1]);
        assert_eq!(graph.outputs(), &[3]);
        assert!(graph.tensors()[2].is_parameter());
    }

    #[test]
    fn build_twice_forbidden() {
        let mut model = add_model();
        model.build().unwrap();
        assert!(matches!(model.build(), Err(Error::Frozen)));
    }

    #[test]
    fn mutation_after_build_forbidden() {
        let mut model = add_model();
        model.build().unwrap();
        assert!(matches!(
            model.add_tensor(float_desc(&[1])),
            Err(Error::Frozen)
        ));
        assert!(matches!(
            model.set_tensor_value(0, &[0; 48]),
            Err(Error::Frozen)
        ));
    }

    #[test]
    fn dynamic_constant_rejected() {
        let mut model = Model::new();
        let index = model.add_tensor(float_desc(&[2, -1])).unwrap();
        assert!(matches!(
            model.set_tensor_value(index, &[]),
            Err(Error::DynamicConstant(_))
        ));
    }

    #[test]
    fn build_requires_io() {
        let mut model = Model::new();
        model.add_tensor(float_desc(&[1])).unwrap();
        assert!(matches!(model.build(), Err(Error::IoNotSpecified)));
    }

    #[test]
    fn io_specified_exactly_once() {
        let mut model = add_model();
        assert!(matches!(
            model.specify_inputs_and_outputs(&[0], &[3]),
            Err(Error::IoAlreadySpecified)
        ));
    }

    #[test]
    fn io_rejects_overlap_and_parameters() {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[1])).unwrap();
        let activation = model.add_tensor(int8_scalar()).unwrap();
        model.set_tensor_role(activation, TensorRole::AddActivation).unwrap();
        model.set_tensor_value(activation, &[0]).unwrap();
        let b = model.add_tensor(float_desc(&[1])).unwrap();
        let out = model.add_tensor(float_desc(&[1])).unwrap();
        model
            .add_operation(OperatorType::Add, &[activation], &[a, b], &[out])
            .unwrap();

        assert!(matches!(
            model.specify_inputs_and_outputs(&[a, b], &[a]),
            Err(Error::InputOutputOverlap(_))
        ));
        assert!(matches!(
            model.specify_inputs_and_outputs(&[a, activation], &[out]),
            Err(Error::ParameterAsIo(_))
        ));
        assert!(matches!(
            model.specify_inputs_and_outputs(&[out], &[b]),
            Err(Error::InputIsProduced(_))
        ));
    }

    #[test]
    fn operation_validation() {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[4])).unwrap();
        let b = model.add_tensor(float_desc(&[4])).unwrap();
        let out = model.add_tensor(float_desc(&[4])).unwrap();

        assert!(matches!(
            model.add_operation(OperatorType::Add, &[], &[a, 9], &[out]),
            Err(Error::IndexOutOfBounds { index: 9, .. })
        ));
        assert!(matches!(
            model.add_operation(OperatorType::Add, &[], &[a, b], &[a]),
            Err(Error::InputOutputOverlap(_))
        ));
        assert!(matches!(
            model.add_operation(OperatorType::Add, &[], &[a], &[out]),
            Err(Error::ArityMismatch { .. })
        ));

        // A parameter without a value is caught before the builder runs.
        let empty_param = model.add_tensor(int8_scalar()).unwrap();
        assert!(matches!(
            model.add_operation(OperatorType::Add, &[empty_param], &[a, b], &[out]),
            Err(Error::ParameterWithoutValue(_))
        ));
    }

    #[test]
    fn graph_round_trips_through_bytes() {
        let mut model = add_model();
        model.build().unwrap();
        let bytes = model.graph().unwrap().serialize().unwrap();

        let mut adopted = Model::new();
        adopted
            .import_serialized(&bytes, ExtensionConfig::new())
            .unwrap();
        assert!(adopted.is_frozen());
        assert_eq!(adopted.graph().unwrap().nodes().len(), 1);
    }

    #[test]
    fn import_requires_pristine_model() {
        let mut model = add_model();
        model.build().unwrap();
        let graph = model.graph().unwrap().clone();

        let mut target = Model::new();
        target.add_tensor(float_desc(&[1])).unwrap();
        assert!(matches!(
            target.import_graph(graph, ExtensionConfig::new()),
            Err(Error::NotEmpty)
        ));
    }
}
