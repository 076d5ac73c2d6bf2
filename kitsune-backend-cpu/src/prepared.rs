//! The prepared-model half of the CPU backend: a lowered [`Plan`] plus its cache
//! bytes and the lazily started worker thread that serves asynchronous runs in
//! submission order.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kitsune_backend::{
    DimRanges, Error, IoTensor, PreparedModel, Result, RunDone, RunOutputs,
};
use kitsune_graph::Primitive;
use once_cell::sync::OnceCell;
use tracing::{debug, error};

use crate::kernels;
use crate::plan::{model_id, Plan};
use crate::shm::Mapping;

type Job = (Vec<IoTensor>, Vec<IoTensor>, u32, RunDone, Instant);

pub struct CpuPreparedModel {
    plan: Arc<Plan>,
    plan_bytes: Vec<u8>,
    model_id: u32,
    worker: OnceCell<flume::Sender<Job>>,
}

impl CpuPreparedModel {
    pub fn new(plan: Plan) -> Result<Self> {
        let plan_bytes = plan.to_bytes()?;
        let model_id = model_id(&plan_bytes);
        Ok(Self {
            plan: Arc::new(plan),
            plan_bytes,
            model_id,
            worker: OnceCell::new(),
        })
    }

    fn worker(&self) -> &flume::Sender<Job> {
        self.worker.get_or_init(|| {
            let (sender, receiver) = flume::unbounded::<Job>();
            let plan = Arc::clone(&self.plan);
            thread::spawn(move || {
                for (inputs, outputs, timeout_ms, done, submitted) in receiver.iter() {
                    let mut result = execute(&plan, &inputs, &outputs);
                    if timeout_ms > 0 && submitted.elapsed() > Duration::from_millis(timeout_ms.into()) {
                        result = Err(Error::Failed(format!("run timed out after {timeout_ms} ms")));
                    }
                    done(result);
                }
            });
            sender
        })
    }
}

impl PreparedModel for CpuPreparedModel {
    fn run(&self, inputs: &[IoTensor], outputs: &[IoTensor]) -> Result<RunOutputs> {
        execute(&self.plan, inputs, outputs)
    }

    fn run_async(
        &self,
        inputs: &[IoTensor],
        outputs: &[IoTensor],
        timeout_ms: u32,
        done: RunDone,
    ) -> Result<()> {
        let job = (inputs.to_vec(), outputs.to_vec(), timeout_ms, done, Instant::now());
        self.worker()
            .send(job)
            .map_err(|_| Error::UnavailableDevice("cpu run worker is gone".into()))
    }

    fn export_model_cache(&self) -> Result<Vec<Vec<u8>>> {
        Ok(vec![self.plan_bytes.clone()])
    }

    fn model_id(&self) -> u32 {
        self.model_id
    }

    fn input_descs(&self) -> Result<Vec<kitsune_tensor::TensorDesc>> {
        Ok(self
            .plan
            .inputs
            .iter()
            .map(|&index| self.plan.tensors[index].desc())
            .collect())
    }

    fn output_descs(&self) -> Result<Vec<kitsune_tensor::TensorDesc>> {
        Ok(self
            .plan
            .outputs
            .iter()
            .map(|&index| self.plan.tensors[index].desc())
            .collect())
    }

    fn input_dim_ranges(&self) -> Result<DimRanges> {
        // Dynamic inputs are rejected at lowering, so min and max coincide.
        let dims: Vec<Vec<u32>> = self
            .plan
            .inputs
            .iter()
            .map(|&index| {
                self.plan.tensors[index]
                    .dims
                    .iter()
                    .map(|&dim| dim as u32)
                    .collect()
            })
            .collect();
        Ok(DimRanges { min: dims.clone(), max: dims })
    }

    fn release(&self) -> Result<()> {
        debug!("releasing cpu prepared model {:#010x}", self.model_id);
        Ok(())
    }
}

fn value_of(values: &[Option<Vec<u8>>], index: usize) -> Result<&[u8]> {
    values[index]
        .as_deref()
        .ok_or_else(|| Error::Failed(format!("tensor {index} has no value at execution time")))
}

/// Interprets a plan over mapped shared-memory tensors.
pub fn execute(plan: &Plan, inputs: &[IoTensor], outputs: &[IoTensor]) -> Result<RunOutputs> {
    if inputs.len() != plan.inputs.len() || outputs.len() != plan.outputs.len() {
        error!(
            "run called with {}/{} tensors, model has {}/{}",
            inputs.len(),
            outputs.len(),
            plan.inputs.len(),
            plan.outputs.len()
        );
        return Err(Error::InvalidParameter("input or output count mismatch".into()));
    }

    let mut values: Vec<Option<Vec<u8>>> =
        plan.tensors.iter().map(|tensor| tensor.data.clone()).collect();

    for (&slot, io) in plan.inputs.iter().zip(inputs) {
        if io.buffer.is_none() {
            return Err(Error::InvalidParameter(format!(
                "input tensor for slot {slot} has no buffer"
            )));
        }
        let needed = plan.tensors[slot].byte_size();
        if io.buffer.data_size < needed {
            return Err(Error::InvalidParameter(format!(
                "input tensor for slot {slot} holds {} bytes, model needs {needed}",
                io.buffer.data_size
            )));
        }
        let mapping = Mapping::of(&io.buffer)?;
        values[slot] = Some(mapping.window(&io.buffer)[..needed].to_vec());
    }

    for node in &plan.nodes {
        let out = match &node.primitive {
            Primitive::Add { activation } => kernels::elementwise(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                |x, y| x + y,
                *activation,
            )?,
            Primitive::Sub { activation } => kernels::elementwise(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                |x, y| x - y,
                *activation,
            )?,
            Primitive::Mul { activation } => kernels::elementwise(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                |x, y| x * y,
                *activation,
            )?,
            Primitive::Div { activation } => kernels::elementwise(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                |x, y| x / y,
                *activation,
            )?,
            Primitive::Matmul {
                transpose_a,
                transpose_b,
                activation,
            } => kernels::matmul(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                &plan.tensors[node.inputs[0]].dims,
                &plan.tensors[node.inputs[1]].dims,
                *transpose_a,
                *transpose_b,
                *activation,
            )?,
            Primitive::Scale { axis, activation } => kernels::scale(
                value_of(&values, node.inputs[0])?,
                value_of(&values, node.inputs[1])?,
                value_of(&values, node.inputs[2])?,
                &plan.tensors[node.inputs[0]].dims,
                *axis,
                *activation,
            )?,
            Primitive::Cast { to } => kernels::cast(
                value_of(&values, node.inputs[0])?,
                plan.tensors[node.inputs[0]].dtype,
                *to,
            )?,
            Primitive::Reshape => value_of(&values, node.inputs[0])?.to_vec(),
        };
        values[node.outputs[0]] = Some(out);
    }

    let mut shapes = Vec::with_capacity(outputs.len());
    let mut enough_buffer = Vec::with_capacity(outputs.len());
    for (&slot, io) in plan.outputs.iter().zip(outputs) {
        let produced = value_of(&values, slot)?;
        shapes.push(plan.tensors[slot].dims.clone());
        if io.buffer.is_none() || io.buffer.data_size < produced.len() {
            enough_buffer.push(false);
            continue;
        }
        let mut mapping = Mapping::of(&io.buffer)?;
        mapping.window_mut(&io.buffer)[..produced.len()].copy_from_slice(produced);
        enough_buffer.push(true);
    }

    Ok(RunOutputs { shapes, enough_buffer })
}
