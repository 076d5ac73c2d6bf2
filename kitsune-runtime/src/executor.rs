//! Execution of prepared models. An `Executor` binds storage-backed tensors to a
//! prepared model, runs it synchronously or asynchronously, reports output shapes
//! and dimension ranges, and feeds run latency back to the scheduler when asked.
//! A transport failure latches the executor: once the backing service died, every
//! subsequent operation reports `UnavailableDevice`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use kitsune_backend::{Error, IoTensor, PreparedModel, Result, RunOutputs};
use kitsune_tensor::TensorDesc;
use tracing::{debug, warn};

use crate::compilation::Compilation;
use crate::scheduler;
use crate::tensor::Tensor;

/// Upper bound on the number of inputs and on the number of outputs per run.
pub const MAX_IO_COUNT: usize = 200;

/// Completion callback of asynchronous runs. Invoked from a backend-owned thread
/// with no runtime lock held; it must not re-enter the same executor.
pub type OnRunDone = Arc<dyn Fn(RunDoneEvent) + Send + Sync>;

/// Transport-failure callback. Receives the user data of the run that observed
/// the failure; the executor is permanently invalid afterwards.
pub type OnServiceDied = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Outcome of one asynchronous run, delivered to [`OnRunDone`].
pub struct RunDoneEvent {
    pub user_data: Box<dyn Any + Send>,
    pub result: Result<()>,
    pub output_shapes: Vec<Vec<i32>>,
}

/// Executes a prepared model over bound tensors.
pub struct Executor {
    backend_id: usize,
    model_id: u32,
    prepared: Arc<dyn PreparedModel>,
    input_templates: Vec<TensorDesc>,
    output_templates: Vec<TensorDesc>,
    backend_config: HashMap<String, Vec<u8>>,
    need_latency: AtomicBool,
    on_run_done: Mutex<Option<OnRunDone>>,
    on_service_died: Mutex<Option<OnServiceDied>>,
    dead: Arc<AtomicBool>,
    last_output_shapes: Arc<Mutex<Vec<Vec<i32>>>>,
}

impl Executor {
    /// Creates an executor over a built compilation.
    pub fn new(compilation: &Compilation) -> Result<Self> {
        let built = compilation.built()?;
        let input_templates = built.prepared.input_descs()?;
        let output_templates = built.prepared.output_descs()?;

        // The per-executor configuration a backend may inspect: the scheduler's
        // model id as an ASCII decimal string and the one-byte latency flag.
        let mut backend_config = HashMap::new();
        backend_config.insert("modelId".to_string(), built.model_id.to_string().into_bytes());
        backend_config.insert("needModelLatency".to_string(), vec![built.need_latency as u8]);

        Ok(Self {
            backend_id: built.backend_id,
            model_id: built.model_id,
            prepared: Arc::clone(&built.prepared),
            input_templates,
            output_templates,
            backend_config,
            need_latency: AtomicBool::new(built.need_latency),
            on_run_done: Mutex::new(None),
            on_service_died: Mutex::new(None),
            dead: Arc::new(AtomicBool::new(false)),
            last_output_shapes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Number of model inputs.
    pub fn input_count(&self) -> usize {
        self.input_templates.len()
    }

    /// Number of model outputs.
    pub fn output_count(&self) -> usize {
        self.output_templates.len()
    }

    /// Fresh copy of one input descriptor template.
    pub fn create_input_desc(&self, index: usize) -> Result<TensorDesc> {
        self.check_alive()?;
        self.input_templates
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no input at index {index}")))
    }

    /// Fresh copy of one output descriptor template.
    pub fn create_output_desc(&self, index: usize) -> Result<TensorDesc> {
        self.check_alive()?;
        self.output_templates
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no output at index {index}")))
    }

    /// Dimension bounds of one input.
    pub fn input_dim_range(&self, index: usize) -> Result<(Vec<u32>, Vec<u32>)> {
        self.check_alive()?;
        let ranges = self.prepared.input_dim_ranges()?;
        match (ranges.min.get(index), ranges.max.get(index)) {
            (Some(min), Some(max)) => Ok((min.clone(), max.clone())),
            _ => Err(Error::InvalidParameter(format!("no input at index {index}"))),
        }
    }

    /// Shape one output took in the most recent completed run.
    pub fn output_shape(&self, index: usize) -> Result<Vec<i32>> {
        self.check_alive()?;
        let shapes = self.last_output_shapes.lock().expect("shape slot poisoned");
        if shapes.is_empty() {
            return Err(Error::OperationForbidden("no run has completed yet".into()));
        }
        shapes
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidParameter(format!("no output at index {index}")))
    }

    /// Registers the run-completion callback; last registration wins and `None`
    /// unregisters.
    pub fn set_on_run_done(&self, callback: Option<OnRunDone>) -> Result<()> {
        self.check_alive()?;
        *self.on_run_done.lock().expect("callback slot poisoned") = callback;
        Ok(())
    }

    /// Registers the transport-failure callback; last registration wins and
    /// `None` unregisters.
    pub fn set_on_service_died(&self, callback: Option<OnServiceDied>) -> Result<()> {
        self.check_alive()?;
        *self.on_service_died.lock().expect("callback slot poisoned") = callback;
        Ok(())
    }

    /// The per-executor configuration surfaced to the backend.
    pub fn backend_config(&self) -> &HashMap<String, Vec<u8>> {
        &self.backend_config
    }

    /// Runs the model synchronously, blocking until the backend completes.
    pub fn run_sync(&self, inputs: &[&Tensor], outputs: &[&Tensor]) -> Result<()> {
        self.check_alive()?;
        let ins = self.bind(inputs, &self.input_templates, "input")?;
        let outs = self.bind(outputs, &self.output_templates, "output")?;

        let measure = self.need_latency.load(Ordering::Acquire);
        let started = measure.then(Instant::now);

        let run_outputs = match self.prepared.run(&ins, &outs) {
            Ok(run_outputs) => run_outputs,
            Err(err) => {
                if matches!(err, Error::UnavailableDevice(_)) {
                    self.dead.store(true, Ordering::Release);
                }
                return Err(err);
            }
        };
        *self.last_output_shapes.lock().expect("shape slot poisoned") = run_outputs.shapes;

        if let Some(started) = started {
            let micros = started.elapsed().as_micros() as u64;
            let model_id = self.model_id;
            thread::spawn(move || {
                if let Some(service) = scheduler::service() {
                    if let Err(err) = service.update_model_latency(model_id, micros) {
                        warn!("latency report for model {model_id:#010x} failed: {err}");
                    }
                }
            });
            self.need_latency.store(false, Ordering::Release);
        }

        Ok(())
    }

    /// Dispatches an asynchronous run. Exactly one of the registered callbacks
    /// fires for an accepted run: `on_run_done` with the outcome (including the
    /// backend's timeout failure), or `on_service_died` when the transport died.
    pub fn run_async(
        &self,
        inputs: &[&Tensor],
        outputs: &[&Tensor],
        timeout_ms: u32,
        user_data: Box<dyn Any + Send>,
    ) -> Result<()> {
        self.check_alive()?;
        let ins = self.bind(inputs, &self.input_templates, "input")?;
        let outs = self.bind(outputs, &self.output_templates, "output")?;

        // Capture the callbacks at dispatch time; no executor lock is held when
        // the backend later invokes the completion closure.
        let run_done = self.on_run_done.lock().expect("callback slot poisoned").clone();
        let service_died = self.on_service_died.lock().expect("callback slot poisoned").clone();
        let dead = Arc::clone(&self.dead);
        let shape_slot = Arc::clone(&self.last_output_shapes);

        let done = Box::new(move |result: Result<RunOutputs>| match result {
            Ok(outputs) => {
                *shape_slot.lock().expect("shape slot poisoned") = outputs.shapes.clone();
                match run_done {
                    Some(callback) => callback(RunDoneEvent {
                        user_data,
                        result: Ok(()),
                        output_shapes: outputs.shapes,
                    }),
                    None => debug!("async run completed with no callback registered"),
                }
            }
            Err(err) => {
                if matches!(err, Error::UnavailableDevice(_)) {
                    dead.store(true, Ordering::Release);
                    match service_died {
                        Some(callback) => callback(user_data),
                        None => warn!("service died with no callback registered: {err}"),
                    }
                } else {
                    match run_done {
                        Some(callback) => callback(RunDoneEvent {
                            user_data,
                            result: Err(err),
                            output_shapes: Vec::new(),
                        }),
                        None => warn!("async run failed with no callback registered"),
                    }
                }
            }
        });

        self.prepared.run_async(&ins, &outs, timeout_ms, done)
    }

    fn check_alive(&self) -> Result<()> {
        if self.dead.load(Ordering::Acquire) {
            return Err(Error::UnavailableDevice("executor backend service died".into()));
        }
        Ok(())
    }

    /// Validates a tensor list against its templates and converts it into the
    /// transport form: matching count, storage present, bound to this executor's
    /// backend, descriptor compatible with the template.
    fn bind(&self, tensors: &[&Tensor], templates: &[TensorDesc], what: &str) -> Result<Vec<IoTensor>> {
        if tensors.len() != templates.len() || tensors.len() > MAX_IO_COUNT {
            return Err(Error::InvalidParameter(format!(
                "expected {} {what} tensors, got {}",
                templates.len(),
                tensors.len()
            )));
        }
        tensors
            .iter()
            .zip(templates)
            .enumerate()
            .map(|(index, (tensor, template))| {
                if tensor.backend_id() != self.backend_id {
                    return Err(Error::InvalidParameter(format!(
                        "{what} tensor {index} is bound to backend {}, executor uses {}",
                        tensor.backend_id(),
                        self.backend_id
                    )));
                }
                if !template.compatible_with(tensor.desc()) {
                    return Err(Error::InvalidParameter(format!(
                        "{what} tensor {index} does not match the model's descriptor"
                    )));
                }
                tensor.io_tensor()
            })
            .collect()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(service) = scheduler::service() {
            if let Err(err) = service.unload(self.model_id) {
                warn!("scheduler unload of model {:#010x} failed: {err}", self.model_id);
            }
        }
    }
}
