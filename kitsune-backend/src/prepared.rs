//! The `PreparedModel` trait: the opaque, backend-owned artefact produced by a
//! successful compilation. The runtime holds it behind an `Arc` and only ever
//! invokes the narrow surface below.

use kitsune_tensor::TensorDesc;

use crate::buffer::IoTensor;
use crate::Result;

/// Outcome of a successful run: the concrete shape of every output and, per
/// output, whether the supplied buffer was large enough to hold it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutputs {
    pub shapes: Vec<Vec<i32>>,
    pub enough_buffer: Vec<bool>,
}

/// Per-input dimension bounds. A fixed axis reports the same value in `min` and
/// `max`; a dynamic axis reports its real bounds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DimRanges {
    pub min: Vec<Vec<u32>>,
    pub max: Vec<Vec<u32>>,
}

/// Completion callback for an asynchronous run. Invoked exactly once, from a
/// backend-owned thread, with the run outcome or the failure (including timeout).
pub type RunDone = Box<dyn FnOnce(Result<RunOutputs>) + Send>;

/// A compiled model ready to execute on its backend.
pub trait PreparedModel: Send + Sync {
    /// Runs the model synchronously over the given shared-memory tensors,
    /// blocking the caller until the backend completes.
    fn run(&self, inputs: &[IoTensor], outputs: &[IoTensor]) -> Result<RunOutputs>;

    /// Dispatches an asynchronous run. The call returns as soon as the work is
    /// enqueued; `done` fires from a backend-owned thread once the run completes,
    /// fails or exceeds `timeout_ms`. Completions of one prepared model fire in
    /// submission order.
    fn run_async(
        &self,
        inputs: &[IoTensor],
        outputs: &[IoTensor],
        timeout_ms: u32,
        done: RunDone,
    ) -> Result<()>;

    /// Exports the backend-opaque cache blobs whose concatenation round-trips
    /// through `Backend::prepare_model_from_cache`.
    fn export_model_cache(&self) -> Result<Vec<Vec<u8>>>;

    /// Stable identifier of the compiled model, equal across cache round-trips.
    fn model_id(&self) -> u32;

    /// Descriptors of the model inputs, in binding order. Available for every
    /// preparation source, including cache and offline restores.
    fn input_descs(&self) -> Result<Vec<TensorDesc>>;

    /// Descriptors of the model outputs, in binding order.
    fn output_descs(&self) -> Result<Vec<TensorDesc>>;

    /// Reports the dimension bounds of every model input.
    fn input_dim_ranges(&self) -> Result<DimRanges>;

    /// Releases backend-side resources. Idempotent; the runtime calls it once
    /// when the last user of the model goes away.
    fn release(&self) -> Result<()>;
}
