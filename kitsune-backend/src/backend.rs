//! The `Backend` trait, the main interface a device driver implements. The runtime
//! consults it for identity and capability queries, asks it to prepare models from
//! the graph IR, a cache or an offline blob, and borrows its shared-memory arena
//! for tensor storage.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use kitsune_graph::Graph;

use crate::prepared::PreparedModel;
use crate::types::{DeviceStatus, DeviceType, ModelConfig};
use crate::Result;

pub trait Backend: Send + Sync {
    /// Human-readable device name.
    fn device_name(&self) -> Result<String>;

    /// Vendor of the device.
    fn vendor_name(&self) -> Result<String>;

    /// Driver version string.
    fn version(&self) -> Result<String>;

    /// Coarse device classification.
    fn device_type(&self) -> Result<DeviceType>;

    /// Current availability of the device.
    fn status(&self) -> Result<DeviceStatus>;

    /// Reports, per node of the graph, whether this backend can execute it.
    fn supported_operations(&self, graph: &Graph) -> Result<Vec<bool>>;

    /// True if the backend can compute in reduced float16 precision.
    fn is_float16_supported(&self) -> Result<bool>;

    /// True if the backend honours the performance-mode option.
    fn is_performance_mode_supported(&self) -> Result<bool>;

    /// True if the backend honours the priority option.
    fn is_priority_supported(&self) -> Result<bool>;

    /// True if the backend accepts inputs with dynamic axes.
    fn is_dynamic_input_supported(&self) -> Result<bool>;

    /// True if the backend can export and re-import compiled model caches.
    fn is_model_cache_supported(&self) -> Result<bool>;

    /// Compiles a frozen graph into a prepared model.
    fn prepare_model(&self, graph: &Graph, config: &ModelConfig) -> Result<Arc<dyn PreparedModel>>;

    /// Restores a prepared model from previously exported cache blobs.
    fn prepare_model_from_cache(
        &self,
        caches: &[&[u8]],
        config: &ModelConfig,
    ) -> Result<Arc<dyn PreparedModel>>;

    /// Adopts a vendor pre-compiled model blob.
    fn prepare_offline_model(
        &self,
        blob: &[u8],
        config: &ModelConfig,
    ) -> Result<Arc<dyn PreparedModel>>;

    /// Allocates `size` bytes of shared memory and returns the owning descriptor.
    /// Ownership of the descriptor passes to the caller.
    fn allocate_buffer(&self, size: usize) -> Result<RawFd>;

    /// Releases the arena bookkeeping for a buffer previously allocated here. The
    /// caller still owns, and closes, the descriptor itself.
    fn release_buffer(&self, fd: RawFd, size: usize) -> Result<()>;
}
