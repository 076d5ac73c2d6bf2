//! The `CpuBackend` type and its registration. The backend answers capability
//! queries, lowers graphs through [`Plan`] and hands out `memfd`-backed shared
//! memory. It registers itself under device id 0 at load time.

use std::os::unix::io::RawFd;
use std::sync::Arc;

use kitsune_backend::{
    Backend, BackendProvider, DeviceStatus, DeviceType, Error, ModelConfig, PreparedModel, Result,
};
use kitsune_graph::Graph;
use tracing::debug;

use crate::alloc;
use crate::plan::{node_supported, Plan};
use crate::prepared::CpuPreparedModel;

/// Stable process-wide id of the reference CPU device.
pub const CPU_BACKEND_ID: usize = 0;

#[derive(Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }

    fn check_config(&self, config: &ModelConfig) -> Result<()> {
        if config.enable_float16 {
            return Err(Error::Unsupported("float16 computation".into()));
        }
        debug!(
            "preparing with mode {:?}, priority {:?}, {} extension entries",
            config.mode,
            config.priority,
            config.extensions.len()
        );
        Ok(())
    }
}

impl Backend for CpuBackend {
    fn device_name(&self) -> Result<String> {
        Ok("cpu".into())
    }

    fn vendor_name(&self) -> Result<String> {
        Ok("kitsune".into())
    }

    fn version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").into())
    }

    fn device_type(&self) -> Result<DeviceType> {
        Ok(DeviceType::Cpu)
    }

    fn status(&self) -> Result<DeviceStatus> {
        Ok(DeviceStatus::Available)
    }

    fn supported_operations(&self, graph: &Graph) -> Result<Vec<bool>> {
        Ok(graph
            .nodes()
            .iter()
            .map(|node| node_supported(graph, node))
            .collect())
    }

    fn is_float16_supported(&self) -> Result<bool> {
        Ok(false)
    }

    fn is_performance_mode_supported(&self) -> Result<bool> {
        Ok(true)
    }

    fn is_priority_supported(&self) -> Result<bool> {
        Ok(true)
    }

    fn is_dynamic_input_supported(&self) -> Result<bool> {
        Ok(false)
    }

    fn is_model_cache_supported(&self) -> Result<bool> {
        Ok(true)
    }

    fn prepare_model(&self, graph: &Graph, config: &ModelConfig) -> Result<Arc<dyn PreparedModel>> {
        self.check_config(config)?;
        let plan = Plan::lower(graph)?;
        Ok(Arc::new(CpuPreparedModel::new(plan)?))
    }

    fn prepare_model_from_cache(
        &self,
        caches: &[&[u8]],
        config: &ModelConfig,
    ) -> Result<Arc<dyn PreparedModel>> {
        self.check_config(config)?;
        if caches.is_empty() {
            return Err(Error::InvalidParameter("no cache blobs supplied".into()));
        }
        let bytes: Vec<u8> = caches.concat();
        let plan = Plan::from_bytes(&bytes)?;
        Ok(Arc::new(CpuPreparedModel::new(plan)?))
    }

    fn prepare_offline_model(
        &self,
        blob: &[u8],
        config: &ModelConfig,
    ) -> Result<Arc<dyn PreparedModel>> {
        // The cpu backend's offline format is its own cache format.
        self.prepare_model_from_cache(&[blob], config)
    }

    fn allocate_buffer(&self, size: usize) -> Result<RawFd> {
        alloc::allocate(size)
    }

    fn release_buffer(&self, fd: RawFd, size: usize) -> Result<()> {
        if fd < 0 || size == 0 {
            return Err(Error::InvalidParameter(format!(
                "cannot release fd {fd} with size {size}"
            )));
        }
        // The arena keeps no per-buffer state; the caller owns and closes the fd.
        Ok(())
    }
}

fn build_backend() -> Result<Arc<dyn Backend>> {
    Ok(Arc::new(CpuBackend::new()))
}

inventory::submit! {
    BackendProvider {
        id: CPU_BACKEND_ID,
        name: "cpu",
        build: build_backend,
    }
}
