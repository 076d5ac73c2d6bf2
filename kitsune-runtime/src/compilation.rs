//! The compilation pipeline. A `Compilation` starts as a mutable configuration
//! (one model source, a target device and options) and `build()` turns it into a
//! backend-prepared model: capability gates, fingerprinting, the RAM-limit
//! admission gate, preparation from the selected source and cache persistence.
//! Once a prepared model exists the compilation is *Built* and immutable; before
//! that, any failure leaves it reconfigurable.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kitsune_backend::{
    Backend, Error, ModelConfig, PerformanceMode, PreparedModel, Priority, Result,
};
use kitsune_graph::Model;
use tracing::{debug, error, warn};

use crate::cache::{self, CacheDir};
use crate::fingerprint;
use crate::memory::MappedFile;
use crate::scheduler;

/// Model-size threshold of the scheduler's RAM-limit gate.
pub const MODEL_SIZE_LIMIT: usize = 200 * 1024 * 1024;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    Model,
    OfflinePath,
    OfflineBuffer,
    CacheBuffer,
    CacheDir,
}

pub(crate) struct Built {
    pub(crate) backend_id: usize,
    pub(crate) prepared: Arc<dyn PreparedModel>,
    pub(crate) fingerprint: String,
    pub(crate) model_id: u32,
    pub(crate) need_latency: bool,
    cache_version: u32,
}

/// A compilation: configuration while *Configured*, an immutable prepared model
/// once *Built*.
pub struct Compilation {
    backend_id: Option<usize>,
    model: Option<Model>,
    offline_path: Option<PathBuf>,
    offline_buffer: Option<Vec<u8>>,
    cache_dir: Option<(PathBuf, u32)>,
    cache_buffer: Option<Vec<u8>>,
    performance: PerformanceMode,
    priority: Priority,
    enable_float16: bool,
    extensions: HashMap<String, Vec<u8>>,
    built: Option<Built>,
}

impl Compilation {
    fn empty() -> Self {
        Self {
            backend_id: None,
            model: None,
            offline_path: None,
            offline_buffer: None,
            cache_dir: None,
            cache_buffer: None,
            performance: PerformanceMode::default(),
            priority: Priority::default(),
            enable_float16: false,
            extensions: HashMap::new(),
            built: None,
        }
    }

    /// Compilation of a freshly built in-memory model.
    pub fn from_model(model: Model) -> Result<Self> {
        if !model.is_frozen() {
            return Err(Error::OperationForbidden(
                "model must be built before compilation".into(),
            ));
        }
        let mut compilation = Self::empty();
        compilation.model = Some(model);
        Ok(compilation)
    }

    /// Compilation restored from a cache; select the cache with
    /// [`set_cache`](Self::set_cache) or [`import_cache_from_buffer`](Self::import_cache_from_buffer).
    pub fn for_cache() -> Self {
        Self::empty()
    }

    /// Compilation of a vendor pre-compiled model file.
    pub fn from_offline_file(path: impl Into<PathBuf>) -> Self {
        let mut compilation = Self::empty();
        compilation.offline_path = Some(path.into());
        compilation
    }

    /// Compilation of a vendor pre-compiled model buffer.
    pub fn from_offline_buffer(blob: impl Into<Vec<u8>>) -> Self {
        let mut compilation = Self::empty();
        compilation.offline_buffer = Some(blob.into());
        compilation
    }

    /// Selects the target device.
    pub fn set_device(&mut self, backend_id: usize) -> Result<()> {
        self.check_configurable()?;
        self.backend_id = Some(backend_id);
        Ok(())
    }

    /// Sets the cache directory and version: the persistence target when
    /// compiling from a model, the restore source when no model is present.
    pub fn set_cache(&mut self, path: impl Into<PathBuf>, version: u32) -> Result<()> {
        self.check_configurable()?;
        self.cache_dir = Some((path.into(), version));
        Ok(())
    }

    /// Adopts cache bytes previously produced by
    /// [`export_cache_to_buffer`](Self::export_cache_to_buffer).
    pub fn import_cache_from_buffer(&mut self, buffer: impl Into<Vec<u8>>) -> Result<()> {
        self.check_configurable()?;
        let buffer = buffer.into();
        if buffer.is_empty() {
            return Err(Error::InvalidParameter("cache buffer is empty".into()));
        }
        self.cache_buffer = Some(buffer);
        Ok(())
    }

    /// Sets the performance preference.
    pub fn set_performance_mode(&mut self, mode: PerformanceMode) -> Result<()> {
        self.check_configurable()?;
        self.performance = mode;
        Ok(())
    }

    /// Sets the scheduling priority.
    pub fn set_priority(&mut self, priority: Priority) -> Result<()> {
        self.check_configurable()?;
        self.priority = priority;
        Ok(())
    }

    /// Allows the backend to compute in reduced float16 precision.
    pub fn enable_float16(&mut self, enable: bool) -> Result<()> {
        self.check_configurable()?;
        self.enable_float16 = enable;
        Ok(())
    }

    /// Adds an opaque key→bytes option forwarded to the backend.
    pub fn add_extension_config(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.check_configurable()?;
        self.extensions.insert(name.into(), value.into());
        Ok(())
    }

    /// True once a prepared model exists.
    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    /// The model fingerprint, once built.
    pub fn fingerprint(&self) -> Option<&str> {
        self.built.as_ref().map(|built| built.fingerprint.as_str())
    }

    /// The scheduler model id, once built.
    pub fn model_id(&self) -> Option<u32> {
        self.built.as_ref().map(|built| built.model_id)
    }

    /// The backend-reported id of the prepared model, once built. Stable across
    /// cache round-trips of the same compiled model.
    pub fn prepared_model_id(&self) -> Result<u32> {
        Ok(self.built()?.prepared.model_id())
    }

    /// Serialises the prepared model's cache blobs into a single buffer that
    /// [`import_cache_from_buffer`](Self::import_cache_from_buffer) accepts.
    pub fn export_cache_to_buffer(&self) -> Result<Vec<u8>> {
        let built = self.built()?;
        let blobs = built.prepared.export_model_cache()?;
        cache::pack_blobs(built.cache_version, &blobs)
    }

    /// Runs the compilation pipeline. See the module documentation for the step
    /// order; failures before the backend produces a prepared model leave the
    /// compilation reconfigurable.
    pub fn build(&mut self) -> Result<()> {
        if self.built.is_some() {
            error!("compilation has already been built");
            return Err(Error::OperationForbidden("compilation is already built".into()));
        }
        let backend_id = self
            .backend_id
            .ok_or_else(|| Error::InvalidParameter("no device selected".into()))?;
        let backend = kitsune_backend::backend(backend_id)?;

        let source = self.select_source()?;
        self.check_capabilities(source, backend.as_ref())?;
        let config = self.model_config();

        let graph_bytes = match &self.model {
            Some(model) => Some(model.graph()?.serialize()?),
            None => None,
        };
        let fingerprint = self.fingerprint_source(source, graph_bytes.as_deref())?;
        let model_id = fingerprint::model_id(&fingerprint);
        debug!("model fingerprint {fingerprint} (id {model_id:#010x})");

        ram_limit_gate(self.source_size(source, graph_bytes.as_deref())?)?;

        let prepared = self.prepare(source, backend.as_ref(), &config)?;

        // A prepared model exists: the compilation is built from here on, even if
        // persistence or admission below report errors.
        let cache_version = self.cache_dir.as_ref().map_or(0, |(_, version)| *version);
        self.built = Some(Built {
            backend_id,
            prepared,
            fingerprint,
            model_id,
            need_latency: false,
            cache_version,
        });

        if source == Source::Model {
            if let Some((path, version)) = self.cache_dir.clone() {
                let built = self.built.as_ref().expect("just stored");
                let blobs = built.prepared.export_model_cache()?;
                CacheDir::new(path, version).save(&blobs)?;
            }
        }

        if let Some(service) = scheduler::service() {
            let cache_path = self.cache_dir.as_ref().map(|(path, _)| path.to_string_lossy().into_owned());
            match service.schedule(model_id, cache_path.as_deref()) {
                Ok(need_latency) => {
                    self.built.as_mut().expect("just stored").need_latency = need_latency;
                }
                Err(err) => warn!("scheduler admission call failed: {err}"),
            }
        }

        Ok(())
    }

    pub(crate) fn built(&self) -> Result<&Built> {
        self.built
            .as_ref()
            .ok_or_else(|| Error::OperationForbidden("compilation has not been built".into()))
    }

    fn check_configurable(&self) -> Result<()> {
        if self.built.is_some() {
            return Err(Error::OperationForbidden(
                "compilation options are frozen after build".into(),
            ));
        }
        Ok(())
    }

    /// Enforces that exactly one model source was selected.
    fn select_source(&self) -> Result<Source> {
        let mut sources = Vec::new();
        if self.model.is_some() {
            sources.push(Source::Model);
        }
        if self.offline_path.is_some() {
            sources.push(Source::OfflinePath);
        }
        if self.offline_buffer.is_some() {
            sources.push(Source::OfflineBuffer);
        }
        if self.cache_buffer.is_some() {
            sources.push(Source::CacheBuffer);
        }
        match sources.len() {
            0 if self.cache_dir.is_some() => Ok(Source::CacheDir),
            0 => Err(Error::InvalidParameter("no model source selected".into())),
            1 => Ok(sources[0]),
            _ => {
                error!("more than one model source selected");
                Err(Error::InvalidParameter("more than one model source selected".into()))
            }
        }
    }

    fn check_capabilities(&self, source: Source, backend: &dyn Backend) -> Result<()> {
        if self.enable_float16 && !backend.is_float16_supported()? {
            return Err(Error::Unsupported("float16 computation".into()));
        }
        if self.performance != PerformanceMode::None && !backend.is_performance_mode_supported()? {
            return Err(Error::Unsupported("performance mode".into()));
        }
        if self.priority != Priority::None && !backend.is_priority_supported()? {
            return Err(Error::Unsupported("priority".into()));
        }
        let wants_cache = self.cache_dir.is_some() || source == Source::CacheBuffer;
        if wants_cache && !backend.is_model_cache_supported()? {
            return Err(Error::Unsupported("model cache".into()));
        }
        Ok(())
    }

    fn model_config(&self) -> ModelConfig {
        let mut extensions = self
            .model
            .as_ref()
            .map(|model| model.extensions().entries().clone())
            .unwrap_or_default();
        extensions.extend(self.extensions.clone());
        ModelConfig {
            enable_float16: self.enable_float16,
            mode: self.performance,
            priority: self.priority,
            extensions,
        }
    }

    fn fingerprint_source(&self, source: Source, graph_bytes: Option<&[u8]>) -> Result<String> {
        Ok(match source {
            Source::Model => {
                fingerprint::digest_parts(&[graph_bytes.expect("model source has graph bytes")])
            }
            Source::OfflinePath => {
                let path = self.offline_path.as_ref().expect("offline path source");
                fingerprint::digest_parts(&[path.to_string_lossy().as_bytes()])
            }
            Source::CacheDir => {
                let (path, _) = self.cache_dir.as_ref().expect("cache dir source");
                fingerprint::digest_parts(&[path.to_string_lossy().as_bytes()])
            }
            Source::OfflineBuffer => {
                fingerprint::buffer_id(self.offline_buffer.as_ref().expect("offline buffer source"))
            }
            Source::CacheBuffer => {
                fingerprint::buffer_id(self.cache_buffer.as_ref().expect("cache buffer source"))
            }
        })
    }

    fn source_size(&self, source: Source, graph_bytes: Option<&[u8]>) -> Result<usize> {
        match source {
            Source::Model => Ok(graph_bytes.map_or(0, <[u8]>::len)),
            Source::OfflineBuffer => Ok(self.offline_buffer.as_ref().map_or(0, Vec::len)),
            Source::CacheBuffer => Ok(self.cache_buffer.as_ref().map_or(0, Vec::len)),
            Source::OfflinePath => {
                let path = self.offline_path.as_ref().expect("offline path source");
                file_size(path)
            }
            Source::CacheDir => {
                let (path, _) = self.cache_dir.as_ref().expect("cache dir source");
                directory_size(path)
            }
        }
    }

    fn prepare(
        &self,
        source: Source,
        backend: &dyn Backend,
        config: &ModelConfig,
    ) -> Result<Arc<dyn PreparedModel>> {
        match source {
            Source::Model => {
                let model = self.model.as_ref().expect("model source");
                backend.prepare_model(model.graph()?, config)
            }
            Source::OfflinePath => {
                let path = self.offline_path.as_ref().expect("offline path source");
                let blob = fs::read(path).map_err(|source| {
                    Error::InvalidFile(format!("cannot read {}: {source}", path.display()))
                })?;
                backend.prepare_offline_model(&blob, config)
            }
            Source::OfflineBuffer => {
                let blob = self.offline_buffer.as_ref().expect("offline buffer source");
                backend.prepare_offline_model(blob, config)
            }
            Source::CacheBuffer => {
                let buffer = self.cache_buffer.as_ref().expect("cache buffer source");
                let (_, blobs) = cache::unpack_blobs(buffer)?;
                let views: Vec<&[u8]> = blobs.iter().map(Vec::as_slice).collect();
                backend.prepare_model_from_cache(&views, config)
            }
            Source::CacheDir => {
                let (path, version) = self.cache_dir.as_ref().expect("cache dir source");
                let mapped = CacheDir::new(path, *version).load()?;
                let views: Vec<&[u8]> = mapped.iter().map(MappedFile::as_slice).collect();
                backend.prepare_model_from_cache(&views, config)
            }
        }
    }
}

impl Drop for Compilation {
    fn drop(&mut self) {
        if let Some(built) = &self.built {
            if let Err(err) = built.prepared.release() {
                warn!("prepared model release failed: {err}");
            }
        }
    }
}

fn file_size(path: &Path) -> Result<usize> {
    fs::metadata(path)
        .map(|metadata| metadata.len() as usize)
        .map_err(|source| Error::InvalidPath(format!("cannot stat {}: {source}", path.display())))
}

fn directory_size(path: &Path) -> Result<usize> {
    let entries = fs::read_dir(path)
        .map_err(|source| Error::InvalidPath(format!("cannot read {}: {source}", path.display())))?;
    let mut total = 0;
    for entry in entries {
        let entry = entry
            .map_err(|source| Error::InvalidPath(format!("cannot read {}: {source}", path.display())))?;
        total += entry.metadata().map(|metadata| metadata.len() as usize).unwrap_or(0);
    }
    Ok(total)
}

/// The scheduler's RAM-limit gate: oversized models must pass authentication when
/// a scheduler is reachable and supports it; an unreachable scheduler skips the
/// gate silently.
fn ram_limit_gate(model_size: usize) -> Result<()> {
    if model_size <= MODEL_SIZE_LIMIT {
        return Ok(());
    }
    let Some(service) = scheduler::service() else {
        debug!("no scheduler installed, skipping admission of {model_size}-byte model");
        return Ok(());
    };
    match service.is_authentication_supported() {
        Ok(true) => service.authenticate(),
        Ok(false) => Ok(()),
        Err(err) => {
            warn!("scheduler unreachable, skipping admission gate: {err}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use kitsune_backend_cpu::CPU_BACKEND_ID;
    use kitsune_graph::{OperatorType, TensorRole};
    use kitsune_tensor::{DataType, TensorDesc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::scheduler::testing::{Installed, MockScheduler};

    fn float_desc(shape: &[i32]) -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Float32);
        desc.set_shape(shape).unwrap();
        desc
    }

    fn add_model() -> Model {
        let mut model = Model::new();
        let a = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        let b = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        let mut scalar = TensorDesc::new();
        scalar.set_dtype(DataType::Int8);
        scalar.set_shape([]).unwrap();
        let activation = model.add_tensor(scalar).unwrap();
        model.set_tensor_role(activation, TensorRole::AddActivation).unwrap();
        model.set_tensor_value(activation, &[0]).unwrap();
        let out = model.add_tensor(float_desc(&[1, 2, 2, 3])).unwrap();
        model
            .add_operation(OperatorType::Add, &[activation], &[a, b], &[out])
            .unwrap();
        model.specify_inputs_and_outputs(&[a, b], &[out]).unwrap();
        model.build().unwrap();
        model
    }

    #[test]
    fn builds_from_model() {
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        compilation.build().unwrap();
        assert!(compilation.is_built());
        assert_eq!(compilation.fingerprint().unwrap().len(), 64);
    }

    #[test]
    fn unbuilt_model_rejected() {
        assert!(matches!(
            Compilation::from_model(Model::new()),
            Err(Error::OperationForbidden(_))
        ));
    }

    #[test]
    fn device_must_be_selected() {
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        assert!(matches!(compilation.build(), Err(Error::InvalidParameter(_))));

        // The failure left the compilation reconfigurable.
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        compilation.build().unwrap();
    }

    #[test]
    fn setters_frozen_after_build() {
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        compilation.build().unwrap();

        assert!(matches!(
            compilation.set_performance_mode(PerformanceMode::High),
            Err(Error::OperationForbidden(_))
        ));
        assert!(matches!(
            compilation.enable_float16(true),
            Err(Error::OperationForbidden(_))
        ));
        assert!(matches!(compilation.build(), Err(Error::OperationForbidden(_))));
    }

    #[test]
    fn multiple_sources_rejected() {
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        compilation.offline_buffer = Some(vec![1, 2, 3]);
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        assert!(matches!(compilation.build(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn missing_source_rejected() {
        let mut compilation = Compilation::for_cache();
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        assert!(matches!(compilation.build(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn float16_gate() {
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        compilation.enable_float16(true).unwrap();
        assert!(matches!(compilation.build(), Err(Error::Unsupported(_))));

        // Reconfigure and retry: allowed, no prepared model exists yet.
        compilation.enable_float16(false).unwrap();
        compilation.set_performance_mode(PerformanceMode::High).unwrap();
        compilation.set_priority(Priority::Medium).unwrap();
        compilation.build().unwrap();
    }

    #[test]
    fn ram_gate_decision_table() {
        // Small models never consult the scheduler.
        ram_limit_gate(MODEL_SIZE_LIMIT).unwrap();

        // No scheduler installed: gate skipped.
        {
            let _guard = crate::scheduler::testing::exclusive();
            ram_limit_gate(MODEL_SIZE_LIMIT + 1).unwrap();
        }

        // Scheduler without authentication support: gate passes.
        {
            let installed = Installed::new(MockScheduler::default());
            ram_limit_gate(MODEL_SIZE_LIMIT + 1).unwrap();
            assert_eq!(installed.scheduler.authentications.load(std::sync::atomic::Ordering::SeqCst), 0);
        }

        // Scheduler refuses: the refusal is returned verbatim.
        {
            let installed = Installed::new(MockScheduler {
                supports_authentication: true,
                refuse_authentication: true,
                ..Default::default()
            });
            assert!(matches!(
                ram_limit_gate(MODEL_SIZE_LIMIT + 1),
                Err(Error::Failed(_))
            ));
            assert_eq!(installed.scheduler.authentications.load(std::sync::atomic::Ordering::SeqCst), 1);
        }

        // Scheduler accepts.
        {
            let _installed = Installed::new(MockScheduler {
                supports_authentication: true,
                ..Default::default()
            });
            ram_limit_gate(MODEL_SIZE_LIMIT + 1).unwrap();
        }
    }

    #[test]
    fn admission_sets_latency_flag() {
        let _installed = Installed::new(MockScheduler { want_latency: true, ..Default::default() });
        let mut compilation = Compilation::from_model(add_model()).unwrap();
        compilation.set_device(CPU_BACKEND_ID).unwrap();
        compilation.build().unwrap();
        assert!(compilation.built().unwrap().need_latency);
    }
}
