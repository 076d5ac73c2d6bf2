//! Client slot for the optional scheduler service. When a scheduler is present it
//! authenticates oversized models before compilation, advises on admission, and
//! receives latency telemetry after runs; when absent every call site degrades to
//! best-effort and carries on.

use std::sync::{Arc, Mutex};

use kitsune_backend::Result;
use once_cell::sync::Lazy;

/// The scheduler service surface the runtime consumes.
pub trait SchedulerService: Send + Sync {
    /// Whether the service can authenticate models at all.
    fn is_authentication_supported(&self) -> Result<bool>;

    /// Authorises admission of an oversized model. An error refuses the model and
    /// aborts the build.
    fn authenticate(&self) -> Result<()>;

    /// Admission call after a successful build. Returns true when the scheduler
    /// wants a latency sample from the next run of this model.
    fn schedule(&self, model_id: u32, cache_path: Option<&str>) -> Result<bool>;

    /// Latency telemetry, reported from a detached task after a measured run.
    fn update_model_latency(&self, model_id: u32, micros: u64) -> Result<()>;

    /// Notifies the scheduler that an executor for this model went away.
    fn unload(&self, model_id: u32) -> Result<()>;
}

static SERVICE: Lazy<Mutex<Option<Arc<dyn SchedulerService>>>> = Lazy::new(|| Mutex::new(None));

/// Installs (or, with `None`, removes) the process-wide scheduler service.
pub fn install(service: Option<Arc<dyn SchedulerService>>) {
    *SERVICE.lock().expect("scheduler slot poisoned") = service;
}

/// The currently installed scheduler service, if any.
pub fn service() -> Option<Arc<dyn SchedulerService>> {
    SERVICE.lock().expect("scheduler slot poisoned").clone()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    use kitsune_backend::Error;

    use super::*;

    /// Serialises tests that install a scheduler; the slot is process-wide.
    static LOCK: Mutex<()> = Mutex::new(());

    pub fn exclusive() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A scripted scheduler recording the calls it receives.
    #[derive(Default)]
    pub struct MockScheduler {
        pub supports_authentication: bool,
        pub refuse_authentication: bool,
        pub want_latency: bool,
        pub authentications: AtomicU32,
        pub latency_reports: Mutex<Vec<(u32, u64)>>,
        pub unloads: Mutex<Vec<u32>>,
    }

    impl SchedulerService for MockScheduler {
        fn is_authentication_supported(&self) -> Result<bool> {
            Ok(self.supports_authentication)
        }

        fn authenticate(&self) -> Result<()> {
            self.authentications.fetch_add(1, Ordering::SeqCst);
            if self.refuse_authentication {
                return Err(Error::Failed("model refused by scheduler".into()));
            }
            Ok(())
        }

        fn schedule(&self, _model_id: u32, _cache_path: Option<&str>) -> Result<bool> {
            Ok(self.want_latency)
        }

        fn update_model_latency(&self, model_id: u32, micros: u64) -> Result<()> {
            self.latency_reports.lock().unwrap().push((model_id, micros));
            Ok(())
        }

        fn unload(&self, model_id: u32) -> Result<()> {
            self.unloads.lock().unwrap().push(model_id);
            Ok(())
        }
    }

    /// Installs a mock for the duration of the returned guard.
    pub struct Installed {
        pub scheduler: Arc<MockScheduler>,
        _guard: MutexGuard<'static, ()>,
    }

    impl Installed {
        pub fn new(scheduler: MockScheduler) -> Self {
            let guard = exclusive();
            let scheduler = Arc::new(scheduler);
            install(Some(Arc::clone(&scheduler) as Arc<dyn SchedulerService>));
            Self { scheduler, _guard: guard }
        }
    }

    impl Drop for Installed {
        fn drop(&mut self) {
            install(None);
        }
    }
}
