//! Process-wide backend registry. Driver crates register a [`BackendProvider`]
//! through `inventory` at load time; the first registry access materialises every
//! provider into a backend instance, and the table is read-only from then on.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::{Error, Result};

/// A registered backend factory. `id` is the stable process-wide device id; when
/// two providers claim the same id the one registered later wins.
pub struct BackendProvider {
    pub id: usize,
    pub name: &'static str,
    pub build: fn() -> Result<Arc<dyn Backend>>,
}

inventory::collect!(BackendProvider);

struct Registry {
    backends: BTreeMap<usize, (String, Arc<dyn Backend>)>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut backends = BTreeMap::new();
    for provider in inventory::iter::<BackendProvider> {
        match (provider.build)() {
            Ok(backend) => {
                debug!("registering backend {} under id {}", provider.name, provider.id);
                backends.insert(provider.id, (provider.name.to_string(), backend));
            }
            Err(error) => {
                warn!("backend {} failed to initialise: {error}", provider.name);
            }
        }
    }
    Registry { backends }
});

/// Returns the ids of every registered backend, in ascending order.
pub fn all_ids() -> Vec<usize> {
    REGISTRY.backends.keys().copied().collect()
}

/// Resolves a backend by id.
pub fn backend(id: usize) -> Result<Arc<dyn Backend>> {
    REGISTRY
        .backends
        .get(&id)
        .map(|(_, backend)| Arc::clone(backend))
        .ok_or_else(|| Error::InvalidParameter(format!("no backend registered under id {id}")))
}

/// Returns the registered name of a backend.
pub fn backend_name(id: usize) -> Result<String> {
    REGISTRY
        .backends
        .get(&id)
        .map(|(name, _)| name.clone())
        .ok_or_else(|| Error::InvalidParameter(format!("no backend registered under id {id}")))
}
