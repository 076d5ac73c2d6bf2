//! Extension configuration: free-form key→bytes entries that travel with a model
//! into compilation. A handful of keys are understood by the runtime itself; all
//! others are forwarded to the backend untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Key of the externally supplied quantisation buffer.
pub const KEY_QUANT_BUFFER: &str = "QuantBuffer";
/// Key of the human-readable model name.
pub const KEY_MODEL_NAME: &str = "ModelName";
/// Key of the profiling switch.
pub const KEY_PROFILING: &str = "Profiling";
/// Key of the operator layout hint.
pub const KEY_OP_LAYOUT: &str = "opLayout";

/// Key→bytes configuration attached to adopted graphs and compilations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    entries: HashMap<String, Vec<u8>>,
}

impl ExtensionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, replacing any previous value under the same key.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Returns the raw bytes stored under a key.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Returns all entries, for forwarding to a backend.
    pub fn entries(&self) -> &HashMap<String, Vec<u8>> {
        &self.entries
    }

    /// Returns true when no entry was set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The model name entry, when present and valid UTF-8.
    pub fn model_name(&self) -> Option<&str> {
        self.get(KEY_MODEL_NAME)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// The externally supplied quantisation buffer, when present.
    pub fn quant_buffer(&self) -> Option<&[u8]> {
        self.get(KEY_QUANT_BUFFER)
    }

    /// True when profiling was requested.
    pub fn profiling_enabled(&self) -> bool {
        matches!(self.get(KEY_PROFILING), Some([value, ..]) if *value != 0)
    }

    /// The operator layout hint, when present.
    pub fn op_layout(&self) -> Option<&[u8]> {
        self.get(KEY_OP_LAYOUT)
    }
}
