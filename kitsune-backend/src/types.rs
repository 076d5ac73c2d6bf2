//! Compilation options and device classification shared between the runtime and
//! the drivers.

use std::collections::HashMap;

/// Performance preference applied to a prepared model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PerformanceMode {
    #[default]
    None,
    Low,
    Medium,
    High,
    Extreme,
}

/// Scheduling priority applied to a prepared model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    #[default]
    None,
    Low,
    Medium,
    High,
}

/// Coarse classification of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    Other,
    Cpu,
    Gpu,
    Accelerator,
}

/// Availability of a device at query time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Available,
    Busy,
    Offline,
    Unknown,
}

/// Options forwarded to a backend when preparing a model. The extension entries
/// are opaque key→bytes pairs; the runtime forwards them untouched.
#[derive(Clone, Debug, Default)]
pub struct ModelConfig {
    pub enable_float16: bool,
    pub mode: PerformanceMode,
    pub priority: Priority,
    pub extensions: HashMap<String, Vec<u8>>,
}
