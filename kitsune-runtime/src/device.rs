//! Device enumeration and per-device queries, thin wrappers over the backend
//! registry for the runtime's public surface.

use kitsune_backend::{DeviceType, Result};
use kitsune_graph::Model;

/// Ids of every device registered in this process, in ascending order.
pub fn all_devices() -> Vec<usize> {
    kitsune_backend::all_ids()
}

/// Name reported by a device.
pub fn device_name(backend_id: usize) -> Result<String> {
    kitsune_backend::backend(backend_id)?.device_name()
}

/// Classification reported by a device.
pub fn device_type(backend_id: usize) -> Result<DeviceType> {
    kitsune_backend::backend(backend_id)?.device_type()
}

/// Per-node support mask of a model on a device. Freezes the model first if the
/// caller has not built it yet.
pub fn supported_operations(model: &mut Model, backend_id: usize) -> Result<Vec<bool>> {
    if !model.is_frozen() {
        model.build()?;
    }
    kitsune_backend::backend(backend_id)?.supported_operations(model.graph()?)
}

#[cfg(test)]
mod tests {
    use kitsune_backend::DeviceType;
    use kitsune_backend_cpu::CPU_BACKEND_ID;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cpu_device_enumerated() {
        assert!(all_devices().contains(&CPU_BACKEND_ID));
        assert_eq!(device_name(CPU_BACKEND_ID).unwrap(), "cpu");
        assert_eq!(device_type(CPU_BACKEND_ID).unwrap(), DeviceType::Cpu);
    }

    #[test]
    fn unknown_device_rejected() {
        assert!(device_name(usize::MAX).is_err());
    }
}
