//! Shared-memory transport types. Tensor storage never crosses the driver boundary
//! as a pointer: it travels as a file descriptor with a size, an offset into the
//! mapping and the length of the valid data. A runtime-owned descriptor is always
//! closed by the runtime, never by a backend.

use std::os::unix::io::RawFd;

use kitsune_tensor::{DataType, Format};

/// Sentinel descriptor meaning "no buffer".
pub const INVALID_FD: RawFd = -1;

/// A window into a shared-memory region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedBuffer {
    pub fd: RawFd,
    pub buffer_size: usize,
    pub offset: usize,
    pub data_size: usize,
}

impl SharedBuffer {
    /// The empty buffer, used wherever a tensor has no storage attached.
    pub const NONE: SharedBuffer = SharedBuffer {
        fd: INVALID_FD,
        buffer_size: 0,
        offset: 0,
        data_size: 0,
    };

    /// Returns true for the "no buffer" sentinel.
    pub fn is_none(&self) -> bool {
        self.fd == INVALID_FD
    }
}

/// The transport form of a tensor: its static attributes plus the shared-memory
/// window holding its elements.
#[derive(Clone, Debug)]
pub struct IoTensor {
    pub dtype: DataType,
    pub format: Format,
    pub dims: Vec<i32>,
    pub buffer: SharedBuffer,
}
