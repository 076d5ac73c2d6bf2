//! Mapping shared buffers into the interpreter's address space. A `Mapping` is the
//! driver-side view of a `SharedBuffer`: it maps the whole buffer, exposes the
//! window the tensor occupies, and unmaps on drop.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;
use std::slice;

use kitsune_backend::{Error, Result, SharedBuffer};
use tracing::error;

pub struct Mapping {
    ptr: *mut u8,
    len: usize,
}

impl Mapping {
    /// Maps `len` bytes of `fd`, shared and writable.
    pub fn new(fd: RawFd, len: usize) -> Result<Self> {
        if fd < 0 || len == 0 {
            return Err(Error::InvalidParameter(format!(
                "cannot map fd {fd} with length {len}"
            )));
        }
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            error!("mmap of fd {fd} ({len} bytes) failed: {source}");
            return Err(Error::MemoryError(source.into()));
        }
        Ok(Self { ptr: ptr.cast(), len })
    }

    /// Maps the buffer of an incoming tensor.
    pub fn of(buffer: &SharedBuffer) -> Result<Self> {
        if buffer.offset + buffer.data_size > buffer.buffer_size {
            return Err(Error::InvalidParameter(format!(
                "tensor window {}+{} exceeds buffer of {} bytes",
                buffer.offset, buffer.data_size, buffer.buffer_size
            )));
        }
        Self::new(buffer.fd, buffer.buffer_size)
    }

    /// The tensor window of a mapped buffer.
    pub fn window(&self, buffer: &SharedBuffer) -> &[u8] {
        let all = unsafe { slice::from_raw_parts(self.ptr, self.len) };
        &all[buffer.offset..buffer.offset + buffer.data_size]
    }

    /// The mutable tensor window of a mapped buffer.
    pub fn window_mut(&mut self, buffer: &SharedBuffer) -> &mut [u8] {
        let all = unsafe { slice::from_raw_parts_mut(self.ptr, self.len) };
        &mut all[buffer.offset..buffer.offset + buffer.data_size]
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.cast(), self.len) } != 0 {
            error!("munmap failed: {}", io::Error::last_os_error());
        }
    }
}

// The mapping is plain shared memory; moving it between threads is safe.
unsafe impl Send for Mapping {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::allocate;

    #[test]
    fn window_round_trip() {
        let fd = allocate(128).unwrap();
        let buffer = SharedBuffer { fd, buffer_size: 128, offset: 16, data_size: 64 };

        let mut mapping = Mapping::of(&buffer).unwrap();
        mapping.window_mut(&buffer).fill(7);
        drop(mapping);

        let mapping = Mapping::of(&buffer).unwrap();
        assert!(mapping.window(&buffer).iter().all(|&byte| byte == 7));
        drop(mapping);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn window_must_fit_buffer() {
        let fd = allocate(32).unwrap();
        let buffer = SharedBuffer { fd, buffer_size: 32, offset: 16, data_size: 32 };
        assert!(matches!(Mapping::of(&buffer), Err(Error::InvalidParameter(_))));
        unsafe { libc::close(fd) };
    }
}
