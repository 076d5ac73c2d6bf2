//! The shared-memory arena. Buffers are anonymous `memfd` files sized with
//! `ftruncate`; the descriptor is the arena's only handle, so ownership transfers
//! to the caller and releasing a buffer needs no arena-side bookkeeping.

use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

use kitsune_backend::{Error, Result};
use tracing::error;

/// Allocates a shared-memory buffer of `size` bytes and returns its descriptor.
pub fn allocate(size: usize) -> Result<RawFd> {
    if size == 0 {
        return Err(Error::InvalidParameter("cannot allocate an empty buffer".into()));
    }

    let name = CString::new("kitsune-cpu-arena").expect("static arena name");
    let fd = unsafe { libc::memfd_create(name.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        let source = io::Error::last_os_error();
        error!("memfd_create failed: {source}");
        return Err(Error::MemoryError(source.into()));
    }

    if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
        let source = io::Error::last_os_error();
        error!("ftruncate to {size} bytes failed: {source}");
        unsafe { libc::close(fd) };
        return Err(Error::MemoryError(source.into()));
    }

    Ok(fd)
}
