//! Process-wide shared-memory registry. Every region the runtime maps is recorded
//! under its user-visible address so that, when a tensor handle crosses the driver
//! boundary as an fd/size/offset tuple, the original descriptor can be recovered
//! from the pointer the client holds. The registry is one of the two process
//! singletons of the runtime; its map is mutex-guarded and read-mostly.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Mutex;

use kitsune_backend::{Error, Result};
use once_cell::sync::Lazy;
use tracing::error;

/// Upper bound on a single shared-memory allocation.
pub const ALLOCATE_BUFFER_LIMIT: usize = 1 << 30;

/// One registered mapping. `owned` mappings were created for backend-allocated
/// buffers and the runtime closes their descriptor on unmap; borrowed mappings
/// wrap client-supplied memory whose descriptor stays with the client.
#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub fd: RawFd,
    pub length: usize,
    owned: bool,
}

static SEGMENTS: Lazy<Mutex<HashMap<usize, Segment>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn mmap_shared(fd: RawFd, length: usize) -> Result<NonNull<u8>> {
    if fd < 0 {
        return Err(Error::InvalidParameter(format!("cannot map invalid fd {fd}")));
    }
    if length == 0 || length > ALLOCATE_BUFFER_LIMIT {
        error!("mapping length {length} out of range (limit {ALLOCATE_BUFFER_LIMIT})");
        return Err(Error::InvalidParameter(format!(
            "mapping length {length} out of range"
        )));
    }
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            length,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        let source = io::Error::last_os_error();
        error!("mmap of fd {fd} failed: {source}");
        return Err(Error::MemoryError(source.into()));
    }
    Ok(NonNull::new(addr.cast()).expect("mmap returned a non-null address"))
}

fn register(ptr: NonNull<u8>, segment: Segment) {
    let mut segments = SEGMENTS.lock().expect("shared-memory registry poisoned");
    segments.insert(ptr.as_ptr() as usize, segment);
}

/// Maps a backend-allocated buffer and registers it as runtime-owned: `unmap`
/// will close the descriptor exactly once.
pub fn map_owned(fd: RawFd, length: usize) -> Result<NonNull<u8>> {
    let ptr = mmap_shared(fd, length)?;
    register(ptr, Segment { fd, length, owned: true });
    Ok(ptr)
}

/// Maps client-supplied memory and registers it as borrowed: `unmap` releases the
/// mapping but leaves the descriptor with the client.
pub fn map_borrowed(fd: RawFd, length: usize) -> Result<NonNull<u8>> {
    let ptr = mmap_shared(fd, length)?;
    register(ptr, Segment { fd, length, owned: false });
    Ok(ptr)
}

/// Recovers the registered segment behind a user pointer.
pub fn get(ptr: NonNull<u8>) -> Result<Segment> {
    let segments = SEGMENTS.lock().expect("shared-memory registry poisoned");
    segments
        .get(&(ptr.as_ptr() as usize))
        .copied()
        .ok_or_else(|| Error::InvalidParameter("pointer is not a registered shared buffer".into()))
}

/// Unmaps a registered segment and erases its entry. Owned descriptors are closed
/// here and only here.
pub fn unmap(ptr: NonNull<u8>) -> Result<()> {
    let segment = {
        let mut segments = SEGMENTS.lock().expect("shared-memory registry poisoned");
        segments
            .remove(&(ptr.as_ptr() as usize))
            .ok_or_else(|| Error::InvalidParameter("pointer is not a registered shared buffer".into()))?
    };

    if unsafe { libc::munmap(ptr.as_ptr().cast(), segment.length) } != 0 {
        let source = io::Error::last_os_error();
        error!("munmap failed: {source}");
        return Err(Error::MemoryError(source.into()));
    }
    if segment.owned && unsafe { libc::close(segment.fd) } != 0 {
        let source = io::Error::last_os_error();
        error!("close of fd {} failed: {source}", segment.fd);
        return Err(Error::MemoryError(source.into()));
    }
    Ok(())
}

/// Number of live registered mappings.
pub fn live_mappings() -> usize {
    SEGMENTS.lock().expect("shared-memory registry poisoned").len()
}

/// A read-only mapping of a whole file, used to hand cache blobs to a backend
/// without copying them through the heap.
pub struct MappedFile {
    ptr: NonNull<u8>,
    len: usize,
}

impl MappedFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|source| Error::InvalidFile(format!("cannot open {}: {source}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|source| Error::InvalidFile(format!("cannot stat {}: {source}", path.display())))?
            .len() as usize;
        if len == 0 {
            return Err(Error::InvalidFile(format!("{} is empty", path.display())));
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            let source = io::Error::last_os_error();
            error!("mmap of {} failed: {source}", path.display());
            return Err(Error::MemoryError(source.into()));
        }
        // The mapping keeps the file contents alive; the descriptor can go.
        Ok(Self {
            ptr: NonNull::new(addr.cast()).expect("mmap returned a non-null address"),
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            error!("munmap of cache file failed: {}", io::Error::last_os_error());
        }
    }
}

unsafe impl Send for MappedFile {}
