//! Storage-backed tensors. A runtime tensor couples a descriptor with a window of
//! shared memory: either a buffer the runtime allocated from the tensor's backend
//! (owned: unmapped, closed and released on drop) or memory the client brought
//! (borrowed: the descriptor stays with the client). Every tensor is bound to
//! exactly one backend for the life of its storage.

use std::os::unix::io::RawFd;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use kitsune_backend::{Backend, Error, IoTensor, Result, SharedBuffer};
use kitsune_tensor::TensorDesc;
use tracing::{debug, error, warn};

use crate::memory;

struct Storage {
    ptr: NonNull<u8>,
    fd: RawFd,
    size: usize,
    offset: usize,
    owned: bool,
}

/// A tensor with (optional) shared-memory storage, bound to one backend.
pub struct Tensor {
    backend_id: usize,
    backend: Arc<dyn Backend>,
    desc: TensorDesc,
    storage: Option<Storage>,
}

impl Tensor {
    /// Creates a tensor bound to a backend, without storage.
    ///
    /// The descriptor must describe a static, sized tensor; storage for dynamic
    /// shapes cannot be sized.
    pub fn new(backend_id: usize, desc: TensorDesc) -> Result<Self> {
        if desc.byte_size() == 0 {
            error!("cannot create a tensor without a static byte size");
            return Err(Error::InvalidParameter(
                "tensor descriptor has no static byte size".into(),
            ));
        }
        let backend = kitsune_backend::backend(backend_id)?;
        Ok(Self { backend_id, backend, desc, storage: None })
    }

    /// Creates a tensor and allocates storage of the descriptor's byte size.
    pub fn create(backend_id: usize, desc: TensorDesc) -> Result<Self> {
        let mut tensor = Self::new(backend_id, desc)?;
        tensor.allocate()?;
        Ok(tensor)
    }

    /// Creates a tensor with storage of an explicit size (≥ the byte size).
    pub fn create_with_size(backend_id: usize, desc: TensorDesc, size: usize) -> Result<Self> {
        let mut tensor = Self::new(backend_id, desc)?;
        tensor.allocate_with_size(size)?;
        Ok(tensor)
    }

    /// Creates a tensor over client-supplied shared memory.
    pub fn create_with_fd(
        backend_id: usize,
        desc: TensorDesc,
        fd: RawFd,
        size: usize,
        offset: usize,
    ) -> Result<Self> {
        let mut tensor = Self::new(backend_id, desc)?;
        tensor.attach(fd, size, offset)?;
        Ok(tensor)
    }

    /// Allocates storage of exactly the descriptor's byte size.
    pub fn allocate(&mut self) -> Result<()> {
        self.allocate_with_size(self.desc.byte_size())
    }

    /// Allocates `size` bytes from the backend's shared-memory arena and maps
    /// them into the process.
    pub fn allocate_with_size(&mut self, size: usize) -> Result<()> {
        if self.storage.is_some() {
            return Err(Error::OperationForbidden("tensor already has storage".into()));
        }
        if size < self.desc.byte_size() {
            error!("storage of {size} bytes cannot hold {} bytes", self.desc.byte_size());
            return Err(Error::InvalidParameter(format!(
                "storage of {size} bytes is smaller than the tensor's {}",
                self.desc.byte_size()
            )));
        }

        let fd = self.backend.allocate_buffer(size)?;
        let ptr = match memory::map_owned(fd, size) {
            Ok(ptr) => ptr,
            Err(err) => {
                // The arena entry must not leak when the mapping fails.
                if let Err(release) = self.backend.release_buffer(fd, size) {
                    warn!("release of unmapped buffer failed: {release}");
                }
                unsafe { libc::close(fd) };
                return Err(err);
            }
        };
        self.storage = Some(Storage { ptr, fd, size, offset: 0, owned: true });
        Ok(())
    }

    /// Adopts client-supplied shared memory. The window starting at `offset` must
    /// hold the tensor; the descriptor remains the client's to close.
    pub fn attach(&mut self, fd: RawFd, size: usize, offset: usize) -> Result<()> {
        if self.storage.is_some() {
            return Err(Error::OperationForbidden("tensor already has storage".into()));
        }
        if fd < 0 {
            return Err(Error::InvalidParameter(format!("invalid fd {fd}")));
        }
        if offset > size || size - offset < self.desc.byte_size() {
            error!(
                "window {offset}..{size} cannot hold a {}-byte tensor",
                self.desc.byte_size()
            );
            return Err(Error::InvalidParameter(format!(
                "window {offset}..{size} cannot hold {} bytes",
                self.desc.byte_size()
            )));
        }

        let ptr = memory::map_borrowed(fd, size)?;
        self.storage = Some(Storage { ptr, fd, size, offset, owned: false });
        Ok(())
    }

    /// Returns the backend this tensor is bound to.
    pub fn backend_id(&self) -> usize {
        self.backend_id
    }

    /// Returns the tensor descriptor.
    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    /// Start of the tensor data inside its storage window.
    pub fn data(&self) -> Option<NonNull<u8>> {
        self.storage.as_ref().map(|storage| {
            // Attach validated offset ≤ size, so the addition stays in the mapping.
            unsafe { NonNull::new_unchecked(storage.ptr.as_ptr().add(storage.offset)) }
        })
    }

    /// Total size of the storage, 0 without storage.
    pub fn size(&self) -> usize {
        self.storage.as_ref().map_or(0, |storage| storage.size)
    }

    /// Offset of the tensor window inside the storage.
    pub fn offset(&self) -> usize {
        self.storage.as_ref().map_or(0, |storage| storage.offset)
    }

    /// The storage descriptor, if storage exists.
    pub fn fd(&self) -> Option<RawFd> {
        self.storage.as_ref().map(|storage| storage.fd)
    }

    /// Typed view of the tensor elements.
    pub fn as_slice<T: Copy>(&self) -> Option<&[T]> {
        self.data().map(|ptr| {
            let count = self.desc.byte_size() / std::mem::size_of::<T>();
            unsafe { slice::from_raw_parts(ptr.as_ptr().cast(), count) }
        })
    }

    /// Mutable typed view of the tensor elements.
    pub fn as_mut_slice<T: Copy>(&mut self) -> Option<&mut [T]> {
        self.data().map(|ptr| {
            let count = self.desc.byte_size() / std::mem::size_of::<T>();
            unsafe { slice::from_raw_parts_mut(ptr.as_ptr().cast(), count) }
        })
    }

    /// The transport form handed to backends: the tensor's attributes plus its
    /// shared-memory window.
    pub fn io_tensor(&self) -> Result<IoTensor> {
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("tensor has no storage".into()))?;
        Ok(IoTensor {
            dtype: self.desc.dtype(),
            format: self.desc.format(),
            dims: self.desc.shape().to_vec(),
            buffer: SharedBuffer {
                fd: storage.fd,
                buffer_size: storage.size,
                offset: storage.offset,
                data_size: self.desc.byte_size(),
            },
        })
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        let Some(storage) = self.storage.take() else { return };
        debug!("dropping tensor storage of {} bytes", storage.size);
        if storage.owned {
            if let Err(err) = self.backend.release_buffer(storage.fd, storage.size) {
                warn!("backend buffer release failed: {err}");
            }
        }
        if let Err(err) = memory::unmap(storage.ptr) {
            warn!("shared-memory unmap failed: {err}");
        }
    }
}

// The storage is plain shared memory owned by this handle.
unsafe impl Send for Tensor {}
