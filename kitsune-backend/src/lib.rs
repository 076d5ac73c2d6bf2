//! This crate defines the capability interface between the kitsune runtime and the
//! device drivers that execute models. It is consumed from both sides: driver
//! crates such as `kitsune-backend-cpu` implement the [`Backend`] and
//! [`PreparedModel`] traits, while `kitsune-runtime` resolves backends through the
//! process-wide registry and talks to them exclusively through these traits.
//!
//! The crate also owns the pieces both sides must agree on: the shared-memory
//! transport types (every tensor crosses the driver boundary as an fd/size/offset
//! tuple), the compilation option set, and the closed error taxonomy every runtime
//! operation reports.
//!
//! ## Modules
//!
//! - `backend`: The `Backend` trait: identity queries, capability bits, model
//!   preparation entries and the shared-memory arena.
//! - `prepared`: The `PreparedModel` trait: the opaque compiled artefact with its
//!   run, cache-export and introspection entries.
//! - `buffer`: `SharedBuffer` and `IoTensor`, the transport form of tensors.
//! - `types`: Compilation options and device classification enums.
//! - `registry`: The process-wide backend registry, populated at load time through
//!   `inventory` and read-only afterwards.
//! - `error`: The canonical error taxonomy and the `Result` alias.

mod backend;
mod buffer;
mod error;
mod prepared;
mod registry;
mod types;

pub use backend::Backend;
pub use buffer::{IoTensor, SharedBuffer, INVALID_FD};
pub use error::{Error, Result};
pub use prepared::{DimRanges, PreparedModel, RunDone, RunOutputs};
pub use registry::{all_ids, backend, backend_name, BackendProvider};
pub use types::{DeviceStatus, DeviceType, ModelConfig, PerformanceMode, Priority};
