//! Reference CPU backend for the kitsune runtime. This crate implements the
//! `kitsune-backend` capability interface entirely in-process: shared-memory
//! buffers come from `memfd`, model preparation lowers the graph IR into a flat
//! execution plan, and runs interpret that plan over mapped buffers in float32.
//!
//! The backend exists to exercise the runtime end to end (it is the device every
//! test compiles against) and doubles as the template a real driver crate would
//! follow: the only contact surface with the rest of the system is the pair of
//! traits from `kitsune-backend` and the provider registration in `backend`.
//!
//! ## Modules
//!
//! - `backend`: The `CpuBackend` type, its capability answers and its provider
//!   registration under device id 0.
//! - `plan`: Lowering a frozen `Graph` into the serializable execution `Plan`.
//! - `prepared`: The prepared-model implementation: synchronous runs, the
//!   ordered async worker, cache export.
//! - `kernels`: The float32 interpreter kernels.
//! - `alloc`: The `memfd` shared-memory arena.
//! - `shm`: Mapping shared buffers into the process.

mod alloc;
mod backend;
mod kernels;
mod plan;
mod prepared;
mod shm;

pub use backend::{CpuBackend, CPU_BACKEND_ID};
