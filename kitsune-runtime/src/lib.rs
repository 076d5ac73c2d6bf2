//! The kitsune neural-network runtime. This crate is the user-facing layer that sits
//! between client applications and the registered device backends: clients build a
//! graph IR with [`Model`], compile it into a [`Compilation`] (possibly through the
//! persistent on-disk cache) and execute it with an [`Executor`] over zero-copy
//! shared-memory [`Tensor`]s.
//!
//! # Overview
//!
//! ```text
//! Model (kitsune-graph)  ──►  Compilation  ──►  Executor
//!          │                       │                │
//!          └──────── backend registry (kitsune-backend) ────────┘
//! ```
//!
//! The runtime never computes anything itself. Backends are resolved through the
//! process-wide registry and driven exclusively through the `kitsune-backend`
//! traits; every tensor that crosses the driver boundary travels as an
//! fd/size/offset shared-memory window. An optional scheduler service, when
//! installed, gates oversized models, advises on admission and receives latency
//! telemetry.
//!
//! ## Modules
//!
//! - `memory`: The process-wide shared-memory registry mapping user pointers back
//!   to their file descriptors, plus read-only file mappings for cache restore.
//! - `tensor`: Storage-backed tensors over backend-allocated or client-supplied
//!   shared memory.
//! - `compilation`: The compilation pipeline: source selection, capability gates,
//!   fingerprinting, the RAM-limit gate, backend preparation and cache persistence.
//! - `cache`: The on-disk cache layout and the buffer cache framing.
//! - `fingerprint`: SHA-256 model fingerprints and scheduler model ids.
//! - `executor`: Input/output binding, synchronous and asynchronous runs, latency
//!   feedback and the service-died latch.
//! - `scheduler`: The optional scheduler service client slot.
//! - `device`: Device enumeration and per-device capability queries.

pub mod cache;
pub mod device;
pub mod executor;
pub mod fingerprint;
pub mod memory;
pub mod scheduler;

mod compilation;
mod tensor;

pub use compilation::Compilation;
pub use executor::{Executor, OnRunDone, OnServiceDied, RunDoneEvent};
pub use kitsune_backend::{
    DeviceStatus, DeviceType, Error, PerformanceMode, Priority, Result,
};
pub use kitsune_backend_cpu::CPU_BACKEND_ID;
pub use kitsune_graph::{ExtensionConfig, Model, OperatorType, TensorRole};
pub use kitsune_tensor::{DataType, Format, QuantParam, QuantParams, TensorDesc};
pub use scheduler::SchedulerService;
pub use tensor::Tensor;
