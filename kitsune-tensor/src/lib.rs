//! Tensor descriptors for the kitsune neural-network runtime. This crate holds the
//! leaf-level data model shared by every other kitsune crate: element types, tensor
//! layouts, shape/size arithmetic with its validation rules, and quantisation
//! metadata. It performs no computation and owns no storage; storage-backed tensors
//! live in `kitsune-runtime`, IR tensors in `kitsune-graph`.
//!
//! ## Modules
//!
//! - `dtype`: The `DataType` and `Format` enumerations together with element sizing.
//! - `desc`: The `TensorDesc` descriptor (name, element type, shape and layout)
//!   with the shape validation rules every entry point relies on.
//! - `quant`: Quantisation parameters, accumulated as parallel vectors and validated
//!   into per-layer or per-channel `QuantParam` records.
//! - `error`: Error handling types used throughout the crate, including the `Error`
//!   type and the `Result` alias.

mod desc;
mod dtype;
mod error;
mod quant;

pub use desc::{TensorDesc, MAX_RANK};
pub use dtype::{DataType, Format};
pub use error::{Error, Result};
pub use quant::{QuantParam, QuantParams, SUPPORTED_NUM_BITS};
