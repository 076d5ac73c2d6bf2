//! Graph intermediate representation for the kitsune neural-network runtime. This
//! crate owns the model-building half of the runtime: clients accumulate tensors and
//! operators into a [`Model`], the model validates every addition, and `build()`
//! freezes the result into an immutable [`Graph`] that compilers hand to a backend.
//!
//! The IR is deliberately flat: a graph is a sequence of tensors and a sequence of
//! operator nodes, each node referring to tensors by index. Operators never point at
//! each other and tensors never point back at operators, so the structure is
//! cycle-free by construction and serializes directly with `serde`.
//!
//! ## Modules
//!
//! - `model`: The `Model` state machine (*Open* → *Frozen*) and the frozen `Graph`.
//! - `tensor`: IR tensors: a descriptor plus quantisation records, a role tag and
//!   optional constant bytes.
//! - `node`: Operator nodes referencing their tensors by index.
//! - `primitive`: The backend-agnostic operator parameter blobs, one sum-type
//!   variant per operator, plus the fused-activation set.
//! - `registry`: The process-wide operator registry mapping operator types to
//!   builder factories and declared arities.
//! - `ops`: The operator builders themselves, one per registered operator type.
//! - `extension`: The key→bytes extension configuration that travels with adopted
//!   graphs into compilation.
//! - `error`: Error handling types used throughout the crate.

mod error;
mod extension;
mod model;
mod node;
mod ops;
mod primitive;
mod registry;
mod tensor;

pub use error::{Error, Result};
pub use extension::ExtensionConfig;
pub use model::{Graph, Model};
pub use node::Node;
pub use primitive::{Activation, Primitive};
pub use registry::{Arity, OperatorBuilder, OperatorType};
pub use tensor::{Tensor, TensorRole};
