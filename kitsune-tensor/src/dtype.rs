//! Element types and tensor layouts. The `DataType` set is closed: backends receive
//! these discriminants over the driver boundary and must agree on their meaning.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Element type of a tensor.
///
/// `Unknown` is a valid descriptor state (a freshly created descriptor has no type
/// yet); it sizes to zero and never passes constant-value validation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Unknown,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
}

impl DataType {
    /// Returns the width of a single element in bytes, or 0 for `Unknown`.
    pub fn size(&self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Bool | Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 | Self::Float16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Memory layout of a rank-4 tensor. `None` means the tensor carries no layout
/// information and the backend is free to choose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Format {
    #[default]
    None,
    Nchw,
    Nhwc,
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
