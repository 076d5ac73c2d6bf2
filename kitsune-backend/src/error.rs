//! The closed error taxonomy of the runtime. Every fallible operation across the
//! kitsune crates resolves to one of these kinds; driver-reported raw codes are
//! re-keyed through [`Error::from_raw`], and the leaf crates' precise validation
//! errors are re-keyed by the `From` impls below when they reach the runtime
//! boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("null handle: {0}")]
    NullPointer(String),
    #[error("operation forbidden: {0}")]
    OperationForbidden(String),
    #[error("memory error: {0}")]
    MemoryError(#[source] anyhow::Error),
    #[error("device unavailable: {0}")]
    UnavailableDevice(String),
    #[error("invalid file: {0}")]
    InvalidFile(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("unsupported by this backend: {0}")]
    Unsupported(String),
    #[error("operation failed: {0}")]
    Failed(String),
}

impl Error {
    /// Re-keys a raw driver return code into the taxonomy. Code 0 is success and
    /// must not reach this function; unknown codes collapse to `Failed`.
    pub fn from_raw(code: i32) -> Self {
        match code {
            2 => Self::InvalidParameter(format!("driver returned code {code}")),
            3 => Self::MemoryError(anyhow::anyhow!("driver returned code {code}")),
            4 => Self::OperationForbidden(format!("driver returned code {code}")),
            5 => Self::NullPointer(format!("driver returned code {code}")),
            6 => Self::InvalidFile(format!("driver returned code {code}")),
            7 => Self::UnavailableDevice(format!("driver returned code {code}")),
            8 => Self::InvalidPath(format!("driver returned code {code}")),
            _ => Self::Failed(format!("driver returned code {code}")),
        }
    }
}

impl From<kitsune_tensor::Error> for Error {
    fn from(error: kitsune_tensor::Error) -> Self {
        Self::InvalidParameter(error.to_string())
    }
}

impl From<kitsune_graph::Error> for Error {
    fn from(error: kitsune_graph::Error) -> Self {
        use kitsune_graph::Error as Graph;
        match error {
            Graph::Frozen | Graph::OperationAlreadyBuilt => {
                Self::OperationForbidden(error.to_string())
            }
            other => Self::InvalidParameter(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, self::Error>;
