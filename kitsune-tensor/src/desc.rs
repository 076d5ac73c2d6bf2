//! Module for the `TensorDesc` descriptor. A descriptor carries everything the
//! runtime needs to know about a tensor except its storage: an optional name, the
//! element type, the shape (where `-1` marks a dynamic axis) and the layout.
//!
//! Shape validation happens on `set_shape` so that every descriptor in circulation
//! is well-formed: dimensions are `-1` or positive, the rank is bounded, and the
//! static byte size fits the transport's 32-bit length fields.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::dtype::{DataType, Format};
use crate::{Error, Result};

/// Upper bound on tensor rank accepted by the runtime.
pub const MAX_RANK: usize = 200;

/// Largest static tensor byte size representable on the driver transport.
const MAX_TENSOR_BYTES: u64 = u32::MAX as u64;

/// Descriptor of a tensor: name, element type, shape and layout.
///
/// A descriptor is mutable through its setters until it is handed to the graph
/// builder or a storage-backed tensor; those layers clone it and treat the copy as
/// immutable apart from the dedicated reshape path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorDesc {
    name: Option<String>,
    dtype: DataType,
    shape: Vec<i32>,
    format: Format,
}

impl TensorDesc {
    /// Creates an empty descriptor: unknown element type, no shape, no layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tensor name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Returns the tensor name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Sets the element type.
    pub fn set_dtype(&mut self, dtype: DataType) {
        self.dtype = dtype;
    }

    /// Returns the element type.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Sets the layout.
    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Returns the layout.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Sets the shape after validating it.
    ///
    /// A dimension of `-1` marks a dynamic axis; `0` and values below `-1` are
    /// rejected. The rank must not exceed [`MAX_RANK`] and the static byte size of
    /// the tensor must fit in 32 bits.
    ///
    /// # Returns
    /// A result indicating success or the validation failure.
    pub fn set_shape(&mut self, shape: impl Into<Vec<i32>>) -> Result<()> {
        let shape = shape.into();
        if shape.len() > MAX_RANK {
            error!("shape rank {} exceeds limit {}", shape.len(), MAX_RANK);
            return Err(Error::RankTooLarge(shape.len(), MAX_RANK));
        }
        let mut bytes = self.dtype.size().max(1) as u64;
        for &dim in &shape {
            if dim < -1 || dim == 0 {
                error!("invalid dimension {dim} in shape {shape:?}");
                return Err(Error::InvalidDimension(dim));
            }
            bytes = bytes.saturating_mul(dim.unsigned_abs() as u64);
            if bytes > MAX_TENSOR_BYTES {
                error!("shape {shape:?} exceeds the tensor byte-size limit");
                return Err(Error::SizeOverflow(MAX_TENSOR_BYTES));
            }
        }
        self.shape = shape;
        Ok(())
    }

    /// Replaces the shape of an already-shaped descriptor, keeping the rank.
    ///
    /// This is the reshape path used by executors when a run reports concrete
    /// output dimensions for a dynamic axis.
    pub fn reshape(&mut self, shape: impl Into<Vec<i32>>) -> Result<()> {
        let shape = shape.into();
        if shape.len() != self.shape.len() {
            return Err(Error::RankMismatch {
                expected: self.shape.len(),
                actual: shape.len(),
            });
        }
        self.set_shape(shape)
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[i32] {
        &self.shape
    }

    /// Returns true if any axis is dynamic.
    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(|&dim| dim == -1)
    }

    /// Returns true for a rank-0 tensor.
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Returns the number of elements, or 0 if any axis is dynamic.
    pub fn element_count(&self) -> usize {
        if self.is_dynamic() {
            return 0;
        }
        self.shape.iter().map(|&dim| dim as usize).product()
    }

    /// Returns the static byte size: `element_count() * dtype.size()`.
    ///
    /// Dynamic tensors report 0, matching `element_count`.
    pub fn byte_size(&self) -> usize {
        self.element_count() * self.dtype.size()
    }

    /// Checks whether a concrete tensor described by `other` can bind to a slot
    /// described by `self`.
    ///
    /// Element type, layout and rank must match exactly; every fixed axis must
    /// match, while a dynamic axis on `self` accepts any extent.
    pub fn compatible_with(&self, other: &TensorDesc) -> bool {
        if self.dtype != other.dtype || self.format != other.format {
            return false;
        }
        if self.shape.len() != other.shape.len() {
            return false;
        }
        self.shape
            .iter()
            .zip(other.shape.iter())
            .all(|(&expected, &actual)| expected == -1 || expected == actual)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn desc(dtype: DataType, shape: &[i32]) -> TensorDesc {
        let mut desc = TensorDesc::new();
        desc.set_dtype(dtype);
        desc.set_shape(shape).unwrap();
        desc
    }

    #[test]
    fn byte_size_of_static_shape() {
        let desc = desc(DataType::Float32, &[1, 2, 2, 3]);
        assert_eq!(desc.element_count(), 12);
        assert_eq!(desc.byte_size(), 48);
        assert!(!desc.is_dynamic());
    }

    #[test]
    fn dynamic_axis_zeroes_counts() {
        let desc = desc(DataType::Float32, &[2, -1]);
        assert!(desc.is_dynamic());
        assert_eq!(desc.element_count(), 0);
        assert_eq!(desc.byte_size(), 0);
    }

    #[test]
    fn zero_dimension_rejected() {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Int32);
        assert!(matches!(
            desc.set_shape([2, 0]),
            Err(Error::InvalidDimension(0))
        ));
        assert!(matches!(
            desc.set_shape([-2]),
            Err(Error::InvalidDimension(-2))
        ));
    }

    #[test]
    fn rank_limit_enforced() {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Int8);
        let shape = vec![1; MAX_RANK + 1];
        assert!(matches!(desc.set_shape(shape), Err(Error::RankTooLarge(..))));
    }

    #[test]
    fn byte_size_limit_enforced() {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Float64);
        assert!(matches!(
            desc.set_shape([i32::MAX, i32::MAX]),
            Err(Error::SizeOverflow(..))
        ));
    }

    #[test]
    fn reshape_keeps_rank() {
        let mut desc = desc(DataType::Float32, &[1, -1, 4]);
        desc.reshape([1, 8, 4]).unwrap();
        assert_eq!(desc.shape(), &[1, 8, 4]);
        assert!(matches!(
            desc.reshape([1, 8]),
            Err(Error::RankMismatch { .. })
        ));
    }

    #[test]
    fn compatibility_respects_dynamic_axes() {
        let template = desc(DataType::Float32, &[2, -1]);
        assert!(template.compatible_with(&desc(DataType::Float32, &[2, 7])));
        assert!(!template.compatible_with(&desc(DataType::Float32, &[3, 7])));
        assert!(!template.compatible_with(&desc(DataType::Int32, &[2, 7])));
    }

    #[test]
    fn scalar_has_one_element() {
        let mut desc = TensorDesc::new();
        desc.set_dtype(DataType::Int8);
        desc.set_shape([]).unwrap();
        assert!(desc.is_scalar());
        assert_eq!(desc.element_count(), 1);
        assert_eq!(desc.byte_size(), 1);
    }
}
