//! IR tensors. A graph tensor is a descriptor plus quantisation records, a role tag
//! telling operator builders which parameter it encodes, and, for constants, the
//! owned value bytes. Storage-backed tensors are a different type and live in the
//! runtime crate; nothing here touches shared memory.

use kitsune_tensor::{DataType, QuantParam, TensorDesc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Error, Result};

/// Role of a tensor inside the graph.
///
/// `Data` tensors carry activations or weights. Every other role marks the tensor
/// as the named parameter of one operator type; the corresponding builder consumes
/// it while parsing an `add_operation` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorRole {
    #[default]
    Data,
    AddActivation,
    SubActivation,
    MulActivation,
    DivActivation,
    MatmulTransposeA,
    MatmulTransposeB,
    MatmulActivation,
    ScaleAxis,
    ScaleActivation,
}

/// A tensor of the graph IR.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tensor {
    desc: TensorDesc,
    quant: Vec<QuantParam>,
    role: TensorRole,
    data: Option<Vec<u8>>,
    is_param: bool,
}

impl Tensor {
    /// Wraps a validated descriptor into a fresh data tensor.
    pub fn new(desc: TensorDesc) -> Self {
        Self {
            desc,
            quant: Vec::new(),
            role: TensorRole::Data,
            data: None,
            is_param: false,
        }
    }

    /// Returns the tensor descriptor.
    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    /// Returns the tensor role.
    pub fn role(&self) -> TensorRole {
        self.role
    }

    /// Re-tags the tensor with a new role.
    pub fn set_role(&mut self, role: TensorRole) {
        self.role = role;
    }

    /// Returns the quantisation records, empty for an unquantised tensor.
    pub fn quant(&self) -> &[QuantParam] {
        &self.quant
    }

    /// Returns true if the tensor carries quantisation records.
    pub fn is_quantised(&self) -> bool {
        !self.quant.is_empty()
    }

    /// Attaches quantisation records.
    ///
    /// A single record quantises the whole layer. A longer list is per-channel and
    /// its length must match one axis of a static shape.
    pub fn set_quant(&mut self, quant: Vec<QuantParam>) -> Result<()> {
        if quant.len() > 1 && !self.desc.is_dynamic() {
            let len = quant.len();
            if !self.desc.shape().iter().any(|&dim| dim as usize == len) {
                error!("per-channel quant length {len} matches no axis of {:?}", self.desc.shape());
                return Err(Error::QuantChannelMismatch {
                    len,
                    shape: self.desc.shape().to_vec(),
                });
            }
        }
        self.quant = quant;
        Ok(())
    }

    /// Sets the constant value of the tensor, turning it into a candidate operator
    /// parameter or weight.
    ///
    /// Legal only once, only for a static shape, and only when the value length
    /// equals the descriptor's byte size.
    pub fn set_value(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        if self.data.is_some() {
            error!("tensor {index} already has a value");
            return Err(Error::ValueAlreadySet(index));
        }
        if self.desc.is_dynamic() {
            error!("tensor {index} has a dynamic shape, cannot hold a constant");
            return Err(Error::DynamicConstant(index));
        }
        let expected = self.desc.byte_size();
        if expected == 0 || bytes.len() != expected {
            error!(
                "value length {} does not match byte size {expected} of tensor {index}",
                bytes.len()
            );
            return Err(Error::ValueLengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        self.data = Some(bytes.to_vec());
        Ok(())
    }

    /// Returns the constant bytes, if a value was set.
    pub fn value(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Returns true once a value has been set.
    pub fn has_value(&self) -> bool {
        self.data.is_some()
    }

    /// Marks the tensor as consumed by an operator builder. Parameter tensors are
    /// excluded from graph-level inputs and outputs.
    pub fn mark_parameter(&mut self) {
        self.is_param = true;
    }

    /// Returns true if an operator builder consumed this tensor.
    pub fn is_parameter(&self) -> bool {
        self.is_param
    }

    /// Reads the tensor as a single `i8`, the wire form of activation parameters.
    pub fn scalar_i8(&self) -> Result<i8> {
        let bytes = self.typed_value(DataType::Int8, "scalar of type Int8")?;
        Ok(bytes[0] as i8)
    }

    /// Reads the tensor as a single `bool`.
    pub fn scalar_bool(&self) -> Result<bool> {
        let bytes = self.typed_value(DataType::Bool, "scalar of type Bool")?;
        Ok(bytes[0] != 0)
    }

    /// Reads the tensor as a single `i64`.
    pub fn scalar_i64(&self) -> Result<i64> {
        let bytes = self.typed_value(DataType::Int64, "scalar of type Int64")?;
        let array: [u8; 8] = bytes.try_into().expect("Int64 scalar is eight bytes");
        Ok(i64::from_ne_bytes(array))
    }

    fn typed_value(&self, dtype: DataType, expected: &'static str) -> Result<&[u8]> {
        if self.desc.dtype() != dtype || self.desc.element_count() != 1 {
            return Err(Error::ParameterTypeMismatch {
                role: self.role,
                expected,
            });
        }
        match &self.data {
            Some(bytes) => Ok(bytes),
            None => Err(Error::ParameterTypeMismatch {
                role: self.role,
                expected,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn tensor(dtype: DataType, shape: &[i32]) -> Tensor {
        let mut desc = TensorDesc::new();
        desc.set_dtype(dtype);
        desc.set_shape(shape).unwrap();
        Tensor::new(desc)
    }

    #[test]
    fn value_must_match_byte_size() {
        let mut t = tensor(DataType::Float32, &[2]);
        assert!(matches!(
            t.set_value(0, &[0; 4]),
            Err(Error::ValueLengthMismatch { expected: 8, actual: 4 })
        ));
        t.set_value(0, &[0; 8]).unwrap();
        assert!(t.has_value());
    }

    #[test]
    fn value_rejected_for_dynamic_shape() {
        let mut t = tensor(DataType::Float32, &[2, -1]);
        assert!(matches!(t.set_value(3, &[]), Err(Error::DynamicConstant(3))));
    }

    #[test]
    fn value_set_twice_rejected() {
        let mut t = tensor(DataType::Int8, &[]);
        t.set_value(1, &[0]).unwrap();
        assert!(matches!(t.set_value(1, &[1]), Err(Error::ValueAlreadySet(1))));
    }

    #[test]
    fn scalar_readers_check_type_and_shape() {
        let mut t = tensor(DataType::Int8, &[]);
        t.set_value(0, &[2]).unwrap();
        assert_eq!(t.scalar_i8().unwrap(), 2);
        assert!(t.scalar_bool().is_err());

        let mut axis = tensor(DataType::Int64, &[]);
        axis.set_value(0, &1i64.to_ne_bytes()).unwrap();
        assert_eq!(axis.scalar_i64().unwrap(), 1);
    }

    #[test]
    fn per_channel_quant_checked_against_shape() {
        let mut t = tensor(DataType::Int8, &[1, 3, 4]);
        let param = QuantParam { num_bits: 8, scale: 1.0, zero_point: 0 };
        assert!(t.set_quant(vec![param; 3]).is_ok());
        assert!(matches!(
            t.set_quant(vec![param; 5]),
            Err(Error::QuantChannelMismatch { len: 5, .. })
        ));
    }
}
