//! Quantisation metadata. Parameters arrive from clients as three parallel vectors
//! (bit widths, scales, zero points) and are validated into a list of `QuantParam`
//! records: length 1 for per-layer quantisation, or one entry per channel.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{Error, Result};

/// The only quantisation bit width accepted by the runtime.
pub const SUPPORTED_NUM_BITS: u32 = 8;

/// A single quantisation record.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuantParam {
    pub num_bits: u32,
    pub scale: f64,
    pub zero_point: i32,
}

/// Accumulator for quantisation parameters supplied as parallel vectors.
///
/// The three setters may be called in any order; `build` validates that the vectors
/// agree in length and that every bit width is supported.
#[derive(Clone, Debug, Default)]
pub struct QuantParams {
    num_bits: Vec<u32>,
    scales: Vec<f64>,
    zero_points: Vec<i32>,
}

impl QuantParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_num_bits(&mut self, num_bits: impl Into<Vec<u32>>) {
        self.num_bits = num_bits.into();
    }

    pub fn set_scales(&mut self, scales: impl Into<Vec<f64>>) {
        self.scales = scales.into();
    }

    pub fn set_zero_points(&mut self, zero_points: impl Into<Vec<i32>>) {
        self.zero_points = zero_points.into();
    }

    /// Validates the accumulated vectors and produces the quantisation records.
    ///
    /// # Returns
    /// One `QuantParam` per channel, or a single record for per-layer
    /// quantisation; an error if the vectors disagree in length or a bit width
    /// other than [`SUPPORTED_NUM_BITS`] appears.
    pub fn build(&self) -> Result<Vec<QuantParam>> {
        if self.num_bits.len() != self.scales.len() || self.scales.len() != self.zero_points.len() {
            error!(
                "quant vectors disagree in length: {} numBits, {} scales, {} zeroPoints",
                self.num_bits.len(),
                self.scales.len(),
                self.zero_points.len()
            );
            return Err(Error::QuantLengthMismatch {
                num_bits: self.num_bits.len(),
                scales: self.scales.len(),
                zero_points: self.zero_points.len(),
            });
        }

        for &bits in &self.num_bits {
            if bits != SUPPORTED_NUM_BITS {
                error!("unsupported quantisation bit width {bits}");
                return Err(Error::UnsupportedNumBits(bits));
            }
        }

        Ok(self
            .num_bits
            .iter()
            .zip(self.scales.iter())
            .zip(self.zero_points.iter())
            .map(|((&num_bits, &scale), &zero_point)| QuantParam {
                num_bits,
                scale,
                zero_point,
            })
            .collect())
    }
}
