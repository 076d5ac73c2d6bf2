use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dimension must be -1 or positive, got {0}")]
    InvalidDimension(i32),
    #[error("tensor rank {0} exceeds the limit of {1}")]
    RankTooLarge(usize, usize),
    #[error("tensor byte size exceeds the {0}-byte limit")]
    SizeOverflow(u64),
    #[error("expected {expected} dimensions, got {actual}")]
    RankMismatch { expected: usize, actual: usize },
    #[error("quantisation vectors have mismatched lengths: {num_bits} numBits, {scales} scales, {zero_points} zeroPoints")]
    QuantLengthMismatch {
        num_bits: usize,
        scales: usize,
        zero_points: usize,
    },
    #[error("unsupported quantisation bit width {0}")]
    UnsupportedNumBits(u32),
}

pub type Result<T> = std::result::Result<T, self::Error>;
