//! Float32 interpreter kernels. All kernels take and return raw little-endian byte
//! buffers; the plan guarantees the element types before a kernel is reached.

use kitsune_backend::{Error, Result};
use kitsune_graph::Activation;
use kitsune_tensor::DataType;

fn activate(value: f32, activation: Activation) -> f32 {
    match activation {
        Activation::None => value,
        Activation::Relu => value.max(0.0),
        Activation::Relu6 => value.clamp(0.0, 6.0),
    }
}

pub fn read_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("four-byte chunk")))
        .collect()
}

pub fn write_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Elementwise binary kernel over same-shaped operands.
pub fn elementwise(
    a: &[u8],
    b: &[u8],
    op: impl Fn(f32, f32) -> f32,
    activation: Activation,
) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(Error::InvalidParameter(format!(
            "elementwise operands differ in size: {} vs {} bytes",
            a.len(),
            b.len()
        )));
    }
    let a = read_f32(a);
    let b = read_f32(b);
    let out: Vec<f32> = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| activate(op(x, y), activation))
        .collect();
    Ok(write_f32(&out))
}

/// 2-D matrix multiplication with optional operand transposes.
pub fn matmul(
    a: &[u8],
    b: &[u8],
    a_dims: &[i32],
    b_dims: &[i32],
    transpose_a: bool,
    transpose_b: bool,
    activation: Activation,
) -> Result<Vec<u8>> {
    if a_dims.len() != 2 || b_dims.len() != 2 {
        return Err(Error::InvalidParameter(format!(
            "matmul expects rank-2 operands, got ranks {} and {}",
            a_dims.len(),
            b_dims.len()
        )));
    }
    let (m, k) = if transpose_a {
        (a_dims[1] as usize, a_dims[0] as usize)
    } else {
        (a_dims[0] as usize, a_dims[1] as usize)
    };
    let (k2, n) = if transpose_b {
        (b_dims[1] as usize, b_dims[0] as usize)
    } else {
        (b_dims[0] as usize, b_dims[1] as usize)
    };
    if k != k2 {
        return Err(Error::InvalidParameter(format!(
            "matmul inner dimensions disagree: {k} vs {k2}"
        )));
    }

    let a = read_f32(a);
    let b = read_f32(b);
    let a_at = |row: usize, col: usize| {
        if transpose_a {
            a[col * m + row]
        } else {
            a[row * k + col]
        }
    };
    let b_at = |row: usize, col: usize| {
        if transpose_b {
            b[col * k + row]
        } else {
            b[row * n + col]
        }
    };

    let mut out = vec![0.0f32; m * n];
    for row in 0..m {
        for col in 0..n {
            let mut acc = 0.0;
            for inner in 0..k {
                acc += a_at(row, inner) * b_at(inner, col);
            }
            out[row * n + col] = activate(acc, activation);
        }
    }
    Ok(write_f32(&out))
}

/// Per-axis affine kernel: `out = in * scale + bias` along `axis`.
pub fn scale(
    input: &[u8],
    scale: &[u8],
    bias: &[u8],
    dims: &[i32],
    axis: i64,
    activation: Activation,
) -> Result<Vec<u8>> {
    let rank = dims.len();
    let axis = if axis < 0 { axis + rank as i64 } else { axis };
    if axis < 0 || axis as usize >= rank {
        return Err(Error::InvalidParameter(format!(
            "scale axis {axis} out of range for rank {rank}"
        )));
    }
    let axis = axis as usize;
    let extent = dims[axis] as usize;

    let scale = read_f32(scale);
    let bias = read_f32(bias);
    if scale.len() != extent || bias.len() != extent {
        return Err(Error::InvalidParameter(format!(
            "scale/bias length must equal axis extent {extent}, got {} and {}",
            scale.len(),
            bias.len()
        )));
    }

    let inner: usize = dims[axis + 1..].iter().map(|&dim| dim as usize).product();
    let input = read_f32(input);
    let out: Vec<f32> = input
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            let channel = (index / inner) % extent;
            activate(value * scale[channel] + bias[channel], activation)
        })
        .collect();
    Ok(write_f32(&out))
}

fn read_element(bytes: &[u8], dtype: DataType, index: usize) -> f64 {
    let width = dtype.size();
    let at = &bytes[index * width..(index + 1) * width];
    match dtype {
        DataType::Bool => (at[0] != 0) as u8 as f64,
        DataType::Int8 => at[0] as i8 as f64,
        DataType::Uint8 => at[0] as f64,
        DataType::Int16 => i16::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Uint16 => u16::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Int32 => i32::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Uint32 => u32::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Int64 => i64::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Uint64 => u64::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Float32 => f32::from_le_bytes(at.try_into().unwrap()) as f64,
        DataType::Float64 => f64::from_le_bytes(at.try_into().unwrap()),
        DataType::Float16 | DataType::Unknown => 0.0,
    }
}

fn write_element(out: &mut Vec<u8>, dtype: DataType, value: f64) {
    match dtype {
        DataType::Bool => out.push((value != 0.0) as u8),
        DataType::Int8 => out.push((value as i8) as u8),
        DataType::Uint8 => out.push(value as u8),
        DataType::Int16 => out.extend((value as i16).to_le_bytes()),
        DataType::Uint16 => out.extend((value as u16).to_le_bytes()),
        DataType::Int32 => out.extend((value as i32).to_le_bytes()),
        DataType::Uint32 => out.extend((value as u32).to_le_bytes()),
        DataType::Int64 => out.extend((value as i64).to_le_bytes()),
        DataType::Uint64 => out.extend((value as u64).to_le_bytes()),
        DataType::Float32 => out.extend((value as f32).to_le_bytes()),
        DataType::Float64 => out.extend(value.to_le_bytes()),
        DataType::Float16 | DataType::Unknown => {}
    }
}

/// Element type conversion through a float64 intermediate.
pub fn cast(input: &[u8], from: DataType, to: DataType) -> Result<Vec<u8>> {
    if from.size() == 0 || to.size() == 0 {
        return Err(Error::Unsupported(format!("cast from {from} to {to}")));
    }
    let count = input.len() / from.size();
    let mut out = Vec::with_capacity(count * to.size());
    for index in 0..count {
        write_element(&mut out, to, read_element(input, from, index));
    }
    Ok(out)
}
