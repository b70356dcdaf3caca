//! Lightweight descriptor binding a GPU buffer to (dtype, shape, label).

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F16,
    Bf16,
    Q4K,
    Q6K,
    Q8_0,
    U32,
    I32,
}

impl DType {
    /// `{f16,bf16 -> 2; everything else -> 4}`, per §4.7. Quantized dtypes
    /// are block-packed and have no meaningful per-element byte size; call
    /// sites that need block geometry use [`crate::constants::Q4K_BLOCK_BYTES`]
    /// directly instead.
    pub fn dtype_bytes(self) -> u32 {
        match self {
            DType::F16 | DType::Bf16 => 2,
            _ => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16 | DType::Bf16)
    }
}

/// `inferOutputDtype(a,b) = f16` iff both are f16, else f32.
pub fn infer_output_dtype(a: DType, b: DType) -> DType {
    if a == DType::F16 && b == DType::F16 {
        DType::F16
    } else {
        DType::F32
    }
}

fn validate_shape(shape: &[u64]) -> KernelResult<()> {
    if shape.is_empty() {
        return Err(KernelError::InvalidDimensions {
            op: "Tensor::new".to_string(),
            reason: "shape must be non-empty".to_string(),
        });
    }
    if shape.iter().any(|&d| d == 0) {
        return Err(KernelError::InvalidDimensions {
            op: "Tensor::new".to_string(),
            reason: format!("all dimensions must be positive, got {shape:?}"),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Row,
    Column,
}

/// Pure value type: cheap to clone since it only carries a non-owning
/// reference to the buffer and a frozen shape. Does not own the buffer's
/// lifetime — the launcher (or caller) that produced it decides when to
/// release it back to the buffer pool.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub buffer: Arc<wgpu::Buffer>,
    pub dtype: DType,
    shape: Vec<u64>,
    pub label: String,
}

impl Tensor {
    pub fn new(
        buffer: Arc<wgpu::Buffer>,
        dtype: DType,
        shape: impl Into<Vec<u64>>,
        label: impl Into<String>,
    ) -> KernelResult<Self> {
        let shape = shape.into();
        validate_shape(&shape)?;
        Ok(Self {
            buffer,
            dtype,
            shape,
            label: label.into(),
        })
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn numel(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn byte_len(&self) -> u64 {
        self.numel() * self.dtype.dtype_bytes() as u64
    }
}

/// Extends a [`Tensor`] with a row/column layout, produced by the weight
/// loader (an external collaborator per §1 — this crate only consumes the
/// resulting handle).
#[derive(Debug, Clone)]
pub struct WeightBuffer {
    pub tensor: Tensor,
    pub layout: Layout,
}

impl WeightBuffer {
    pub fn new(tensor: Tensor) -> Self {
        Self {
            tensor,
            layout: Layout::Row,
        }
    }

    pub fn with_layout(tensor: Tensor, layout: Layout) -> Self {
        Self { tensor, layout }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_bytes_matches_spec_table() {
        assert_eq!(DType::F16.dtype_bytes(), 2);
        assert_eq!(DType::Bf16.dtype_bytes(), 2);
        assert_eq!(DType::F32.dtype_bytes(), 4);
        assert_eq!(DType::Q4K.dtype_bytes(), 4);
    }

    #[test]
    fn infer_output_dtype_prefers_f16_only_when_both_are_f16() {
        assert_eq!(infer_output_dtype(DType::F16, DType::F16), DType::F16);
        assert_eq!(infer_output_dtype(DType::F16, DType::F32), DType::F32);
        assert_eq!(infer_output_dtype(DType::F32, DType::F32), DType::F32);
    }

    #[test]
    fn empty_shape_is_rejected() {
        assert!(validate_shape(&[]).is_err());
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(validate_shape(&[4, 0, 2]).is_err());
    }

    #[test]
    fn positive_shape_is_accepted() {
        assert!(validate_shape(&[4, 8]).is_ok());
    }
}
