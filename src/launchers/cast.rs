//! Dtype-cast launcher (§4.9). One variant per source/destination dtype
//! pair; picked directly from the tensor's declared dtype since casting
//! has no capability-dependent heuristic, only a fixed variant table.

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::uniforms::CastUniform;
use crate::Engine;

pub struct CastLaunchInput {
    pub input: Tensor,
    pub target_dtype: DType,
    pub num_elements: u32,
}

/// Variant name plus the shader's `mode` selector (0 = bf16->f32, 1 =
/// bf16->f16, 2 = f32->f16, 3 = f16->f32).
fn variant_for(from: DType, to: DType) -> KernelResult<(&'static str, u32)> {
    match (from, to) {
        (DType::Bf16, DType::F32) => Ok(("bf16_to_f32", 0)),
        (DType::Bf16, DType::F16) => Ok(("bf16_to_f16", 1)),
        (DType::F32, DType::F16) => Ok(("f32_to_f16", 2)),
        (DType::F16, DType::F32) => Ok(("f16_to_f32", 3)),
        _ => Err(KernelError::UnknownVariant {
            operation: "cast".to_string(),
            variant: format!("{from:?}_to_{to:?}"),
        }),
    }
}

pub fn record_cast(engine: &Engine, recorder: &CommandRecorder, input: CastLaunchInput) -> KernelResult<Tensor> {
    let resources = engine.resources()?;

    if input.num_elements == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "cast".to_string(),
            reason: "num_elements must be positive".to_string(),
        });
    }

    let (selection, mode) = variant_for(input.input.dtype, input.target_dtype)?;
    registry::lookup("cast", selection)?;

    let output_bytes = input.num_elements as u64 * input.target_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "cast-output",
    )?;

    // Packed f16 output holds two elements per u32 word, so the shader
    // dispatches one thread per output word, not per element.
    let dispatch_count = if input.target_dtype == DType::F16 {
        launchers::ceil_div(input.num_elements, 2)
    } else {
        input.num_elements
    };
    let workgroups = launchers::wrap_workgroups_1d("cast", dispatch_count as u64)?;
    let uniform = CastUniform { num_elements: input.num_elements, mode, _pad1: 0, _pad2: 0 };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.input.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "cast",
            variant: selection,
            label: "cast",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&output_buffer.buffer), input.target_dtype, [input.num_elements as u64], "cast-output")
}

pub fn run_cast(engine: &Engine, input: CastLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_cast(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_to_f16_resolves_to_named_variant_and_mode() {
        assert_eq!(variant_for(DType::F32, DType::F16).unwrap(), ("f32_to_f16", 2));
    }

    #[test]
    fn every_pair_gets_a_distinct_mode() {
        let modes: Vec<u32> = [
            (DType::Bf16, DType::F32),
            (DType::Bf16, DType::F16),
            (DType::F32, DType::F16),
            (DType::F16, DType::F32),
        ]
        .iter()
        .map(|&(from, to)| variant_for(from, to).unwrap().1)
        .collect();
        assert_eq!(modes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn unsupported_pair_is_rejected() {
        assert!(variant_for(DType::Q4K, DType::F32).is_err());
    }
}
