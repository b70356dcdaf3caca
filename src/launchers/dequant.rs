//! Dequantization launcher (§4.9). Unpacks a Q4_K-packed weight into a
//! dense F32 or F16 buffer ahead of a plain matmul.

use std::sync::Arc;

use crate::constants::Q4K_BLOCK_ELEMENTS;
use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::selector::dequant::{select_dequant, DequantSelectionInput};
use crate::uniforms::SiluGeluUniform;
use crate::Engine;

pub struct DequantLaunchInput {
    pub packed: Tensor,
    pub num_elements: u32,
    pub vec4_requested: bool,
    pub want_f16_output: bool,
    pub role: &'static str,
    pub layer_idx: Option<usize>,
}

pub fn record_dequant(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: DequantLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.num_elements == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "dequant".to_string(),
            reason: "num_elements must be positive".to_string(),
        });
    }

    let override_variant =
        engine.kernel_path().override_for(Phase::Decode, "dequant", input.role, input.layer_idx);
    let selection = select_dequant(
        DequantSelectionInput {
            vec4_requested: input.vec4_requested,
            want_f16_output: input.want_f16_output,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = if input.want_f16_output && capability.has_feature("f16") { DType::F16 } else { DType::F32 };
    let output_bytes = input.num_elements as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "dequant-output",
    )?;

    let blocks = launchers::ceil_div(input.num_elements, Q4K_BLOCK_ELEMENTS);
    let workgroups = launchers::wrap_workgroups_1d("dequant", blocks as u64)?;
    let uniform = SiluGeluUniform { size: input.num_elements, _pad0: 0, _pad1: 0, _pad2: 0 };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.packed.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "dequant",
            variant: &selection,
            label: "dequant",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&output_buffer.buffer), output_dtype, [input.num_elements as u64], "dequant-output")
}

pub fn run_dequant(engine: &Engine, input: DequantLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_dequant(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
