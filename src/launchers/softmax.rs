//! Softmax launcher (§4.9).

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::selector::softmax::{select_softmax, SoftmaxSelectionInput};
use crate::uniforms::SoftmaxUniform;
use crate::Engine;

pub struct SoftmaxLaunchInput {
    pub input: Tensor,
    pub inner_size: u32,
    pub outer_size: u32,
    pub temperature: f32,
    pub layer_idx: Option<usize>,
}

pub fn record_softmax(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: SoftmaxLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.inner_size == 0 || input.outer_size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "softmax".to_string(),
            reason: format!("inner_size={}, outer_size={} must both be positive", input.inner_size, input.outer_size),
        });
    }

    let override_variant = engine.kernel_path().override_for(Phase::Decode, "softmax", "softmax", input.layer_idx);
    let selection = select_softmax(
        SoftmaxSelectionInput {
            inner_size: input.inner_size,
            input_f16: input.input.dtype == DType::F16,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = input.input.dtype;
    let output_bytes = input.inner_size as u64 * input.outer_size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "softmax-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("softmax", input.outer_size as u64)?;

    let uniform = SoftmaxUniform {
        inner_size: input.inner_size,
        outer_size: input.outer_size,
        temperature: input.temperature,
        _pad: 0,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.input.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "softmax",
            variant: &selection,
            label: "softmax",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(
        Arc::clone(&output_buffer.buffer),
        output_dtype,
        [input.outer_size as u64, input.inner_size as u64],
        "softmax-output",
    )
}

pub fn run_softmax(engine: &Engine, input: SoftmaxLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_softmax(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
