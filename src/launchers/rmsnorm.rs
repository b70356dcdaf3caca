//! RMSNorm launcher (§4.9).

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::selector::rmsnorm::{select_rmsnorm, RmsNormSelectionInput};
use crate::uniforms::RmsNormUniform;
use crate::Engine;

pub struct RmsNormLaunchInput {
    pub input: Tensor,
    pub weight: Tensor,
    pub residual: Option<Tensor>,
    pub hidden_size: u32,
    pub batch_size: u32,
    pub eps: f32,
    pub role: &'static str,
    pub layer_idx: Option<usize>,
}

pub fn record_rmsnorm(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: RmsNormLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.hidden_size == 0 || input.batch_size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "rmsnorm".to_string(),
            reason: format!("hidden_size={}, batch_size={} must both be positive", input.hidden_size, input.batch_size),
        });
    }

    let has_residual = input.residual.is_some();
    let override_variant =
        engine.kernel_path().override_for(Phase::Decode, "rmsnorm", input.role, input.layer_idx);
    let selection = select_rmsnorm(
        RmsNormSelectionInput {
            hidden_size: input.hidden_size,
            has_residual,
            input_f16: input.input.dtype == DType::F16,
            residual_f16: input.residual.as_ref().map(|r| r.dtype == DType::F16),
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = input.input.dtype;
    let output_bytes = input.batch_size as u64 * input.hidden_size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "rmsnorm-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("rmsnorm", input.batch_size as u64)?;

    let uniform = RmsNormUniform {
        hidden_size: input.hidden_size,
        batch_size: input.batch_size,
        eps: input.eps,
        has_residual: has_residual as u32,
    };

    let residual_buffer = input.residual.as_ref().map(|r| &r.buffer);
    let mut bindings = vec![
        KernelBinding { binding: 1, buffer: &input.input.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.weight.buffer, kind: BindingKind::StorageRead },
    ];
    if let Some(residual) = residual_buffer {
        bindings.push(KernelBinding { binding: 3, buffer: residual, kind: BindingKind::StorageRead });
    }
    let out_binding = if has_residual { 4 } else { 3 };
    bindings.push(KernelBinding { binding: out_binding, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite });

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "rmsnorm",
            variant: &selection,
            label: "rmsnorm",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(
        Arc::clone(&output_buffer.buffer),
        output_dtype,
        [input.batch_size as u64, input.hidden_size as u64],
        "rmsnorm-output",
    )
}

pub fn run_rmsnorm(engine: &Engine, input: RmsNormLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_rmsnorm(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
