//! Launchers for the elementwise family: SiLU/GeLU activation, embedding
//! gather, residual add, and bias add (§4.9). All four share the selector's
//! `ElementwiseKind` shape and the generic dispatch helper; they differ only
//! in uniform layout and binding count.

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::selector::elementwise::{select_elementwise, ElementwiseKind, ElementwiseSelectionInput};
use crate::uniforms::{GatherUniform, ResidualUniform, SiluGeluUniform};
use crate::Engine;

pub struct ActivationLaunchInput {
    pub operation: &'static str,
    pub input: Tensor,
    pub gate: Option<Tensor>,
    pub size: u32,
    pub layer_idx: Option<usize>,
}

pub fn record_activation(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: ActivationLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: input.operation.to_string(),
            reason: "size must be positive".to_string(),
        });
    }

    let gated = input.gate.is_some();
    let operands_f16 = input.input.dtype == DType::F16 && input.gate.as_ref().map(|g| g.dtype == DType::F16).unwrap_or(true);
    let override_variant =
        engine.kernel_path().override_for(Phase::Decode, input.operation, input.operation, input.layer_idx);
    let selection = select_elementwise(
        ElementwiseSelectionInput {
            operation: input.operation,
            kind: ElementwiseKind::Activation { gated, vec4_eligible: input.size % 4 == 0 && !gated },
            operands_f16,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = input.input.dtype;
    let output_bytes = input.size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "activation-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d(input.operation, input.size as u64)?;
    let uniform = SiluGeluUniform { size: input.size, _pad0: 0, _pad1: 0, _pad2: 0 };

    let mut bindings = vec![KernelBinding { binding: 1, buffer: &input.input.buffer, kind: BindingKind::StorageRead }];
    let out_binding = if let Some(gate) = input.gate.as_ref() {
        bindings.push(KernelBinding { binding: 2, buffer: &gate.buffer, kind: BindingKind::StorageRead });
        3
    } else {
        2
    };
    bindings.push(KernelBinding { binding: out_binding, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite });

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: input.operation,
            variant: &selection,
            label: input.operation,
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&output_buffer.buffer), output_dtype, [input.size as u64], "activation-output")
}

pub fn run_activation(engine: &Engine, input: ActivationLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_activation(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}

pub struct GatherLaunchInput {
    pub table: Tensor,
    pub ids: Tensor,
    pub num_tokens: u32,
    pub hidden_size: u32,
    pub vocab_size: u32,
    pub transpose: bool,
    pub row_width_elements: u32,
    pub layer_idx: Option<usize>,
}

pub fn record_gather(engine: &Engine, recorder: &CommandRecorder, input: GatherLaunchInput) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.num_tokens == 0 || input.hidden_size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "gather".to_string(),
            reason: format!("num_tokens={}, hidden_size={} must both be positive", input.num_tokens, input.hidden_size),
        });
    }

    let override_variant = engine.kernel_path().override_for(Phase::Sampling, "gather", "lm_head", input.layer_idx);
    let selection = select_elementwise(
        ElementwiseSelectionInput {
            operation: "gather",
            kind: ElementwiseKind::Gather {
                rowsplit: input.row_width_elements > crate::constants::SMALL_KERNEL_THRESHOLD,
                vec4_eligible: input.hidden_size % 4 == 0,
            },
            operands_f16: input.table.dtype == DType::F16,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = input.table.dtype;
    let output_bytes = input.num_tokens as u64 * input.hidden_size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "gather-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("gather", input.num_tokens as u64)?;
    let uniform = GatherUniform {
        num_tokens: input.num_tokens,
        hidden_size: input.hidden_size,
        vocab_size: input.vocab_size,
        transpose: input.transpose as u32,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.table.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.ids.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 3, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "gather",
            variant: &selection,
            label: "gather",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(
        Arc::clone(&output_buffer.buffer),
        output_dtype,
        [input.num_tokens as u64, input.hidden_size as u64],
        "gather-output",
    )
}

pub fn run_gather(engine: &Engine, input: GatherLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_gather(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}

/// Shared by `residual` and `bias_add`: both are a plain elementwise binop
/// over two equal-length operands with no base-variant branching.
pub struct BinaryLaunchInput {
    pub operation: &'static str,
    pub a: Tensor,
    pub b: Tensor,
    pub size: u32,
    pub layer_idx: Option<usize>,
}

pub fn record_binary(engine: &Engine, recorder: &CommandRecorder, input: BinaryLaunchInput) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: input.operation.to_string(),
            reason: "size must be positive".to_string(),
        });
    }

    let operands_f16 = input.a.dtype == DType::F16 && input.b.dtype == DType::F16;
    let override_variant =
        engine.kernel_path().override_for(Phase::Decode, input.operation, input.operation, input.layer_idx);
    let selection = select_elementwise(
        ElementwiseSelectionInput {
            operation: input.operation,
            kind: ElementwiseKind::Plain,
            operands_f16,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = input.a.dtype;
    let output_bytes = input.size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "binary-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d(input.operation, input.size as u64)?;
    let uniform = ResidualUniform { size: input.size, _pad0: 0, _pad1: 0, _pad2: 0 };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.a.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.b.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 3, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: input.operation,
            variant: &selection,
            label: input.operation,
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&output_buffer.buffer), output_dtype, [input.size as u64], "binary-output")
}

pub fn run_binary(engine: &Engine, input: BinaryLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_binary(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
