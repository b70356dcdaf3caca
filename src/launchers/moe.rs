//! Mixture-of-experts routing launchers (§4.9): top-k expert selection and
//! the weighted scatter-add that combines expert outputs back into one
//! hidden-state tensor. Neither op has a selector module — the registry
//! lists exactly one variant for each.

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::uniforms::{ScatterAddUniform, TopKUniform};
use crate::Engine;

pub struct TopKLaunchInput {
    pub logits: Tensor,
    pub num_tokens: u32,
    pub num_experts: u32,
    pub top_k: u32,
    pub normalize: bool,
}

pub struct TopKOutput {
    pub indices: Tensor,
    pub weights: Tensor,
}

pub fn record_topk(engine: &Engine, recorder: &CommandRecorder, input: TopKLaunchInput) -> KernelResult<TopKOutput> {
    let resources = engine.resources()?;

    if input.num_tokens == 0 || input.num_experts == 0 || input.top_k == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "topk".to_string(),
            reason: format!(
                "num_tokens={}, num_experts={}, top_k={} must all be positive",
                input.num_tokens, input.num_experts, input.top_k
            ),
        });
    }
    if input.top_k > input.num_experts {
        return Err(KernelError::InvalidDimensions {
            op: "topk".to_string(),
            reason: format!("top_k={} cannot exceed num_experts={}", input.top_k, input.num_experts),
        });
    }

    registry::lookup("topk", "default")?;

    let indices_buffer = resources.buffers.acquire(
        input.num_tokens as u64 * input.top_k as u64 * 4,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "topk-indices",
    )?;
    let weights_buffer = resources.buffers.acquire(
        input.num_tokens as u64 * input.top_k as u64 * 4,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "topk-weights",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("topk", input.num_tokens as u64)?;
    let uniform = TopKUniform {
        num_tokens: input.num_tokens,
        num_experts: input.num_experts,
        top_k: input.top_k,
        normalize: input.normalize as u32,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.logits.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &indices_buffer.buffer, kind: BindingKind::StorageReadWrite },
        KernelBinding { binding: 3, buffer: &weights_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "topk",
            variant: "default",
            label: "topk",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Ok(TopKOutput {
        indices: Tensor::new(
            Arc::clone(&indices_buffer.buffer),
            DType::U32,
            [input.num_tokens as u64, input.top_k as u64],
            "topk-indices",
        )?,
        weights: Tensor::new(
            Arc::clone(&weights_buffer.buffer),
            DType::F32,
            [input.num_tokens as u64, input.top_k as u64],
            "topk-weights",
        )?,
    })
}

pub fn run_topk(engine: &Engine, input: TopKLaunchInput) -> KernelResult<TopKOutput> {
    let recorder = engine.recorder(false)?;
    let output = record_topk(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}

pub struct ScatterAddLaunchInput {
    pub expert_out: Tensor,
    pub weights: Tensor,
    pub num_tokens: u32,
    pub hidden_size: u32,
    pub top_k: u32,
    pub num_experts: u32,
}

pub fn record_scatter_add(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: ScatterAddLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;

    if input.num_tokens == 0 || input.hidden_size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "scatter_add".to_string(),
            reason: format!("num_tokens={}, hidden_size={} must both be positive", input.num_tokens, input.hidden_size),
        });
    }

    registry::lookup("scatter_add", "default")?;

    let output_dtype = input.expert_out.dtype;
    let output_bytes = input.num_tokens as u64 * input.hidden_size as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "scatter-add-output",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("scatter_add", input.num_tokens as u64)?;
    let uniform = ScatterAddUniform {
        num_tokens: input.num_tokens,
        hidden_size: input.hidden_size,
        top_k: input.top_k,
        num_experts: input.num_experts,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.expert_out.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.weights.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 3, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "scatter_add",
            variant: "default",
            label: "scatter_add",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(
        Arc::clone(&output_buffer.buffer),
        output_dtype,
        [input.num_tokens as u64, input.hidden_size as u64],
        "scatter-add-output",
    )
}

pub fn run_scatter_add(engine: &Engine, input: ScatterAddLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_scatter_add(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
