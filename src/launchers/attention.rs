//! Attention launcher (§4.9): decode and prefill share one shader body and
//! differ only in dispatch geometry, selected per §4.8's tier ladder.

use std::sync::Arc;

use crate::constants::ATTENTION_TILE_SEQ;
use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::selector::attention::{select_attention, AttentionSelectionInput};
use crate::uniforms::AttentionUniform;
use crate::Engine;

pub struct AttentionLaunchInput {
    pub q: Tensor,
    pub k: Tensor,
    pub v: Tensor,
    pub num_heads: u32,
    pub num_kv_heads: u32,
    pub head_dim: u32,
    pub kv_len: u32,
    pub seq_len: u32,
    pub scale: f32,
    pub causal: bool,
    pub start_pos: u32,
    pub attn_softcap: f32,
    pub sliding_window: u32,
    pub is_decode: bool,
    pub shared_memory_bytes: u32,
    pub layer_idx: Option<usize>,
}

pub fn record_attention(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: AttentionLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.head_dim == 0 || input.seq_len == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "attention".to_string(),
            reason: format!("head_dim={}, seq_len={} must both be positive", input.head_dim, input.seq_len),
        });
    }

    let use_f16_kv = input.k.dtype == DType::F16 && input.v.dtype == DType::F16;
    let override_variant = engine
        .kernel_path()
        .override_for(Phase::Decode, "attention", "attention", input.layer_idx);
    let selection = select_attention(
        AttentionSelectionInput {
            is_decode: input.is_decode,
            use_f16_kv,
            head_dim: input.head_dim,
            kv_len: input.kv_len,
            shared_memory_bytes: input.shared_memory_bytes,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let output_dtype = if use_f16_kv { DType::F16 } else { DType::F32 };
    let output_bytes =
        input.seq_len as u64 * input.num_heads as u64 * input.head_dim as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "attention-output",
    )?;

    let tile = if selection == "tiled_large" { ATTENTION_TILE_SEQ } else { 1 };
    let workgroups = launchers::wrap_workgroups_1d(
        "attention",
        launchers::ceil_div(input.seq_len, tile) as u64 * input.num_heads as u64,
    )?;

    let uniform = AttentionUniform {
        num_heads: input.num_heads,
        num_kv_heads: input.num_kv_heads,
        head_dim: input.head_dim,
        kv_len: input.kv_len,
        seq_len: input.seq_len,
        scale: input.scale,
        causal: input.causal as u32,
        start_pos: input.start_pos,
        attn_softcap: input.attn_softcap,
        sliding_window: input.sliding_window,
        kv_len_source: input.kv_len,
        _pad0: 0,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.q.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.k.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 3, buffer: &input.v.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 4, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "attention",
            variant: &selection,
            label: "attention",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(
        Arc::clone(&output_buffer.buffer),
        output_dtype,
        [input.seq_len as u64, input.num_heads as u64 * input.head_dim as u64],
        "attention-output",
    )
}

pub fn run_attention(engine: &Engine, input: AttentionLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_attention(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}
