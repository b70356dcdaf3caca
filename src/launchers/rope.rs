//! Rotary position embedding launcher (§4.9). Applies in place to `x`; no
//! selector module exists for RoPE since the registry only lists a plain
//! variant and an f16 variant, chosen directly from the tensor's dtype.

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::uniforms::RopeUniform;
use crate::Engine;

pub struct RopeLaunchInput {
    pub x: Tensor,
    pub seq_len: u32,
    pub num_heads: u32,
    pub head_dim: u32,
    pub start_pos: u32,
    pub rope_theta: f32,
    pub scale: f32,
    pub layer_idx: Option<usize>,
}

pub fn record_rope(engine: &Engine, recorder: &CommandRecorder, input: RopeLaunchInput) -> KernelResult<()> {
    let resources = engine.resources()?;

    if input.seq_len == 0 || input.head_dim == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "rope".to_string(),
            reason: format!("seq_len={}, head_dim={} must both be positive", input.seq_len, input.head_dim),
        });
    }

    let base = if input.x.dtype == DType::F16 { "default_f16" } else { "default" };
    let override_variant = engine.kernel_path().override_for(Phase::Decode, "rope", "rope", input.layer_idx);
    let selection = override_variant.unwrap_or_else(|| base.to_string());
    registry::lookup("rope", &selection)?;

    let workgroups = launchers::wrap_workgroups_1d(
        "rope",
        input.seq_len as u64 * input.num_heads as u64,
    )?;

    let uniform = RopeUniform {
        seq_len: input.seq_len,
        num_heads: input.num_heads,
        head_dim: input.head_dim,
        start_pos: input.start_pos,
        rope_theta: input.rope_theta,
        scale: input.scale,
        _pad0: 0,
        _pad1: 0,
    };

    let bindings = [KernelBinding { binding: 1, buffer: &input.x.buffer, kind: BindingKind::StorageReadWrite }];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "rope",
            variant: &selection,
            label: "rope",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )
}

pub fn run_rope(engine: &Engine, input: RopeLaunchInput) -> KernelResult<()> {
    let recorder = engine.recorder(false)?;
    record_rope(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(())
}
