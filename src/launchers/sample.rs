//! Sampling launcher (§4.9): picks one token id per row of logits, either
//! by temperature/top-k sampling or plain argmax.

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::gpu::{DType, Tensor};
use crate::kernel_path::Phase;
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::uniforms::SampleUniform;
use crate::Engine;

pub struct SampleLaunchInput {
    pub logits: Tensor,
    pub vocab_size: u32,
    pub top_k: u32,
    pub temperature: f32,
    pub random_value: f32,
    pub pad_token_id: u32,
    pub logit_softcap: f32,
    pub argmax: bool,
}

pub fn record_sample(engine: &Engine, recorder: &CommandRecorder, input: SampleLaunchInput) -> KernelResult<Tensor> {
    let resources = engine.resources()?;

    if input.vocab_size == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "sample".to_string(),
            reason: "vocab_size must be positive".to_string(),
        });
    }

    let override_variant = engine.kernel_path().override_for(Phase::Sampling, "sample", "sample", None);
    let selection = override_variant.unwrap_or_else(|| {
        if input.argmax { "argmax".to_string() } else { "default".to_string() }
    });
    registry::lookup("sample", &selection)?;

    let chosen_buffer = resources.buffers.acquire(
        4,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "sample-chosen",
    )?;

    let workgroups = launchers::wrap_workgroups_1d("sample", 1)?;
    let uniform = SampleUniform {
        vocab_size: input.vocab_size,
        top_k: input.top_k,
        temperature: input.temperature,
        random_value: input.random_value,
        pad_token_id: input.pad_token_id,
        logit_softcap: input.logit_softcap,
        _pad0: 0,
        _pad1: 0,
    };

    let bindings = [
        KernelBinding { binding: 1, buffer: &input.logits.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &chosen_buffer.buffer, kind: BindingKind::StorageReadWrite },
    ];

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "sample",
            variant: &selection,
            label: "sample",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&chosen_buffer.buffer), DType::U32, [1u64], "sample-chosen")
}

/// Reads the chosen token id back to the host. Gated by the perf guard the
/// same way any other readback is (§4.2); the only reason this crate ever
/// pulls bytes off the GPU.
pub fn run_sample(engine: &Engine, input: SampleLaunchInput) -> KernelResult<u32> {
    let recorder = engine.recorder(false)?;
    let chosen = record_sample(engine, &recorder, input)?;
    recorder.submit_and_wait()?;

    let resources = engine.resources()?;
    engine.guard().allow_readback("sample token readback")?;

    let staging = resources.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("sample-readback-staging"),
        size: 4,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = resources.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("sample-readback-encoder"),
    });
    encoder.copy_buffer_to_buffer(&chosen.buffer, 0, &staging, 0, 4);
    resources.queue.submit(Some(encoder.finish()));

    let (sender, receiver) = crossbeam_channel::bounded(1);
    staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    resources.device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| KernelError::Context {
            context: "sample::run_sample".to_string(),
            message: "map_async callback channel disconnected".to_string(),
        })?
        .map_err(|err| KernelError::Context {
            context: "sample::run_sample".to_string(),
            message: err.to_string(),
        })?;

    let bytes = staging.slice(..).get_mapped_range().to_vec();
    staging.unmap();
    Ok(u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4])))
}
