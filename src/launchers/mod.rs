//! Per-operation kernel launchers (C9): the only place that computes
//! dispatch geometry, builds a bind group in the exact layout its shader
//! expects, and calls into [`crate::recorder::CommandRecorder`].
//!
//! Every operation exposes a `record_x`/`run_x` pair: `record_x` appends to
//! a caller-owned recorder (for fusing several ops into one submission),
//! `run_x` opens its own recorder, submits, and waits. Both funnel through
//! [`dispatch`], which owns variant lookup, pipeline/bind-group-layout
//! construction, and the zero-length-dispatch skip (§4.9).
//!
//! Grounded in the teacher's `gpu::automation::unified_kernel::dispatch`
//! entry point (bind group built per call from a fixed-shape descriptor,
//! pipeline looked up from a cache keyed by name) generalized from one
//! shader to the whole kernel registry.

pub mod attention;
pub mod cast;
pub mod dequant;
pub mod elementwise;
pub mod matmul;
pub mod moe;
pub mod rmsnorm;
pub mod rope;
pub mod sample;
pub mod softmax;

use crate::constants::MAX_WORKGROUPS;
use crate::device::Capability;
use crate::error::{KernelError, KernelResult};
use crate::gpu::PipelineCache;
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::shaders;
use crate::EngineResources;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    StorageRead,
    StorageReadWrite,
}

impl BindingKind {
    fn read_only(self) -> bool {
        matches!(self, BindingKind::StorageRead)
    }
}

/// One non-uniform binding in a dispatch's bind group. Binding 0 (the
/// uniform struct) is handled separately by [`dispatch`] since every
/// operation has exactly one.
pub struct KernelBinding<'a> {
    pub binding: u32,
    pub buffer: &'a wgpu::Buffer,
    pub kind: BindingKind,
}

pub struct DispatchRequest<'a> {
    pub operation: &'static str,
    pub variant: &'a str,
    pub label: &'a str,
    pub uniform_bytes: &'a [u8],
    pub bindings: &'a [KernelBinding<'a>],
    pub workgroups: (u32, u32, u32),
}

/// Folds a 1-D dispatch of `groups` workgroups into wgpu's per-axis
/// `MAX_WORKGROUPS` ceiling by moving overflow onto the Y axis, the way the
/// teacher's `DispatchPlanner` reshapes an oversized 1-D launch rather than
/// rejecting it outright. Errors only when even a folded Y axis would still
/// overflow.
pub fn wrap_workgroups_1d(kernel: &str, groups: u64) -> KernelResult<(u32, u32, u32)> {
    if groups == 0 {
        return Ok((0, 1, 1));
    }
    if groups <= MAX_WORKGROUPS as u64 {
        return Ok((groups as u32, 1, 1));
    }
    let y = groups.div_ceil(MAX_WORKGROUPS as u64);
    if y > MAX_WORKGROUPS as u64 {
        return Err(KernelError::ExceedsDeviceDispatchLimit {
            kernel: kernel.to_string(),
            workgroups: groups,
            max: MAX_WORKGROUPS,
            suggestion: "split the dispatch into multiple submissions".to_string(),
        });
    }
    Ok((MAX_WORKGROUPS, y as u32, 1))
}

pub fn ceil_div(total: u32, chunk: u32) -> u32 {
    total.div_ceil(chunk.max(1))
}

fn bind_group_layout_entries(bindings: &[KernelBinding<'_>]) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    for binding in bindings {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: binding.binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage {
                    read_only: binding.kind.read_only(),
                },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }
    entries
}

/// Resolves `(operation, variant)` through the registry, lazily builds the
/// bind-group layout and compute pipeline for it, writes the uniform struct
/// into the uniform cache, builds the bind group, and records one dispatch.
/// A zero-workgroup request is a no-op: several launchers compute geometry
/// from a caller-supplied length that can legitimately be zero (an empty
/// batch), and dispatching nothing is cheaper than asking every caller to
/// guard against it.
pub fn dispatch(
    resources: &EngineResources,
    recorder: &CommandRecorder,
    request: DispatchRequest<'_>,
) -> KernelResult<()> {
    if request.workgroups.0 == 0 || request.workgroups.1 == 0 || request.workgroups.2 == 0 {
        return Ok(());
    }

    let variant = registry::lookup(request.operation, request.variant)?;
    let layout_label = format!("{}:{}", request.operation, request.variant);
    let bgl = resources
        .pipelines
        .get_or_create_bind_group_layout(&layout_label, &bind_group_layout_entries(request.bindings));
    let shader_source = shaders::source_for(request.operation);
    let pipeline =
        pipeline_for(&resources.pipelines, variant, &resources.capability, &bgl, shader_source)?;

    let uniform_buffer = recorder.create_uniform_buffer(request.uniform_bytes, request.label)?;
    let mut entries = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: uniform_buffer.as_entire_binding(),
    }];
    entries.extend(request.bindings.iter().map(|b| wgpu::BindGroupEntry {
        binding: b.binding,
        resource: b.buffer.as_entire_binding(),
    }));

    let bind_group = resources
        .device
        .create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(request.label),
            layout: &bgl,
            entries: &entries,
        });

    recorder.begin_compute_pass(request.label)?;
    recorder.dispatch(request.label, &pipeline, &bind_group, request.workgroups)?;
    recorder.end_compute_pass()?;
    Ok(())
}

fn pipeline_for(
    pipelines: &PipelineCache,
    variant: &registry::variants::KernelVariant,
    capability: &Capability,
    bgl: &wgpu::BindGroupLayout,
    shader_source: &'static str,
) -> KernelResult<std::sync::Arc<wgpu::ComputePipeline>> {
    pipelines.get_or_create_pipeline(variant, capability, bgl, shader_source)
}
