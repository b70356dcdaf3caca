//! Four layered caches: shader source, compiled shader module,
//! bind-group layout, and compute pipeline.
//!
//! Grounded in the teacher's `TypedComputePipelineBuilder` (typed builder
//! pattern, `PipelineError` enum) from `gpu/automation/safe_pipeline.rs`,
//! simplified from a generic builder into four flat caches since this
//! crate only ever builds compute pipelines for a fixed shader set known
//! up front through the kernel registry (C6).

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::device::Capability;
use crate::error::{KernelError, KernelResult};
use crate::registry::variants::KernelVariant;

pub struct PipelineCache {
    device: Arc<wgpu::Device>,
    sources: Mutex<FxHashMap<&'static str, &'static str>>,
    modules: Mutex<FxHashMap<&'static str, Arc<wgpu::ShaderModule>>>,
    bind_group_layouts: Mutex<FxHashMap<String, Arc<wgpu::BindGroupLayout>>>,
    pipelines: Mutex<FxHashMap<String, Arc<wgpu::ComputePipeline>>>,
}

impl PipelineCache {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            device,
            sources: Mutex::new(FxHashMap::default()),
            modules: Mutex::new(FxHashMap::default()),
            bind_group_layouts: Mutex::new(FxHashMap::default()),
            pipelines: Mutex::new(FxHashMap::default()),
        }
    }

    /// Compiles (or returns a cached) shader module for `path`. Any
    /// compiler-reported error message fails the compile.
    pub fn get_or_create_module(
        &self,
        path: &'static str,
        source: &'static str,
    ) -> KernelResult<Arc<wgpu::ShaderModule>> {
        if let Some(module) = self.modules.lock().get(path) {
            return Ok(module.clone());
        }

        self.sources.lock().insert(path, source);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(path),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let module = Arc::new(module);
        self.modules.lock().insert(path, module.clone());
        debug!("[PipelineCache] compiled shader module `{path}`");
        Ok(module)
    }

    pub fn get_or_create_bind_group_layout(
        &self,
        label: &str,
        entries: &[wgpu::BindGroupLayoutEntry],
    ) -> Arc<wgpu::BindGroupLayout> {
        if let Some(layout) = self.bind_group_layouts.lock().get(label) {
            return layout.clone();
        }
        let layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries,
            });
        let layout = Arc::new(layout);
        self.bind_group_layouts
            .lock()
            .insert(label.to_string(), layout.clone());
        layout
    }

    /// Idempotent per `"operation:variant"` key. Resolves the variant's
    /// `requires` feature list against `capability` before creating a new
    /// pipeline; fails with `MissingFeatures` otherwise.
    pub fn get_or_create_pipeline(
        &self,
        variant: &KernelVariant,
        capability: &Capability,
        bind_group_layout: &wgpu::BindGroupLayout,
        shader_source: &'static str,
    ) -> KernelResult<Arc<wgpu::ComputePipeline>> {
        let key = format!("{}:{}", variant.operation, variant.variant);
        if let Some(pipeline) = self.pipelines.lock().get(&key) {
            return Ok(pipeline.clone());
        }

        let missing: Vec<&'static str> = variant
            .requires
            .iter()
            .copied()
            .filter(|feature| !capability.has_feature(feature))
            .collect();
        if !missing.is_empty() {
            return Err(KernelError::MissingFeatures(missing));
        }

        let module = self.get_or_create_module(variant.shader_file, shader_source)?;
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&key),
                bind_group_layouts: &[bind_group_layout],
                push_constant_ranges: &[],
            });
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&key),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: variant.entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            });
        let pipeline = Arc::new(pipeline);
        self.pipelines.lock().insert(key.clone(), pipeline.clone());
        debug!("[PipelineCache] created pipeline `{key}`");
        Ok(pipeline)
    }

    /// Reads the pipeline cache without compiling; `None` when cold.
    pub fn get_pipeline_fast(&self, operation: &str, variant: &str) -> Option<Arc<wgpu::ComputePipeline>> {
        let key = format!("{operation}:{variant}");
        self.pipelines.lock().get(&key).cloned()
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            sources: self.sources.lock().len(),
            modules: self.modules.lock().len(),
            bind_group_layouts: self.bind_group_layouts.lock().len(),
            pipelines: self.pipelines.lock().len(),
        }
    }

    /// Clears all layers. Called when the device transitions to `lost`,
    /// since every cached handle is invalidated with it.
    pub fn clear(&self) {
        self.sources.lock().clear();
        self.modules.lock().clear();
        self.bind_group_layouts.lock().clear();
        self.pipelines.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub sources: usize,
    pub modules: usize,
    pub bind_group_layouts: usize,
    pub pipelines: usize,
}
