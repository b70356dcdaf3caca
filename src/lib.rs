//! GPU kernel dispatch and resource-management core for a browser-resident
//! LLM inference runtime, built on top of `wgpu`'s WebGPU-class API.
//!
//! [`Engine`] is the single entry point: it owns the [`device::Device`], the
//! buffer/uniform/pipeline caches, the performance guard and profiler, the
//! kernel-path resolver, and the auto-tuner, and hands out a
//! [`CommandRecorder`] for anything that wants to dispatch a kernel. Nothing
//! in this crate reaches for process-wide statics — every subsystem is
//! constructed once by `Engine::new` and threaded through by reference or
//! `Arc`, the way the teacher threads its buffer registries through
//! `EngineBuffers` rather than behind module-level globals.

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod gpu;
pub mod kernel_path;
pub mod launchers;
pub mod memory;
pub mod perf;
pub mod platform;
pub mod recorder;
pub mod registry;
pub mod selector;
pub mod shaders;
pub mod tuner;
pub mod uniforms;

use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;

pub use config::RuntimeConfig;
pub use device::{Capability, Device};
pub use error::{KernelError, KernelResult};
pub use gpu::{DType, Layout, PipelineCache, Tensor, WeightBuffer};
pub use kernel_path::{KernelPath, KernelPathResolver, KernelPathSource, Phase};
pub use memory::{BufferPool, UniformCache};
pub use perf::{PerfGuard, PerfGuardConfig, PerfProfiler};
pub use platform::{PlatformProfile, PlatformRegistry};
pub use recorder::CommandRecorder;
pub use tuner::AutoTuner;

/// The GPU-backed resources that only exist once [`Engine::init`] has run.
/// Held behind an `Arc` so launchers can clone a snapshot and keep using it
/// even if the engine re-initializes around them mid-call.
pub struct EngineResources {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub capability: Capability,
    pub buffers: Arc<BufferPool>,
    pub uniforms: Arc<UniformCache>,
    pub pipelines: Arc<PipelineCache>,
}

/// Single handle for the whole dispatch core. One `Engine` per page/worker;
/// nothing here is a process-wide singleton.
pub struct Engine {
    config: RuntimeConfig,
    device: Device,
    guard: Arc<PerfGuard>,
    profiler: PerfProfiler,
    resources: RwLock<Option<Arc<EngineResources>>>,
    kernel_path: KernelPathResolver,
    tuner: AutoTuner,
    platforms: RwLock<Option<Arc<PlatformRegistry>>>,
}

impl Engine {
    pub fn new(config: RuntimeConfig) -> Self {
        let guard = Arc::new(PerfGuard::new(config.perf_guard));
        Self {
            tuner: AutoTuner::new(config.auto_tune),
            config,
            device: Device::new(),
            guard,
            profiler: PerfProfiler::new(),
            resources: RwLock::new(None),
            kernel_path: KernelPathResolver::new(),
            platforms: RwLock::new(None),
        }
    }

    /// Installs a platform-JSON registry (§6), replacing whatever was
    /// previously loaded. Optional: with nothing installed,
    /// [`Self::active_platform`] always returns `None` and launchers fall
    /// through to the kernel registry's built-in heuristics untouched.
    pub fn load_platforms(&self, registry: PlatformRegistry) {
        *self.platforms.write() = Some(Arc::new(registry));
    }

    /// Resolves the platform profile matching the current adapter, if a
    /// registry was loaded and the device is ready. Per §6, the first
    /// non-generic detection match wins; otherwise the `generic` profile.
    pub fn active_platform(&self) -> KernelResult<Option<PlatformProfile>> {
        let resources = self.resources()?;
        let Some(registry) = self.platforms.read().clone() else {
            return Ok(None);
        };
        Ok(registry.resolve(&resources.capability).cloned())
    }

    /// Acquires the GPU device and builds every resource cache on top of
    /// it. Idempotent: a second call while resources are already installed
    /// is a no-op, matching [`Device::init`]'s own idempotence.
    pub async fn init(&self) -> KernelResult<()> {
        if self.resources.read().is_some() {
            return Ok(());
        }

        self.device.init().await?;
        let device = self.device.device()?;
        let queue = self.device.queue()?;
        let capability = self.device.capability()?;

        let buffers = Arc::new(BufferPool::new(
            device.clone(),
            queue.clone(),
            self.guard.clone(),
            self.config.buffer_pool,
            &capability.limits,
        ));
        let uniforms = Arc::new(UniformCache::new(
            device.clone(),
            queue.clone(),
            self.config.uniform_cache,
        ));
        let pipelines = Arc::new(PipelineCache::new(device.clone()));

        info!(
            "[Engine::init] ready on '{}' ({:?}), features: {:?}",
            capability.adapter_name, capability.backend, capability.features
        );

        *self.resources.write() = Some(Arc::new(EngineResources {
            device,
            queue,
            capability,
            buffers,
            uniforms,
            pipelines,
        }));
        Ok(())
    }

    pub fn resources(&self) -> KernelResult<Arc<EngineResources>> {
        self.resources
            .read()
            .as_ref()
            .cloned()
            .ok_or(KernelError::DeviceUnavailable)
    }

    pub fn capability(&self) -> KernelResult<Capability> {
        Ok(self.resources()?.capability.clone())
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.capability().map(|c| c.has_feature(name)).unwrap_or(false)
    }

    pub fn guard(&self) -> &Arc<PerfGuard> {
        &self.guard
    }

    pub fn profiler(&self) -> &PerfProfiler {
        &self.profiler
    }

    pub fn kernel_path(&self) -> &KernelPathResolver {
        &self.kernel_path
    }

    pub fn tuner(&self) -> &AutoTuner {
        &self.tuner
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Builds a [`CommandRecorder`] bound to the engine's current resources.
    /// Errors if [`Self::init`] hasn't completed.
    pub fn recorder(&self, profiling: bool) -> KernelResult<CommandRecorder> {
        let resources = self.resources()?;
        Ok(CommandRecorder::new(
            resources.device.clone(),
            resources.queue.clone(),
            resources.buffers.clone(),
            resources.uniforms.clone(),
            self.guard.clone(),
            profiling,
        ))
    }

    /// Drops the cached resources and flags the underlying device lost, the
    /// way a `device.lost` promise resolving would. Callers must `init()`
    /// again before dispatching further kernels.
    pub fn mark_device_lost(&self, reason: &str) {
        warn!("[Engine] marking device lost: {reason}");
        self.device.mark_lost(reason);
        if let Some(resources) = self.resources.write().take() {
            resources.pipelines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_engine_reports_device_unavailable() {
        let engine = Engine::new(RuntimeConfig::default());
        assert!(matches!(engine.resources(), Err(KernelError::DeviceUnavailable)));
        assert!(matches!(engine.recorder(false), Err(KernelError::DeviceUnavailable)));
    }

    #[test]
    fn mark_device_lost_clears_resources_without_panicking() {
        let engine = Engine::new(RuntimeConfig::default());
        engine.mark_device_lost("simulated");
        assert!(engine.resources().is_err());
    }

    #[test]
    fn active_platform_without_device_errors_rather_than_silently_returning_none() {
        let engine = Engine::new(RuntimeConfig::default());
        engine.load_platforms(PlatformRegistry::new(vec![]));
        assert!(matches!(engine.active_platform(), Err(KernelError::DeviceUnavailable)));
    }
}
