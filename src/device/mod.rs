//! Device acquisition, feature/limit negotiation, and device-lost tracking.

pub mod diagnostics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::error::{KernelError, KernelResult};
use crate::perf::PerfGuard;

pub use diagnostics::CapabilityReport;

/// Optional features the dispatch core knows how to use if the adapter
/// advertises them. Always requested as a subset, never required.
const OPTIONAL_FEATURES: &[(wgpu::Features, &str)] = &[
    (wgpu::Features::SHADER_F16, "f16"),
    (wgpu::Features::SUBGROUP, "subgroups"),
    (wgpu::Features::TIMESTAMP_QUERY, "timestamp_query"),
];

/// Immutable snapshot of what the active device supports, derived once at
/// `ready` and handed to every other component by reference.
#[derive(Debug, Clone)]
pub struct Capability {
    pub adapter_name: String,
    pub vendor: u32,
    pub device_id: u32,
    pub backend: wgpu::Backend,
    pub features: Vec<&'static str>,
    pub limits: wgpu::Limits,
}

impl Capability {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| *f == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Uninitialized,
    Initializing,
    Ready,
    Lost,
}

/// Owns the wgpu device/queue and the derived [`Capability`] snapshot.
///
/// `init` is idempotent: once `Ready`, repeat calls are a no-op. A
/// device-lost callback flips the state back to `Lost`, which forces the
/// next `device()`/`capability()` access to error instead of handing out a
/// stale handle.
pub struct Device {
    state: std::sync::Mutex<DeviceState>,
    device: std::sync::RwLock<Option<Arc<wgpu::Device>>>,
    queue: std::sync::RwLock<Option<Arc<wgpu::Queue>>>,
    capability: std::sync::RwLock<Option<Capability>>,
    lost: Arc<AtomicBool>,
}

impl Default for Device {
    fn default() -> Self {
        Self {
            state: std::sync::Mutex::new(DeviceState::Uninitialized),
            device: std::sync::RwLock::new(None),
            queue: std::sync::RwLock::new(None),
            capability: std::sync::RwLock::new(None),
            lost: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Device {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires an adapter (trying high-performance, then low-power, then
    /// default power preference), negotiates optional features/limits, and
    /// retries once with nothing optional requested if the first attempt
    /// fails. Idempotent once `Ready`.
    pub async fn init(&self) -> KernelResult<()> {
        {
            let mut state = self.state.lock().expect("device state mutex poisoned");
            if *state == DeviceState::Ready {
                return Ok(());
            }
            *state = DeviceState::Initializing;
        }

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = Self::request_adapter(&instance).await.ok_or_else(|| {
            error!("[Device::init] no adapter available from any power preference");
            KernelError::DeviceUnavailable
        })?;

        let info = adapter.get_info();
        info!(
            "[Device::init] selected adapter '{}' ({:?}, backend {:?})",
            info.name, info.device_type, info.backend
        );

        match Self::request_device(&adapter, true).await {
            Ok((device, queue, features, limits)) => {
                self.install(device, queue, &adapter, features, limits);
                Ok(())
            }
            Err(first_err) => {
                warn!(
                    "[Device::init] device creation with optional features failed ({first_err}), retrying with none"
                );
                match Self::request_device(&adapter, false).await {
                    Ok((device, queue, features, limits)) => {
                        self.install(device, queue, &adapter, features, limits);
                        Ok(())
                    }
                    Err(second_err) => {
                        *self.state.lock().expect("device state mutex poisoned") =
                            DeviceState::Uninitialized;
                        Err(KernelError::DeviceCreationFailed(format!(
                            "first attempt: {first_err}; retry without optional features: {second_err}"
                        )))
                    }
                }
            }
        }
    }

    async fn request_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
        for power_preference in [
            wgpu::PowerPreference::HighPerformance,
            wgpu::PowerPreference::LowPower,
            wgpu::PowerPreference::None,
        ] {
            if let Some(adapter) = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
            {
                return Some(adapter);
            }
        }
        None
    }

    async fn request_device(
        adapter: &wgpu::Adapter,
        with_optional_features: bool,
    ) -> Result<(wgpu::Device, wgpu::Queue, wgpu::Features, wgpu::Limits), wgpu::RequestDeviceError>
    {
        let adapter_features = adapter.features();
        let mut features = wgpu::Features::empty();
        if with_optional_features {
            for (feature, _name) in OPTIONAL_FEATURES {
                if adapter_features.contains(*feature) {
                    features |= *feature;
                }
            }
        }
        let limits = adapter.limits();

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("kernel-dispatch-device"),
                    required_features: features,
                    required_limits: limits.clone(),
                },
                None,
            )
            .await
            .map(|(device, queue)| (device, queue, features, limits))
    }

    fn install(
        &self,
        device: wgpu::Device,
        queue: wgpu::Queue,
        adapter: &wgpu::Adapter,
        features: wgpu::Features,
        limits: wgpu::Limits,
    ) {
        let info = adapter.get_info();
        let active_features: Vec<&'static str> = OPTIONAL_FEATURES
            .iter()
            .filter(|(feature, _)| features.contains(*feature))
            .map(|(_, name)| *name)
            .collect();

        let lost_flag = self.lost.clone();
        device.on_uncaptured_error(Box::new(move |err| {
            error!("[Device] uncaptured GPU error: {err:?}");
            if matches!(err, wgpu::Error::OutOfMemory { .. }) {
                lost_flag.store(true, Ordering::Relaxed);
            }
        }));

        *self.device.write().expect("device lock poisoned") = Some(Arc::new(device));
        *self.queue.write().expect("queue lock poisoned") = Some(Arc::new(queue));
        *self.capability.write().expect("capability lock poisoned") = Some(Capability {
            adapter_name: info.name,
            vendor: info.vendor,
            device_id: info.device,
            backend: info.backend,
            features: active_features,
            limits,
        });
        *self.state.lock().expect("device state mutex poisoned") = DeviceState::Ready;
    }

    /// Marks the device lost, as if the `device_lost` future had resolved.
    /// Clears the cached handle and capability snapshot; callers must
    /// `init()` again before using this `Device`.
    pub fn mark_lost(&self, reason: &str) {
        warn!("[Device] device lost: {reason}");
        self.lost.store(true, Ordering::Relaxed);
        *self.state.lock().expect("device state mutex poisoned") = DeviceState::Lost;
        *self.device.write().expect("device lock poisoned") = None;
        *self.queue.write().expect("queue lock poisoned") = None;
        *self.capability.write().expect("capability lock poisoned") = None;
    }

    fn ensure_ready(&self) -> KernelResult<()> {
        if self.lost.load(Ordering::Relaxed) {
            return Err(KernelError::DeviceLost {
                reason: "device_lost signal observed".to_string(),
            });
        }
        if *self.state.lock().expect("device state mutex poisoned") != DeviceState::Ready {
            return Err(KernelError::DeviceUnavailable);
        }
        Ok(())
    }

    pub fn device(&self) -> KernelResult<Arc<wgpu::Device>> {
        self.ensure_ready()?;
        self.device
            .read()
            .expect("device lock poisoned")
            .clone()
            .ok_or(KernelError::DeviceUnavailable)
    }

    pub fn queue(&self) -> KernelResult<Arc<wgpu::Queue>> {
        self.ensure_ready()?;
        self.queue
            .read()
            .expect("queue lock poisoned")
            .clone()
            .ok_or(KernelError::DeviceUnavailable)
    }

    pub fn capability(&self) -> KernelResult<Capability> {
        self.ensure_ready()?;
        self.capability
            .read()
            .expect("capability lock poisoned")
            .clone()
            .ok_or(KernelError::DeviceUnavailable)
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.capability()
            .map(|c| c.has_feature(name))
            .unwrap_or(false)
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Relaxed)
    }

    /// Submits command buffers and notes the submission with `guard`,
    /// mirroring the teacher's wrapped-submission-queue approach.
    pub fn submit_tracked(
        &self,
        guard: &PerfGuard,
        command_buffers: impl IntoIterator<Item = wgpu::CommandBuffer>,
    ) -> KernelResult<wgpu::SubmissionIndex> {
        let queue = self.queue()?;
        let index = queue.submit(command_buffers);
        guard.note_submit();
        Ok(index)
    }
}

#[cfg(all(test, feature = "gpu-tests"))]
mod tests {
    use super::*;

    #[test]
    fn init_then_device_succeeds() {
        let device = Device::new();
        pollster::block_on(device.init()).expect("device init should succeed with an adapter");
        assert!(device.device().is_ok());
        assert!(device.capability().is_ok());
    }
}
