//! Minimum-viable-capability validation, separate from [`super::Device`] so
//! it can run against an adapter before a device is even requested.

use serde::Serialize;

use super::Capability;

/// Compute-relevant limits worth surfacing to logs/tooling, trimmed from
/// wgpu's much larger `Limits` struct down to the ones the launchers and
/// selector actually branch on.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub adapter_name: String,
    pub backend: String,
    pub features: Vec<&'static str>,
    pub max_storage_buffer_binding_size: u32,
    pub max_buffer_size: u64,
    pub max_compute_workgroup_size_x: u32,
    pub max_compute_workgroup_size_y: u32,
    pub max_compute_workgroup_size_z: u32,
    pub max_compute_invocations_per_workgroup: u32,
    pub max_compute_workgroup_storage_size: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_uniform_buffer_binding_size: u32,
    pub warnings: Vec<String>,
}

impl From<&Capability> for CapabilityReport {
    fn from(cap: &Capability) -> Self {
        let limits = &cap.limits;
        let mut warnings = Vec::new();

        if limits.max_storage_buffer_binding_size < 256 * 1024 * 1024 {
            warnings.push(format!(
                "max_storage_buffer_binding_size is only {} bytes; large weight tensors may not fit in one binding",
                limits.max_storage_buffer_binding_size
            ));
        }
        if !cap.has_feature("f16") {
            warnings.push("f16 shader support unavailable; f16-native kernel variants are excluded from selection".to_string());
        }
        if !cap.has_feature("subgroups") {
            warnings.push("subgroup operations unavailable; subgroup kernel variants are excluded from selection".to_string());
        }

        Self {
            adapter_name: cap.adapter_name.clone(),
            backend: format!("{:?}", cap.backend),
            features: cap.features.clone(),
            max_storage_buffer_binding_size: limits.max_storage_buffer_binding_size,
            max_buffer_size: limits.max_buffer_size,
            max_compute_workgroup_size_x: limits.max_compute_workgroup_size_x,
            max_compute_workgroup_size_y: limits.max_compute_workgroup_size_y,
            max_compute_workgroup_size_z: limits.max_compute_workgroup_size_z,
            max_compute_invocations_per_workgroup: limits.max_compute_invocations_per_workgroup,
            max_compute_workgroup_storage_size: limits.max_compute_workgroup_storage_size,
            max_compute_workgroups_per_dimension: limits.max_compute_workgroups_per_dimension,
            max_uniform_buffer_binding_size: limits.max_uniform_buffer_binding_size,
            warnings,
        }
    }
}

impl CapabilityReport {
    pub fn log_summary(&self) {
        log::info!(
            "[Device] adapter '{}' ({}), features: {:?}",
            self.adapter_name,
            self.backend,
            self.features
        );
        for warning in &self.warnings {
            log::warn!("[Device] {warning}");
        }
    }
}
