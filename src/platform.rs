//! Platform JSON (§6): per-device kernel-override / memory-hint profiles
//! matched against the adapter's reported vendor/architecture/device/
//! description. Optional and secondary to the kernel registry (C6) — a
//! platform profile can *suggest* a variant for an operation, but the
//! registry (§4.6: "the static in-code table is authoritative at runtime")
//! still has the only say over whether that variant actually exists and
//! what it requires.
//!
//! Grounded in the teacher's detection-table pattern for hardware quirks
//! (`gpu::automation::adapter_info` scoring adapters by vendor/device id)
//! generalized from "pick an adapter" to "pick a named override profile",
//! plus `kernel_path.rs`'s `include_str!`-embedded-JSON-plus-serde
//! approach for the on-disk format itself.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::device::Capability;
use crate::error::KernelResult;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlatformDetection {
    #[serde(default)]
    pub vendor: Option<u32>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub device: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PlatformDetection {
    fn is_empty(&self) -> bool {
        self.vendor.is_none() && self.architecture.is_none() && self.device.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub detection: PlatformDetection,
    #[serde(default, rename = "isGeneric")]
    pub is_generic: bool,
    #[serde(default, rename = "kernelOverrides")]
    pub kernel_overrides: HashMap<String, String>,
    #[serde(default, rename = "memoryHints")]
    pub memory_hints: HashMap<String, serde_json::Value>,
}

impl PlatformProfile {
    pub fn from_json(text: &str) -> KernelResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// A non-generic profile matches when every detection field it names
    /// agrees with `capability`, and it names at least one field (an empty
    /// `detection` object on a non-generic profile never matches anything,
    /// to avoid an accidental catch-all shadowing the real generic entry).
    fn matches(&self, capability: &Capability) -> bool {
        if self.is_generic || self.detection.is_empty() {
            return false;
        }
        let d = &self.detection;
        if let Some(vendor) = d.vendor {
            if vendor != capability.vendor {
                return false;
            }
        }
        if let Some(device) = d.device {
            if device != capability.device_id {
                return false;
            }
        }
        let haystack = capability.adapter_name.to_lowercase();
        if let Some(architecture) = &d.architecture {
            if !haystack.contains(&architecture.to_lowercase()) {
                return false;
            }
        }
        if let Some(description) = &d.description {
            if !haystack.contains(&description.to_lowercase()) {
                return false;
            }
        }
        true
    }

    /// The variant this profile prefers for `operation`, if it overrides
    /// one. Callers feed this to the selector the same way a kernel-path
    /// override is fed in (§4.8 step 1) — it is advisory, not authoritative.
    pub fn kernel_override_for(&self, operation: &str) -> Option<&str> {
        self.kernel_overrides.get(operation).map(String::as_str)
    }
}

/// A loaded set of platform profiles. Resolution picks the first
/// non-generic profile whose `detection` matches the current adapter, else
/// falls back to the `isGeneric` profile when one was loaded (§6: "first
/// non-generic match wins, else the `generic` file is used").
pub struct PlatformRegistry {
    specific: Vec<PlatformProfile>,
    generic: Option<PlatformProfile>,
}

impl PlatformRegistry {
    pub fn new(profiles: Vec<PlatformProfile>) -> Self {
        let mut specific = Vec::new();
        let mut generic = None;
        for profile in profiles {
            if profile.is_generic {
                generic = Some(profile);
            } else {
                specific.push(profile);
            }
        }
        Self { specific, generic }
    }

    pub fn from_json_documents<'a>(documents: impl IntoIterator<Item = &'a str>) -> KernelResult<Self> {
        let mut profiles = Vec::new();
        for document in documents {
            profiles.push(PlatformProfile::from_json(document)?);
        }
        Ok(Self::new(profiles))
    }

    pub fn resolve(&self, capability: &Capability) -> Option<&PlatformProfile> {
        self.specific
            .iter()
            .find(|profile| profile.matches(capability))
            .or(self.generic.as_ref())
    }

    pub fn len(&self) -> usize {
        self.specific.len() + self.generic.is_some() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(vendor: u32, device_id: u32, adapter_name: &str) -> Capability {
        Capability {
            adapter_name: adapter_name.to_string(),
            vendor,
            device_id,
            backend: wgpu::Backend::Vulkan,
            features: vec![],
            limits: wgpu::Limits::default(),
        }
    }

    const NVIDIA_PROFILE: &str = r#"{
        "id": "nvidia-ampere",
        "name": "NVIDIA Ampere",
        "detection": { "vendor": 4318, "architecture": "ampere" },
        "kernelOverrides": { "matmul": "gemv_subgroup_multicol" }
    }"#;

    const GENERIC_PROFILE: &str = r#"{
        "id": "generic",
        "name": "Generic",
        "isGeneric": true,
        "kernelOverrides": { "matmul": "f32" }
    }"#;

    #[test]
    fn specific_profile_wins_over_generic_on_match() {
        let registry = PlatformRegistry::from_json_documents([NVIDIA_PROFILE, GENERIC_PROFILE]).unwrap();
        let cap = capability(4318, 0x1234, "NVIDIA GeForce RTX (Ampere)");
        let resolved = registry.resolve(&cap).unwrap();
        assert_eq!(resolved.id, "nvidia-ampere");
    }

    #[test]
    fn unmatched_adapter_falls_back_to_generic() {
        let registry = PlatformRegistry::from_json_documents([NVIDIA_PROFILE, GENERIC_PROFILE]).unwrap();
        let cap = capability(0x1002, 0x9999, "AMD Radeon");
        let resolved = registry.resolve(&cap).unwrap();
        assert_eq!(resolved.id, "generic");
    }

    #[test]
    fn no_generic_and_no_match_resolves_to_none() {
        let registry = PlatformRegistry::from_json_documents([NVIDIA_PROFILE]).unwrap();
        let cap = capability(0x1002, 0x9999, "AMD Radeon");
        assert!(registry.resolve(&cap).is_none());
    }

    #[test]
    fn kernel_override_for_known_op_returns_the_variant_name() {
        let profile = PlatformProfile::from_json(NVIDIA_PROFILE).unwrap();
        assert_eq!(profile.kernel_override_for("matmul"), Some("gemv_subgroup_multicol"));
        assert_eq!(profile.kernel_override_for("softmax"), None);
    }

    #[test]
    fn empty_detection_on_non_generic_profile_never_matches() {
        let profile = PlatformProfile::from_json(
            r#"{"id": "broken", "name": "broken", "kernelOverrides": {}}"#,
        )
        .unwrap();
        let cap = capability(4318, 0x1234, "NVIDIA GeForce RTX");
        assert!(!profile.matches(&cap));
    }
}
