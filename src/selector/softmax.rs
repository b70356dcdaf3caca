//! Softmax variant selection (§4.8).

use crate::constants::SMALL_KERNEL_THRESHOLD;
use crate::device::Capability;
use crate::error::KernelResult;
use crate::selector::{resolve_override, validate_heuristic_pick};

#[derive(Debug, Clone, Copy)]
pub struct SoftmaxSelectionInput {
    pub inner_size: u32,
    pub input_f16: bool,
    pub strict: bool,
}

pub fn select_softmax(
    input: SoftmaxSelectionInput,
    capability: &Capability,
    override_variant: Option<&str>,
) -> KernelResult<String> {
    if let Some(v) = resolve_override("softmax", override_variant, input.strict, capability)? {
        return Ok(v);
    }

    let base = if capability.has_feature("subgroups") {
        "subgroup"
    } else if input.inner_size <= SMALL_KERNEL_THRESHOLD {
        "small"
    } else {
        "default"
    };

    let picked = if input.input_f16 && capability.has_feature("f16") {
        match base {
            "subgroup" => "subgroup_f16",
            "small" => "small_f16",
            _ => "default_f16",
        }
    } else {
        base
    };

    validate_heuristic_pick("softmax", picked, capability)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(features: Vec<&'static str>) -> Capability {
        Capability {
            adapter_name: "test".to_string(),
            vendor: 0,
            device_id: 0,
            backend: wgpu::Backend::Vulkan,
            features,
            limits: wgpu::Limits::default(),
        }
    }

    #[test]
    fn subgroup_preferred_when_available() {
        let cap = capability(vec!["subgroups"]);
        let input = SoftmaxSelectionInput {
            inner_size: 4096,
            input_f16: false,
            strict: false,
        };
        assert_eq!(select_softmax(input, &cap, None).unwrap(), "subgroup");
    }

    #[test]
    fn small_kernel_below_threshold_without_subgroups() {
        let cap = capability(vec![]);
        let input = SoftmaxSelectionInput {
            inner_size: 128,
            input_f16: false,
            strict: false,
        };
        assert_eq!(select_softmax(input, &cap, None).unwrap(), "small");
    }

    #[test]
    fn default_above_threshold_without_subgroups() {
        let cap = capability(vec![]);
        let input = SoftmaxSelectionInput {
            inner_size: 4096,
            input_f16: false,
            strict: false,
        };
        assert_eq!(select_softmax(input, &cap, None).unwrap(), "default");
    }

    #[test]
    fn f16_suffix_requires_device_f16_support() {
        let cap = capability(vec!["subgroups"]);
        let input = SoftmaxSelectionInput {
            inner_size: 4096,
            input_f16: true,
            strict: false,
        };
        // Device lacks the f16 feature, so the plain subgroup variant wins.
        assert_eq!(select_softmax(input, &cap, None).unwrap(), "subgroup");
    }
}
