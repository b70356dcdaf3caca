//! RMSNorm variant selection (§4.8).

use crate::constants::SMALL_KERNEL_THRESHOLD;
use crate::device::Capability;
use crate::error::KernelResult;
use crate::selector::{resolve_override, validate_heuristic_pick};

#[derive(Debug, Clone, Copy)]
pub struct RmsNormSelectionInput {
    pub hidden_size: u32,
    pub has_residual: bool,
    pub input_f16: bool,
    pub residual_f16: Option<bool>,
    pub strict: bool,
}

pub fn select_rmsnorm(
    input: RmsNormSelectionInput,
    capability: &Capability,
    override_variant: Option<&str>,
) -> KernelResult<String> {
    if let Some(v) = resolve_override("rmsnorm", override_variant, input.strict, capability)? {
        return Ok(v);
    }

    let base = if input.has_residual {
        "residual"
    } else if capability.has_feature("subgroups") {
        "subgroup"
    } else if input.hidden_size <= SMALL_KERNEL_THRESHOLD {
        "small"
    } else {
        "default"
    };

    let both_f16 = input.input_f16 && input.residual_f16.unwrap_or(true);
    let picked = if both_f16 && capability.has_feature("f16") {
        match base {
            "residual" => "residual_f16",
            "subgroup" => "subgroup_f16",
            "small" => "small_f16",
            _ => "default_f16",
        }
    } else {
        base
    };

    validate_heuristic_pick("rmsnorm", picked, capability)
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
    fn residual_input_wins_over_subgroup_and_size() {
        let cap = capability(vec!["subgroups"]);
        let input = RmsNormSelectionInput {
            hidden_size: 4096,
            has_residual: true,
            input_f16: false,
            residual_f16: None,
            strict: false,
        };
        assert_eq!(select_rmsnorm(input, &cap, None).unwrap(), "residual");
    }

    #[test]
    fn f16_suffix_requires_both_input_and_residual_f16() {
        let cap = capability(vec!["f16"]);
        let input = RmsNormSelectionInput {
            hidden_size: 4096,
            has_residual: true,
            input_f16: true,
            residual_f16: Some(true),
            strict: false,
        };
        assert_eq!(select_rmsnorm(input, &cap, None).unwrap(), "residual_f16");
    }

    #[test]
    fn small_kernel_for_small_hidden_size_without_subgroups() {
        let cap = capability(vec![]);
        let input = RmsNormSelectionInput {
            hidden_size: 128,
            has_residual: false,
            input_f16: false,
            residual_f16: None,
            strict: false,
        };
        assert_eq!(select_rmsnorm(input, &cap, None).unwrap(), "small");
    }
}
