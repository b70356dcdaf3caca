//! Dequantization variant selection (§4.8).

use crate::device::Capability;
use crate::error::KernelResult;
use crate::selector::{resolve_override, validate_heuristic_pick};

#[derive(Debug, Clone, Copy)]
pub struct DequantSelectionInput {
    pub vec4_requested: bool,
    pub want_f16_output: bool,
    pub strict: bool,
}

pub fn select_dequant(
    input: DequantSelectionInput,
    capability: &Capability,
    override_variant: Option<&str>,
) -> KernelResult<String> {
    if let Some(v) = resolve_override("dequant", override_variant, input.strict, capability)? {
        return Ok(v);
    }

    let subgroups = capability.has_feature("subgroups");
    let f16 = capability.has_feature("f16");
    let f16_out = input.want_f16_output && f16;

    let picked = match (subgroups, input.vec4_requested, f16_out) {
        (true, false, false) => "subgroup",
        (true, true, false) => "subgroup_vec4",
        (true, false, true) => "subgroup_f16out",
        (true, true, true) => "subgroup_vec4_f16out",
        (false, false, false) => "shared",
        (false, true, false) => "shared_vec4",
        (false, false, true) => "shared_f16out",
        (false, true, true) => "shared_vec4_f16out",
    };

    validate_heuristic_pick("dequant", picked, capability)
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
    fn subgroup_vec4_f16out_when_everything_available() {
        let cap = capability(vec!["subgroups", "f16"]);
        let input = DequantSelectionInput {
            vec4_requested: true,
            want_f16_output: true,
            strict: false,
        };
        assert_eq!(select_dequant(input, &cap, None).unwrap(), "subgroup_vec4_f16out");
    }

    #[test]
    fn shared_fallback_without_subgroups_or_f16() {
        let cap = capability(vec![]);
        let input = DequantSelectionInput {
            vec4_requested: false,
            want_f16_output: true,
            strict: false,
        };
        assert_eq!(select_dequant(input, &cap, None).unwrap(), "shared");
    }

    #[test]
    fn shared_vec4_without_subgroups() {
        let cap = capability(vec![]);
        let input = DequantSelectionInput {
            vec4_requested: true,
            want_f16_output: false,
            strict: false,
        };
        assert_eq!(select_dequant(input, &cap, None).unwrap(), "shared_vec4");
    }

    #[test]
    fn f16out_requested_but_unsupported_falls_back_to_non_f16out_variant() {
        let cap = capability(vec!["subgroups"]);
        let input = DequantSelectionInput {
            vec4_requested: false,
            want_f16_output: true,
            strict: false,
        };
        assert_eq!(select_dequant(input, &cap, None).unwrap(), "subgroup");
    }
}
