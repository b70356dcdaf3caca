//! Variant selection for the elementwise family: SiLU, GeLU, gather,
//! residual add, and bias add (§4.8). These share one shape: a base variant
//! name chosen from the operation's available forms, then an `_f16` suffix
//! flip when every operand involved is f16 and the device supports it.

use crate::device::Capability;
use crate::error::KernelResult;
use crate::selector::{resolve_override, validate_heuristic_pick};

/// Which elementwise family is being dispatched, and the shape hint needed
/// to pick among its base variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementwiseKind {
    /// SiLU/GeLU activation. `gated` fires when a paired gate tensor is
    /// supplied; `vec4` when the hidden size is a multiple of 4 and no gate
    /// is present.
    Activation { gated: bool, vec4_eligible: bool },
    /// Embedding/KV gather. `rowsplit` fires when a single row exceeds one
    /// workgroup's worth of elements; `vec4` when the row width divides
    /// evenly by 4.
    Gather { rowsplit: bool, vec4_eligible: bool },
    /// Residual add and bias add only ever have a `plain` base variant.
    Plain,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementwiseSelectionInput {
    pub operation: &'static str,
    pub kind: ElementwiseKind,
    pub operands_f16: bool,
    pub strict: bool,
}

pub fn select_elementwise(
    input: ElementwiseSelectionInput,
    capability: &Capability,
    override_variant: Option<&str>,
) -> KernelResult<String> {
    if let Some(v) = resolve_override(input.operation, override_variant, input.strict, capability)? {
        return Ok(v);
    }

    let base = match input.kind {
        ElementwiseKind::Activation { gated, vec4_eligible } => {
            if gated {
                "gated"
            } else if vec4_eligible {
                "vec4"
            } else {
                "plain"
            }
        }
        ElementwiseKind::Gather { rowsplit, vec4_eligible } => {
            if rowsplit {
                "rowsplit"
            } else if vec4_eligible {
                "vec4"
            } else {
                "plain"
            }
        }
        ElementwiseKind::Plain => "plain",
    };

    let picked = if input.operands_f16 && capability.has_feature("f16") {
        format!("{base}_f16")
    } else {
        base.to_string()
    };

    validate_heuristic_pick(input.operation, &picked, capability)
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
    fn gated_activation_wins_over_vec4() {
        let cap = capability(vec![]);
        let input = ElementwiseSelectionInput {
            operation: "silu",
            kind: ElementwiseKind::Activation {
                gated: true,
                vec4_eligible: true,
            },
            operands_f16: false,
            strict: false,
        };
        assert_eq!(select_elementwise(input, &cap, None).unwrap(), "gated");
    }

    #[test]
    fn vec4_activation_when_ungated_and_eligible() {
        let cap = capability(vec!["f16"]);
        let input = ElementwiseSelectionInput {
            operation: "gelu",
            kind: ElementwiseKind::Activation {
                gated: false,
                vec4_eligible: true,
            },
            operands_f16: true,
            strict: false,
        };
        assert_eq!(select_elementwise(input, &cap, None).unwrap(), "vec4_f16");
    }

    #[test]
    fn gather_rowsplit_picked_for_wide_rows() {
        let cap = capability(vec![]);
        let input = ElementwiseSelectionInput {
            operation: "gather",
            kind: ElementwiseKind::Gather {
                rowsplit: true,
                vec4_eligible: true,
            },
            operands_f16: false,
            strict: false,
        };
        assert_eq!(select_elementwise(input, &cap, None).unwrap(), "rowsplit");
    }

    #[test]
    fn plain_ops_ignore_kind_shape_hints() {
        let cap = capability(vec![]);
        let input = ElementwiseSelectionInput {
            operation: "residual",
            kind: ElementwiseKind::Plain,
            operands_f16: false,
            strict: false,
        };
        assert_eq!(select_elementwise(input, &cap, None).unwrap(), "plain");
    }

    #[test]
    fn f16_suffix_skipped_without_device_support() {
        let cap = capability(vec![]);
        let input = ElementwiseSelectionInput {
            operation: "bias_add",
            kind: ElementwiseKind::Plain,
            operands_f16: true,
            strict: false,
        };
        assert_eq!(select_elementwise(input, &cap, None).unwrap(), "plain");
    }
}
