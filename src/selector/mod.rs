//! Capability-aware variant selection. One module per operation family,
//! sharing the kernel-path-override step (§4.8 step 1) through
//! [`resolve_override`].

pub mod attention;
pub mod dequant;
pub mod elementwise;
pub mod matmul;
pub mod rmsnorm;
pub mod softmax;

use log::warn;

use crate::device::Capability;
use crate::error::{KernelError, KernelResult};

/// If the active kernel path supplies a variant for `operation`, validates
/// it against the registry and current capabilities. Strict paths turn a
/// validation failure into an error; auto paths log a warning and fall
/// through to the heuristics below.
pub(crate) fn resolve_override(
    operation: &str,
    override_variant: Option<&str>,
    strict: bool,
    capability: &Capability,
) -> KernelResult<Option<String>> {
    let Some(variant) = override_variant else {
        return Ok(None);
    };

    let lookup_result = crate::registry::lookup(operation, variant);
    match lookup_result {
        Ok(kv) => {
            let missing: Vec<&'static str> = kv
                .requires
                .iter()
                .copied()
                .filter(|feature| !capability.has_feature(feature))
                .collect();
            if missing.is_empty() {
                Ok(Some(variant.to_string()))
            } else if strict {
                Err(KernelError::MissingFeatures(missing))
            } else {
                warn!(
                    "[Selector] kernel-path override `{operation}:{variant}` missing features {missing:?}; falling back to heuristics"
                );
                Ok(None)
            }
        }
        Err(err) => {
            if strict {
                Err(err)
            } else {
                warn!(
                    "[Selector] kernel-path override `{operation}:{variant}` not in registry ({err}); falling back to heuristics"
                );
                Ok(None)
            }
        }
    }
}

/// Confirms a heuristic-picked variant actually exists in the registry and
/// that its required features are satisfied, surfacing `MissingFeatures`
/// rather than letting a launcher find out at pipeline-creation time.
pub(crate) fn validate_heuristic_pick(
    operation: &str,
    variant: &str,
    capability: &Capability,
) -> KernelResult<String> {
    let kv = crate::registry::lookup(operation, variant)?;
    let missing: Vec<&'static str> = kv
        .requires
        .iter()
        .copied()
        .filter(|feature| !capability.has_feature(feature))
        .collect();
    if missing.is_empty() {
        Ok(variant.to_string())
    } else {
        Err(KernelError::MissingFeatures(missing))
    }
}
