//! Process-wide kernel variant registry. One global instance built once
//! from the static [`variants::KERNEL_VARIANTS`] table, the way the
//! teacher's `BINDING_REGISTRY` is a `lazy_static` global `Mutex`-guarded
//! map — except this table never mutates after construction, so no mutex
//! is needed, only a read-only index built once.

pub mod variants;

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use serde::Serialize;

pub use variants::{KernelVariant, KERNEL_VARIANTS};

use crate::error::{KernelError, KernelResult};

lazy_static! {
    static ref INDEX: FxHashMap<(&'static str, &'static str), &'static KernelVariant> = {
        let mut map = FxHashMap::default();
        for variant in KERNEL_VARIANTS {
            map.insert((variant.operation, variant.variant), variant);
        }
        map
    };
}

/// Looks up a `(operation, variant)` pair. The only way launchers and the
/// selector ever learn a shader file path.
pub fn lookup(operation: &str, variant: &str) -> KernelResult<&'static KernelVariant> {
    INDEX
        .get(&(operation, variant))
        .copied()
        .ok_or_else(|| KernelError::UnknownVariant {
            operation: operation.to_string(),
            variant: variant.to_string(),
        })
}

/// All variants registered for `operation`, for selector heuristics that
/// need to enumerate candidates (e.g. picking the richest one whose
/// `requires` is satisfied).
pub fn variants_for(operation: &str) -> impl Iterator<Item = &'static KernelVariant> {
    KERNEL_VARIANTS.iter().filter(move |v| v.operation == operation)
}

pub fn contains(operation: &str, variant: &str) -> bool {
    INDEX.contains_key(&(operation, variant))
}

#[derive(Debug, Serialize)]
pub struct RegistryVariantEntry {
    pub operation: &'static str,
    pub variant: &'static str,
    pub shader_file: &'static str,
    pub entry_point: &'static str,
    pub workgroup_size: (u32, u32, u32),
    pub requires: &'static [&'static str],
}

/// Dumps the full registry as a JSON-serializable structure, grounded in
/// the teacher's `UnifiedGpuSystem::generate_layout_constants` /
/// `BindingRegistry::generate_wgsl_bindings` — both exist so tooling
/// outside the engine (a debugger, a profile-driven platform JSON
/// generator) can introspect what the static table actually contains
/// without recompiling.
pub fn describe() -> Vec<RegistryVariantEntry> {
    KERNEL_VARIANTS
        .iter()
        .map(|v| RegistryVariantEntry {
            operation: v.operation,
            variant: v.variant,
            shader_file: v.shader_file,
            entry_point: v.entry_point,
            workgroup_size: v.workgroup_size,
            requires: v.requires,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_variant_succeeds() {
        let variant = lookup("matmul", "f32").expect("matmul:f32 must be registered");
        assert_eq!(variant.shader_file, "matmul.wgsl");
    }

    #[test]
    fn lookup_unknown_variant_errors() {
        assert!(matches!(
            lookup("matmul", "does_not_exist"),
            Err(KernelError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn variants_for_matmul_includes_all_gemv_tiers() {
        let names: Vec<&str> = variants_for("matmul").map(|v| v.variant).collect();
        assert!(names.contains(&"gemv"));
        assert!(names.contains(&"gemv_subgroup"));
        assert!(names.contains(&"gemv_subgroup_multicol"));
    }

    #[test]
    fn describe_matches_table_length() {
        assert_eq!(describe().len(), KERNEL_VARIANTS.len());
    }
}
