//! Static table of operations → variants. The sole source of truth for
//! valid `(operation, variant)` pairs and the only place shader file paths
//! are named — launchers and the selector only ever see this table.
//!
//! Grounded in the teacher's `gpu::automation::binding_manager` /
//! `unified_system` pattern of a single process-wide registry populated
//! once; redesigned per the spec's Design Notes §9 from a runtime-mutable
//! `HashMap` built by macro calls into a plain `const` table, so an
//! unknown `(operation, variant)` pair is a registry lookup miss rather
//! than a possible runtime insertion bug.

#[derive(Debug, Clone, Copy)]
pub struct KernelVariant {
    pub operation: &'static str,
    pub variant: &'static str,
    pub shader_file: &'static str,
    pub entry_point: &'static str,
    pub workgroup_size: (u32, u32, u32),
    pub requires: &'static [&'static str],
    pub output_dtype: Option<&'static str>,
    pub metadata: &'static [(&'static str, u32)],
}

macro_rules! variant {
    ($op:expr, $variant:expr, $shader:expr, $entry:expr, $wg:expr, $requires:expr $(,)?) => {
        KernelVariant {
            operation: $op,
            variant: $variant,
            shader_file: $shader,
            entry_point: $entry,
            workgroup_size: $wg,
            requires: $requires,
            output_dtype: None,
            metadata: &[],
        }
    };
    ($op:expr, $variant:expr, $shader:expr, $entry:expr, $wg:expr, $requires:expr, meta: $meta:expr $(,)?) => {
        KernelVariant {
            operation: $op,
            variant: $variant,
            shader_file: $shader,
            entry_point: $entry,
            workgroup_size: $wg,
            requires: $requires,
            output_dtype: None,
            metadata: $meta,
        }
    };
}

const NONE: &[&str] = &[];
const F16: &[&str] = &["f16"];
const SUBGROUPS: &[&str] = &["subgroups"];
const SUBGROUPS_F16: &[&str] = &["subgroups", "f16"];

pub static KERNEL_VARIANTS: &[KernelVariant] = &[
    // --- matmul ---
    variant!("matmul", "f32", "matmul.wgsl", "main", (16, 16, 1), NONE),
    variant!("matmul", "f16", "matmul_f16.wgsl", "main", (16, 16, 1), F16),
    variant!("matmul", "f16_vec4", "matmul_f16_vec4.wgsl", "main", (16, 16, 1), F16),
    variant!("matmul", "f16w_f32a", "matmul_f16w_f32a.wgsl", "main", (16, 16, 1), F16),
    variant!("matmul", "gemv", "matmul_gemv.wgsl", "main", (256, 1, 1), NONE),
    variant!("matmul", "gemv_subgroup", "matmul_gemv_subgroup.wgsl", "main", (256, 1, 1), SUBGROUPS),
    variant!(
        "matmul", "gemv_subgroup_multicol", "matmul_gemv_subgroup_multicol.wgsl", "main",
        (256, 1, 1), SUBGROUPS, meta: &[("colsPerWg", 4)],
    ),
    variant!(
        "matmul", "q4_fused_multicol", "matmul_q4_fused_multicol.wgsl", "main",
        (256, 1, 1), SUBGROUPS, meta: &[("colsPerWg", 4), ("outputBinding", 3)],
    ),
    variant!(
        "matmul", "q4_fused_multicol_f16", "matmul_q4_fused_multicol_f16.wgsl", "main",
        (256, 1, 1), SUBGROUPS_F16, meta: &[("colsPerWg", 4), ("outputBinding", 4)],
    ),
    variant!(
        "matmul", "q4_fused_batched", "matmul_q4_fused_batched.wgsl", "main",
        (16, 16, 1), SUBGROUPS, meta: &[("tileM", 8), ("outputBinding", 3)],
    ),
    variant!(
        "matmul", "q4_fused_batched_f16", "matmul_q4_fused_batched_f16.wgsl", "main",
        (16, 16, 1), SUBGROUPS_F16, meta: &[("tileM", 8), ("outputBinding", 4)],
    ),
    // --- attention ---
    variant!("attention", "tiled_large", "attention_tiled_large.wgsl", "main", (64, 1, 1), NONE),
    variant!("attention", "tiled_small", "attention_tiled_small.wgsl", "main", (64, 1, 1), NONE),
    variant!("attention", "decode_subgroup", "attention_decode_subgroup.wgsl", "main", (64, 1, 1), SUBGROUPS),
    variant!(
        "attention", "decode_chunked_f16kv", "attention_decode_chunked_f16kv.wgsl", "main",
        (64, 1, 1), F16,
    ),
    variant!(
        "attention", "decode_streaming_f16kv", "attention_decode_streaming_f16kv.wgsl", "main",
        (64, 1, 1), F16,
    ),
    variant!("attention", "streaming", "attention_streaming.wgsl", "main", (64, 1, 1), NONE),
    // --- rmsnorm ---
    variant!("rmsnorm", "default", "rmsnorm.wgsl", "main", (256, 1, 1), NONE),
    variant!("rmsnorm", "default_f16", "rmsnorm_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("rmsnorm", "small", "rmsnorm_small.wgsl", "main", (64, 1, 1), NONE),
    variant!("rmsnorm", "small_f16", "rmsnorm_small_f16.wgsl", "main", (64, 1, 1), F16),
    variant!("rmsnorm", "subgroup", "rmsnorm_subgroup.wgsl", "main", (256, 1, 1), SUBGROUPS),
    variant!("rmsnorm", "subgroup_f16", "rmsnorm_subgroup_f16.wgsl", "main", (256, 1, 1), SUBGROUPS_F16),
    variant!("rmsnorm", "residual", "rmsnorm_residual.wgsl", "main", (256, 1, 1), NONE),
    variant!("rmsnorm", "residual_f16", "rmsnorm_residual_f16.wgsl", "main", (256, 1, 1), F16),
    // --- softmax ---
    variant!("softmax", "default", "softmax.wgsl", "main", (256, 1, 1), NONE),
    variant!("softmax", "default_f16", "softmax_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("softmax", "small", "softmax_small.wgsl", "main", (64, 1, 1), NONE),
    variant!("softmax", "small_f16", "softmax_small_f16.wgsl", "main", (64, 1, 1), F16),
    variant!("softmax", "subgroup", "softmax_subgroup.wgsl", "main", (256, 1, 1), SUBGROUPS),
    variant!("softmax", "subgroup_f16", "softmax_subgroup_f16.wgsl", "main", (256, 1, 1), SUBGROUPS_F16),
    // --- silu / gelu ---
    variant!("silu", "plain", "silu.wgsl", "main", (256, 1, 1), NONE),
    variant!("silu", "plain_f16", "silu_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("silu", "gated", "silu_gated.wgsl", "main", (256, 1, 1), NONE),
    variant!("silu", "gated_f16", "silu_gated_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("silu", "vec4", "silu_vec4.wgsl", "main", (256, 1, 1), NONE),
    variant!("silu", "vec4_f16", "silu_vec4_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("gelu", "plain", "gelu.wgsl", "main", (256, 1, 1), NONE),
    variant!("gelu", "plain_f16", "gelu_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("gelu", "gated", "gelu_gated.wgsl", "main", (256, 1, 1), NONE),
    variant!("gelu", "gated_f16", "gelu_gated_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("gelu", "vec4", "gelu_vec4.wgsl", "main", (256, 1, 1), NONE),
    variant!("gelu", "vec4_f16", "gelu_vec4_f16.wgsl", "main", (256, 1, 1), F16),
    // --- gather ---
    variant!("gather", "plain", "gather.wgsl", "main", (256, 1, 1), NONE),
    variant!("gather", "plain_f16", "gather_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("gather", "vec4", "gather_vec4.wgsl", "main", (256, 1, 1), NONE),
    variant!("gather", "vec4_f16", "gather_vec4_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("gather", "rowsplit", "gather_rowsplit.wgsl", "main", (256, 1, 1), NONE),
    variant!("gather", "rowsplit_f16", "gather_rowsplit_f16.wgsl", "main", (256, 1, 1), F16),
    // --- residual ---
    variant!("residual", "plain", "residual.wgsl", "main", (256, 1, 1), NONE),
    variant!("residual", "plain_f16", "residual_f16.wgsl", "main", (256, 1, 1), F16),
    // --- bias_add ---
    variant!("bias_add", "plain", "bias_add.wgsl", "main", (256, 1, 1), NONE),
    variant!("bias_add", "plain_f16", "bias_add_f16.wgsl", "main", (256, 1, 1), F16),
    // --- dequant ---
    variant!("dequant", "subgroup", "dequant_subgroup.wgsl", "main", (256, 1, 1), SUBGROUPS),
    variant!("dequant", "subgroup_vec4", "dequant_subgroup_vec4.wgsl", "main", (256, 1, 1), SUBGROUPS),
    variant!("dequant", "subgroup_f16out", "dequant_subgroup_f16out.wgsl", "main", (256, 1, 1), SUBGROUPS_F16),
    variant!(
        "dequant", "subgroup_vec4_f16out", "dequant_subgroup_vec4_f16out.wgsl", "main",
        (256, 1, 1), SUBGROUPS_F16,
    ),
    variant!("dequant", "shared", "dequant_shared.wgsl", "main", (256, 1, 1), NONE),
    variant!("dequant", "shared_vec4", "dequant_shared_vec4.wgsl", "main", (256, 1, 1), NONE),
    variant!("dequant", "shared_f16out", "dequant_shared_f16out.wgsl", "main", (256, 1, 1), F16),
    variant!("dequant", "shared_vec4_f16out", "dequant_shared_vec4_f16out.wgsl", "main", (256, 1, 1), F16),
    // --- rope ---
    variant!("rope", "default", "rope.wgsl", "main", (256, 1, 1), NONE),
    variant!("rope", "default_f16", "rope_f16.wgsl", "main", (256, 1, 1), F16),
    // --- topk / scatter_add (MoE routing) ---
    variant!("topk", "default", "topk.wgsl", "main", (256, 1, 1), NONE),
    variant!("scatter_add", "default", "scatter_add.wgsl", "main", (256, 1, 1), NONE),
    // --- sample ---
    variant!("sample", "default", "sample.wgsl", "main", (256, 1, 1), NONE),
    variant!("sample", "argmax", "sample_argmax.wgsl", "main", (256, 1, 1), NONE),
    // --- cast ---
    variant!("cast", "bf16_to_f32", "cast_bf16_to_f32.wgsl", "main", (256, 1, 1), NONE),
    variant!("cast", "bf16_to_f16", "cast_bf16_to_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("cast", "f32_to_f16", "cast_f32_to_f16.wgsl", "main", (256, 1, 1), F16),
    variant!("cast", "f16_to_f32", "cast_f16_to_f32.wgsl", "main", (256, 1, 1), F16),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_pair_is_unique() {
        let mut seen = std::collections::HashSet::new();
        for v in KERNEL_VARIANTS {
            assert!(
                seen.insert((v.operation, v.variant)),
                "duplicate variant {}:{}",
                v.operation,
                v.variant
            );
        }
    }

    #[test]
    fn f16_suffixed_variants_require_f16_feature() {
        for v in KERNEL_VARIANTS {
            if v.variant.ends_with("_f16")
                || v.variant.ends_with("_f16kv")
                || v.variant.ends_with("f16out")
                || v.variant == "f16"
                || v.variant == "f16_vec4"
                || v.variant == "f16w_f32a"
            {
                assert!(
                    v.requires.contains(&"f16"),
                    "{}:{} looks f16-flavored but doesn't require the f16 feature",
                    v.operation,
                    v.variant
                );
            }
        }
    }
}
