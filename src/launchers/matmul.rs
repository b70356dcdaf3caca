//! Matmul launcher (§4.9). Covers dense f32/f16 matmul, GEMV decode, and the
//! Q4_K-fused variants whose output lands on binding 4 instead of 3.

use std::sync::Arc;

use crate::constants::Q4K_BLOCK_ELEMENTS;
use crate::error::{KernelError, KernelResult};
use crate::gpu::{infer_output_dtype, DType, Tensor};
use crate::launchers::{self, BindingKind, DispatchRequest, KernelBinding};
use crate::recorder::CommandRecorder;
use crate::registry;
use crate::selector::matmul::{select_matmul, MatmulSelectionInput};
use crate::uniforms::MatmulUniform;
use crate::Engine;

pub struct MatmulLaunchInput {
    pub a: Tensor,
    pub b: Tensor,
    /// Q4_K scale/min block table, required only for the fused variants.
    pub q4k_scales: Option<Tensor>,
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub alpha: f32,
    pub vec4_requested: bool,
    pub fused_q4k_disabled: bool,
    /// Role used to look up a kernel-path override (e.g. `"qkv_proj"`).
    pub role: &'static str,
    pub layer_idx: Option<usize>,
}

/// §4.9 dispatch geometry. Multicol and batched q4k variants size their
/// workgroup count from the variant's own `metadata` table rather than its
/// thread-group shape: a `colsPerWg`-wide variant needs one workgroup per
/// `colsPerWg` output columns, not one per `workgroup_size.0` columns.
fn workgroups_for(
    variant_name: &str,
    workgroup_size: (u32, u32, u32),
    metadata: &[(&str, u32)],
    m: u32,
    n: u32,
) -> (u32, u32, u32) {
    let meta = |key: &str| metadata.iter().find(|entry| entry.0 == key).map(|entry| entry.1);

    if variant_name.contains("multicol") {
        let cols_per_wg = meta("colsPerWg").unwrap_or(1);
        (launchers::ceil_div(n, cols_per_wg), 1, 1)
    } else if variant_name.starts_with("q4_fused_batched") {
        let tile_m = meta("tileM").unwrap_or(workgroup_size.1);
        (n, launchers::ceil_div(m, tile_m), 1)
    } else if variant_name.starts_with("gemv") {
        (launchers::ceil_div(n, workgroup_size.0), 1, 1)
    } else {
        (launchers::ceil_div(n, workgroup_size.0), launchers::ceil_div(m, workgroup_size.1), 1)
    }
}

pub fn record_matmul(
    engine: &Engine,
    recorder: &CommandRecorder,
    input: MatmulLaunchInput,
) -> KernelResult<Tensor> {
    let resources = engine.resources()?;
    let capability = &resources.capability;

    if input.m == 0 || input.n == 0 || input.k == 0 {
        return Err(KernelError::InvalidDimensions {
            op: "matmul".to_string(),
            reason: format!("m={}, n={}, k={} must all be positive", input.m, input.n, input.k),
        });
    }

    let want_f16_output = infer_output_dtype(input.a.dtype, input.b.dtype) == DType::F16;
    let override_variant = engine.kernel_path().override_for(
        crate::kernel_path::Phase::Decode,
        "matmul",
        input.role,
        input.layer_idx,
    );
    let selection = select_matmul(
        MatmulSelectionInput {
            m: input.m,
            n: input.n,
            a_dtype: input.a.dtype,
            b_dtype: input.b.dtype,
            want_f16_output,
            vec4_requested: input.vec4_requested,
            fused_q4k_disabled: input.fused_q4k_disabled,
            strict: engine.kernel_path().is_strict(),
        },
        capability,
        override_variant.as_deref(),
    )?;

    let variant = registry::lookup("matmul", &selection)?;
    let output_dtype = if want_f16_output { DType::F16 } else { DType::F32 };
    let output_bytes = input.m as u64 * input.n as u64 * output_dtype.dtype_bytes() as u64;
    let output_buffer = resources.buffers.acquire(
        output_bytes,
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        "matmul-output",
    )?;

    let output_binding: u32 = variant
        .metadata
        .iter()
        .find(|entry| entry.0 == "outputBinding")
        .map(|entry| entry.1)
        .unwrap_or(3);

    let workgroups_total = workgroups_for(&selection, variant.workgroup_size, variant.metadata, input.m, input.n);
    let workgroups = launchers::wrap_workgroups_1d("matmul", workgroups_total.0 as u64)
        .map(|(x, _, _)| (x, workgroups_total.1, workgroups_total.2))?;

    // `aux0` is `numBlocksPerRow` for q4k-fused variants; no transpose-B path
    // exists on this launcher yet, so non-fused variants pass 0.
    let aux0 = if selection.starts_with("q4_fused") {
        launchers::ceil_div(input.k, Q4K_BLOCK_ELEMENTS)
    } else {
        0
    };

    let uniform = MatmulUniform {
        m: input.m,
        n: input.n,
        k: input.k,
        alpha: input.alpha,
        aux0,
        uniform_workgroups_x: workgroups.0,
        _pad0: 0,
        _pad1: 0,
    };

    let mut bindings = vec![
        KernelBinding { binding: 1, buffer: &input.a.buffer, kind: BindingKind::StorageRead },
        KernelBinding { binding: 2, buffer: &input.b.buffer, kind: BindingKind::StorageRead },
    ];
    if output_binding == 4 {
        let scales = input.q4k_scales.as_ref().ok_or_else(|| KernelError::InvalidDimensions {
            op: "matmul".to_string(),
            reason: format!("variant `{selection}` requires a Q4_K scale table"),
        })?;
        bindings.push(KernelBinding { binding: 3, buffer: &scales.buffer, kind: BindingKind::StorageRead });
    }
    bindings.push(KernelBinding { binding: output_binding, buffer: &output_buffer.buffer, kind: BindingKind::StorageReadWrite });

    launchers::dispatch(
        &resources,
        recorder,
        DispatchRequest {
            operation: "matmul",
            variant: &selection,
            label: "matmul",
            uniform_bytes: bytemuck::bytes_of(&uniform),
            bindings: &bindings,
            workgroups,
        },
    )?;

    Tensor::new(Arc::clone(&output_buffer.buffer), output_dtype, [input.m as u64, input.n as u64], "matmul-output")
}

pub fn run_matmul(engine: &Engine, input: MatmulLaunchInput) -> KernelResult<Tensor> {
    let recorder = engine.recorder(false)?;
    let output = record_matmul(engine, &recorder, input)?;
    recorder.submit_and_wait()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_workgroups_tile_both_axes() {
        assert_eq!(workgroups_for("f32", (16, 16, 1), &[], 33, 33), (3, 3, 1));
    }

    #[test]
    fn gemv_workgroups_cover_only_n() {
        assert_eq!(workgroups_for("gemv", (256, 1, 1), &[], 1, 4096), (16, 1, 1));
    }

    #[test]
    fn multicol_workgroups_divide_by_cols_per_wg_not_workgroup_size() {
        let meta: &[(&str, u32)] = &[("colsPerWg", 4), ("outputBinding", 3)];
        assert_eq!(workgroups_for("q4_fused_multicol", (256, 1, 1), meta, 1, 4096), (1024, 1, 1));
    }

    #[test]
    fn q4_fused_batched_spans_n_directly_and_tiles_m_by_metadata() {
        let meta: &[(&str, u32)] = &[("tileM", 8), ("outputBinding", 3)];
        assert_eq!(workgroups_for("q4_fused_batched_f16", (16, 16, 1), meta, 17, 16), (16, 3, 1));
    }

    #[test]
    fn aux0_matches_num_blocks_per_row_for_q4k_fused_variants() {
        assert_eq!(launchers::ceil_div(4096, Q4K_BLOCK_ELEMENTS), 16);
    }
}
