//! Cross-module invariants between the variant registry (C6) and the
//! per-operation selectors (C8): every variant a selector can name must
//! actually be registered, and every selector's heuristic output must
//! satisfy the capability it was given. Pure Rust, no GPU required.

use wgpu_kernel_core::registry;

fn capability(features: Vec<&'static str>) -> wgpu_kernel_core::Capability {
    wgpu_kernel_core::Capability {
        adapter_name: "test-adapter".to_string(),
        vendor: 0x10de,
        device_id: 0,
        backend: wgpu::Backend::Vulkan,
        features,
        limits: wgpu::Limits::default(),
    }
}

#[test]
fn every_registered_variant_has_shader_source() {
    for variant in registry::KERNEL_VARIANTS {
        // source_for panics on an unknown operation; reaching this line for
        // every registered variant without panicking is the assertion.
        let _ = wgpu_kernel_core::shaders::source_for(variant.operation);
    }
}

#[test]
fn matmul_selector_never_picks_a_variant_missing_from_the_registry() {
    use wgpu_kernel_core::selector::matmul::{select_matmul, MatmulSelectionInput};
    use wgpu_kernel_core::DType;

    let cases = [
        (vec![], DType::F32, DType::F16, 1u32, 4096u32),
        (vec!["subgroups"], DType::F32, DType::F16, 1, 4096),
        (vec!["f16"], DType::F16, DType::F16, 8, 64),
        (vec!["subgroups", "f16"], DType::F32, DType::Q4K, 8, 4096),
    ];

    for (features, a_dtype, b_dtype, m, n) in cases {
        let cap = capability(features);
        let input = MatmulSelectionInput {
            m,
            n,
            a_dtype,
            b_dtype,
            want_f16_output: false,
            vec4_requested: false,
            fused_q4k_disabled: false,
            strict: false,
        };
        let picked = select_matmul(input, &cap, None).expect("heuristic must find a valid variant");
        assert!(
            registry::contains("matmul", &picked),
            "selector picked unregistered variant matmul:{picked}"
        );
        let variant = registry::lookup("matmul", &picked).unwrap();
        for feature in variant.requires {
            assert!(cap.has_feature(feature), "picked {picked} but capability lacks {feature}");
        }
    }
}

#[test]
fn softmax_and_rmsnorm_selectors_respect_the_small_kernel_threshold() {
    use wgpu_kernel_core::selector::rmsnorm::{select_rmsnorm, RmsNormSelectionInput};
    use wgpu_kernel_core::selector::softmax::{select_softmax, SoftmaxSelectionInput};

    let cap = capability(vec![]);

    let small = select_softmax(
        SoftmaxSelectionInput { inner_size: 32, input_f16: false, strict: false },
        &cap,
        None,
    )
    .unwrap();
    assert!(small.contains("small"), "expected a small-tier softmax variant, got {small}");

    let large = select_softmax(
        SoftmaxSelectionInput { inner_size: 8192, input_f16: false, strict: false },
        &cap,
        None,
    )
    .unwrap();
    assert!(!large.contains("small"), "expected a non-small softmax variant, got {large}");

    let small_norm = select_rmsnorm(
        RmsNormSelectionInput {
            hidden_size: 32,
            has_residual: false,
            input_f16: false,
            residual_f16: None,
            strict: false,
        },
        &cap,
        None,
    )
    .unwrap();
    assert!(small_norm.contains("small"), "expected a small-tier rmsnorm variant, got {small_norm}");
}

#[test]
fn strict_override_to_an_unsatisfiable_variant_errors_instead_of_falling_back() {
    use wgpu_kernel_core::selector::matmul::{select_matmul, MatmulSelectionInput};
    use wgpu_kernel_core::DType;

    let cap = capability(vec![]); // no subgroups, no f16
    let input = MatmulSelectionInput {
        m: 1,
        n: 512,
        a_dtype: DType::F32,
        b_dtype: DType::F16,
        want_f16_output: false,
        vec4_requested: false,
        fused_q4k_disabled: false,
        strict: true,
    };
    let result = select_matmul(input, &cap, Some("gemv_subgroup_multicol"));
    assert!(result.is_err(), "strict override missing required features should error, not fall back");
}

#[test]
fn non_strict_override_to_an_unsatisfiable_variant_falls_back_to_heuristics() {
    use wgpu_kernel_core::selector::matmul::{select_matmul, MatmulSelectionInput};
    use wgpu_kernel_core::DType;

    let cap = capability(vec![]);
    let input = MatmulSelectionInput {
        m: 1,
        n: 512,
        a_dtype: DType::F32,
        b_dtype: DType::F16,
        want_f16_output: false,
        vec4_requested: false,
        fused_q4k_disabled: false,
        strict: false,
    };
    let picked = select_matmul(input, &cap, Some("gemv_subgroup_multicol")).unwrap();
    assert_eq!(picked, "gemv", "should fall back to the no-feature-required gemv variant");
}

#[test]
fn dispatch_geometry_fold_agrees_with_registered_workgroup_size() {
    // A decode-shaped dispatch (batch 1, vocab-sized N) must still resolve
    // to workgroup counts wgpu will accept for the picked variant's shape.
    use wgpu_kernel_core::launchers::{ceil_div, wrap_workgroups_1d};

    let vocab = 128_256u32;
    let variant = registry::lookup("sample", "default").unwrap();
    let groups = ceil_div(vocab, variant.workgroup_size.0);
    let (x, y, z) = wrap_workgroups_1d("sample", groups as u64).unwrap();
    assert!(x <= 65535 && y <= 65535 && z == 1);
    assert!((x as u64) * (y as u64) * (variant.workgroup_size.0 as u64) >= vocab as u64);
}
