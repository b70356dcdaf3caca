//! Micro-benchmarks over the pure-Rust dispatch-geometry and variant-
//! selection math: workgroup folding, the auto-tuner's candidate
//! generation, and the matmul/softmax selector heuristics. None of these
//! touch a GPU, so this bench runs without a live adapter.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use wgpu_kernel_core::launchers::{ceil_div, wrap_workgroups_1d};
use wgpu_kernel_core::selector::matmul::{select_matmul, MatmulSelectionInput};
use wgpu_kernel_core::selector::softmax::{select_softmax, SoftmaxSelectionInput};
use wgpu_kernel_core::tuner::candidates_for;
use wgpu_kernel_core::{Capability, DType};

fn capability(features: Vec<&'static str>) -> Capability {
    Capability {
        adapter_name: "bench-adapter".to_string(),
        vendor: 0x10de,
        device_id: 0,
        backend: wgpu::Backend::Vulkan,
        features,
        limits: wgpu::Limits::default(),
    }
}

fn bench_workgroup_folding(c: &mut Criterion) {
    c.bench_function("wrap_workgroups_1d/small", |b| {
        b.iter(|| wrap_workgroups_1d("matmul", black_box(4096)))
    });
    c.bench_function("wrap_workgroups_1d/overflow", |b| {
        b.iter(|| wrap_workgroups_1d("matmul", black_box(65535u64 * 1000)))
    });
    c.bench_function("ceil_div", |b| b.iter(|| ceil_div(black_box(128_256), black_box(256))));
}

fn bench_tuner_candidates(c: &mut Criterion) {
    let limits = wgpu::Limits::default();
    c.bench_function("candidates_for/1d", |b| b.iter(|| candidates_for(black_box(&limits), false)));
    c.bench_function("candidates_for/2d", |b| b.iter(|| candidates_for(black_box(&limits), true)));
}

fn bench_matmul_selector(c: &mut Criterion) {
    let cap = capability(vec!["subgroups", "f16"]);
    let input = MatmulSelectionInput {
        m: 1,
        n: 4096,
        a_dtype: DType::F32,
        b_dtype: DType::Q4K,
        want_f16_output: true,
        vec4_requested: false,
        fused_q4k_disabled: false,
        strict: false,
    };
    c.bench_function("select_matmul/q4k_fused_decode", |b| {
        b.iter(|| select_matmul(black_box(input), black_box(&cap), None))
    });
}

fn bench_softmax_selector(c: &mut Criterion) {
    let cap = capability(vec!["subgroups"]);
    let input = SoftmaxSelectionInput { inner_size: 8192, input_f16: false, strict: false };
    c.bench_function("select_softmax/large_row", |b| {
        b.iter(|| select_softmax(black_box(input), black_box(&cap), None))
    });
}

criterion_group!(
    benches,
    bench_workgroup_folding,
    bench_tuner_candidates,
    bench_matmul_selector,
    bench_softmax_selector
);
criterion_main!(benches);
