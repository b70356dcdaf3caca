//! Command recorder invariants (C10) against a live device: pass
//! open/close bookkeeping, double-submit rejection, and abort releasing
//! tracked temp buffers back to the pool instead of leaking them.
//!
//! Requires a live adapter, gated on `gpu-tests`.

#![cfg(feature = "gpu-tests")]

use wgpu_kernel_core::{Engine, KernelError, RuntimeConfig};

fn engine() -> Engine {
    let engine = Engine::new(RuntimeConfig::default());
    pollster::block_on(engine.init()).expect("a GPU adapter must be available for gpu-tests");
    engine
}

#[test]
fn begin_compute_pass_twice_without_closing_errors() {
    let engine = engine();
    let recorder = engine.recorder(false).unwrap();
    recorder.begin_compute_pass("first").unwrap();
    assert!(matches!(recorder.begin_compute_pass("second"), Err(KernelError::PassAlreadyOpen)));
}

#[test]
fn begin_then_end_then_begin_again_succeeds() {
    let engine = engine();
    let recorder = engine.recorder(false).unwrap();
    recorder.begin_compute_pass("first").unwrap();
    recorder.end_compute_pass().unwrap();
    assert!(recorder.begin_compute_pass("second").is_ok());
}

#[test]
fn submitting_twice_errors_on_the_second_call() {
    let engine = engine();
    let recorder = engine.recorder(false).unwrap();
    recorder.submit().unwrap();
    assert!(matches!(recorder.submit(), Err(KernelError::DoubleSubmit)));
}

#[test]
fn abort_releases_tracked_temp_buffers_back_to_the_pool() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let recorder = engine.recorder(false).unwrap();

    let before = resources.buffers.pooled_count();
    recorder
        .create_temp_buffer(4096, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST, "scratch")
        .unwrap();
    recorder.abort();

    assert!(resources.buffers.pooled_count() > before, "abort should return the temp buffer to the pool");
}
