//! Buffer pool invariants (C3) against a live device: round-tripping a
//! buffer through acquire/release reuses the underlying `wgpu::Buffer`
//! rather than allocating a fresh one, and a request above the device's
//! storage-binding limit is rejected before it reaches `wgpu`.
//!
//! Requires a live adapter, so this whole file is gated on `gpu-tests`.

#![cfg(feature = "gpu-tests")]

use std::sync::Arc;

use wgpu_kernel_core::{BufferPool, Engine, KernelError, RuntimeConfig};

fn engine() -> Engine {
    let engine = Engine::new(RuntimeConfig::default());
    pollster::block_on(engine.init()).expect("a GPU adapter must be available for gpu-tests");
    engine
}

#[test]
fn released_buffer_is_reused_on_next_acquire_of_the_same_bucket() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let pool: &BufferPool = &resources.buffers;

    let first = pool
        .acquire(4096, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST, "a")
        .unwrap();
    let first_ptr = Arc::as_ptr(&first.buffer);
    pool.release(first);

    let second = pool
        .acquire(4096, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST, "b")
        .unwrap();
    assert_eq!(Arc::as_ptr(&second.buffer), first_ptr, "expected the pooled buffer to be reused");
}

#[test]
fn request_above_storage_binding_limit_is_rejected() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let pool: &BufferPool = &resources.buffers;
    let too_large = resources.capability.limits.max_storage_buffer_binding_size as u64 + 1;

    let result = pool.acquire(too_large, wgpu::BufferUsages::STORAGE, "too-large");
    assert!(matches!(result, Err(KernelError::BufferTooLargeForDevice { .. })));
}

#[test]
fn readback_round_trips_written_bytes() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let pool: &BufferPool = &resources.buffers;

    let payload: [u8; 16] = [7; 16];
    let buffer = pool
        .acquire(16, wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST, "readback")
        .unwrap();
    resources.queue.write_buffer(buffer.buffer(), 0, &payload);
    resources.device.poll(wgpu::Maintain::Wait);

    let read = pool.read_buffer(&buffer, Some(16)).unwrap();
    assert_eq!(&read[..], &payload[..]);
}
