//! Uniform cache invariants (C4) against a live device: identical uniform
//! bytes resolve to the same GPU buffer, and distinct bytes never collide.
//!
//! Requires a live adapter, gated on `gpu-tests`.

#![cfg(feature = "gpu-tests")]

use std::sync::Arc;

use wgpu_kernel_core::{Engine, RuntimeConfig, UniformCache};

fn engine() -> Engine {
    let engine = Engine::new(RuntimeConfig::default());
    pollster::block_on(engine.init()).expect("a GPU adapter must be available for gpu-tests");
    engine
}

#[test]
fn identical_bytes_hit_the_same_cached_buffer() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let cache: &UniformCache = &resources.uniforms;

    let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let a = cache.get_or_create(&bytes, "uniform-a").unwrap();
    let b = cache.get_or_create(&bytes, "uniform-b").unwrap();
    assert_eq!(Arc::as_ptr(&a), Arc::as_ptr(&b));
    assert_eq!(cache.len(), 1);
}

#[test]
fn distinct_bytes_never_collide() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let cache: &UniformCache = &resources.uniforms;

    let a = cache.get_or_create(&[1, 2, 3, 4], "a").unwrap();
    let b = cache.get_or_create(&[1, 2, 3, 5], "b").unwrap();
    assert_ne!(Arc::as_ptr(&a), Arc::as_ptr(&b));
    assert_eq!(cache.len(), 2);
}

#[test]
fn clear_flushes_every_entry() {
    let engine = engine();
    let resources = engine.resources().unwrap();
    let cache: &UniformCache = &resources.uniforms;

    cache.get_or_create(&[9, 9, 9, 9], "to-clear").unwrap();
    assert!(!cache.is_empty());
    cache.clear();
    assert!(cache.is_empty());
}
