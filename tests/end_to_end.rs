//! End-to-end dispatch scenario (§8): acquire a device, upload a small
//! tensor, run it through a real launcher, read the result back, and check
//! the numbers against a CPU reference. Exercises the full path — selector,
//! registry, pipeline cache, uniform cache, buffer pool, command recorder —
//! in one pass rather than each module in isolation.
//!
//! Requires a live adapter, gated on `gpu-tests`.

#![cfg(feature = "gpu-tests")]

use wgpu_kernel_core::launchers::softmax::{run_softmax, SoftmaxLaunchInput};
use wgpu_kernel_core::{DType, Engine, RuntimeConfig, Tensor};

fn engine() -> Engine {
    let engine = Engine::new(RuntimeConfig::default());
    pollster::block_on(engine.init()).expect("a GPU adapter must be available for gpu-tests");
    engine
}

fn cpu_softmax(row: &[f32], temperature: f32) -> Vec<f32> {
    let scaled: Vec<f32> = row.iter().map(|&x| x / temperature).collect();
    let max = scaled.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scaled.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

#[test]
fn softmax_dispatch_matches_cpu_reference() {
    let engine = engine();
    let resources = engine.resources().unwrap();

    let row: [f32; 8] = [1.0, 2.0, 3.0, 0.5, -1.0, 4.0, 2.5, 0.0];
    let bytes: &[u8] = bytemuck::cast_slice(&row);

    let input_buffer = resources
        .buffers
        .acquire(
            bytes.len() as u64,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            "softmax-input",
        )
        .unwrap();
    resources.queue.write_buffer(input_buffer.buffer(), 0, bytes);
    resources.device.poll(wgpu::Maintain::Wait);

    let input = Tensor::new(input_buffer.buffer.clone(), DType::F32, [1u64, row.len() as u64], "softmax-input")
        .unwrap();

    let output = run_softmax(
        &engine,
        SoftmaxLaunchInput {
            input,
            inner_size: row.len() as u32,
            outer_size: 1,
            temperature: 1.0,
            layer_idx: None,
        },
    )
    .unwrap();

    let read_size = output.byte_len();
    let staging = resources.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("softmax-readback-staging"),
        size: read_size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = resources
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("softmax-readback-encoder") });
    encoder.copy_buffer_to_buffer(&output.buffer, 0, &staging, 0, read_size);
    resources.queue.submit(Some(encoder.finish()));

    let (sender, receiver) = crossbeam_channel::bounded(1);
    staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    resources.device.poll(wgpu::Maintain::Wait);
    receiver.recv().unwrap().unwrap();

    let raw = staging.slice(..).get_mapped_range().to_vec();
    staging.unmap();
    let got: &[f32] = bytemuck::cast_slice(&raw);

    let expected = cpu_softmax(&row, 1.0);
    for (g, e) in got.iter().zip(expected.iter()) {
        assert!((g - e).abs() < 1e-4, "got {g}, expected {e}");
    }
}
