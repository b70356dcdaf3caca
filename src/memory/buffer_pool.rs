//! Bucketed GPU buffer allocator with deferred destruction.
//!
//! Grounded in the teacher's `memory::memory_pool::MemoryPool` (handle +
//! `Mutex<Vec<_>>` bucket registry, `PoolHandle` abstraction), adapted from
//! earth-engine's sub-allocate-within-one-big-buffer strategy to whole
//! buffers per size bucket, since the dispatch core hands raw buffers
//! straight to bind groups rather than suballocating byte ranges.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::BufferPoolConfig;
use crate::constants::BUFFER_OFFSET_ALIGNMENT;
use crate::error::{KernelError, KernelResult};
use crate::perf::PerfGuard;

/// Tags a buffer with the convenience role it was acquired for, purely for
/// logging; the underlying usage flags are what wgpu actually enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsageKind {
    Storage,
    Staging,
    Upload,
    Uniform,
    Indirect,
}

/// A buffer checked out of the pool. Holds the bucketed size (which may be
/// larger than what was requested) so `release` can file it back into the
/// correct bucket.
#[derive(Clone)]
pub struct PooledBuffer {
    id: u64,
    pub buffer: Arc<wgpu::Buffer>,
    pub bucket_size: u64,
    pub requested_size: u64,
    pub usage: wgpu::BufferUsages,
}

impl PooledBuffer {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[derive(Debug, Clone, Copy)]
struct AllocationRecord {
    bucket_size: u64,
    acquired_at: Instant,
}

#[derive(Debug, Clone)]
pub struct LeakReport {
    pub id: u64,
    pub bucket_size: u64,
    pub age_secs: u64,
}

pub struct BufferPool {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    guard: Arc<PerfGuard>,
    config: BufferPoolConfig,
    max_buffer_size: u64,
    max_storage_binding_size: u64,
    buckets: Mutex<FxHashMap<(u64, u32), VecDeque<Arc<wgpu::Buffer>>>>,
    active: Mutex<FxHashMap<u64, AllocationRecord>>,
    pending_destruction: Mutex<Vec<Arc<wgpu::Buffer>>>,
    destruction_scheduled: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl BufferPool {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        guard: Arc<PerfGuard>,
        config: BufferPoolConfig,
        limits: &wgpu::Limits,
    ) -> Self {
        Self {
            device,
            queue,
            guard,
            config,
            max_buffer_size: limits.max_buffer_size,
            max_storage_binding_size: limits.max_storage_buffer_binding_size as u64,
            buckets: Mutex::new(FxHashMap::default()),
            active: Mutex::new(FxHashMap::default()),
            pending_destruction: Mutex::new(Vec::new()),
            destruction_scheduled: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Computes the bucket a request of `size` bytes falls into: aligned up
    /// to `raw_alignment`, then rounded to the next power of two below
    /// `large_threshold`, else to the next multiple of `coarse_step`.
    pub fn bucket_size(&self, size: u64) -> u64 {
        compute_bucket_size(size, &self.config)
    }

    /// Acquires a buffer of at least `size` bytes with `usage`, reusing a
    /// pooled buffer from the matching bucket when one is available.
    pub fn acquire(
        &self,
        size: u64,
        usage: wgpu::BufferUsages,
        label: &str,
    ) -> KernelResult<PooledBuffer> {
        let bucket_size = self.bucket_size(size);

        if bucket_size > self.max_buffer_size {
            return Err(KernelError::BufferTooLargeForDevice {
                requested: bucket_size,
                limit: self.max_buffer_size,
            });
        }
        if usage.contains(wgpu::BufferUsages::STORAGE) && bucket_size > self.max_storage_binding_size
        {
            return Err(KernelError::BufferTooLargeForDevice {
                requested: bucket_size,
                limit: self.max_storage_binding_size,
            });
        }

        let key = (bucket_size, usage.bits());
        let buffer = {
            let mut buckets = self.buckets.lock();
            buckets.get_mut(&key).and_then(VecDeque::pop_front)
        };

        let buffer = match buffer {
            Some(buffer) => buffer,
            None => Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: bucket_size,
                usage,
                mapped_at_creation: false,
            })),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.config.leak_detection {
            self.active.lock().insert(
                id,
                AllocationRecord {
                    bucket_size,
                    acquired_at: Instant::now(),
                },
            );
        }
        self.guard.note_allocation(bucket_size, label);

        Ok(PooledBuffer {
            id,
            buffer,
            bucket_size,
            requested_size: size,
            usage,
        })
    }

    pub fn create_staging_buffer(&self, size: u64, label: &str) -> KernelResult<PooledBuffer> {
        self.acquire(
            size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            label,
        )
    }

    pub fn create_upload_buffer(&self, size: u64, label: &str) -> KernelResult<PooledBuffer> {
        self.acquire(
            size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            label,
        )
    }

    pub fn create_uniform_buffer(&self, size: u64, label: &str) -> KernelResult<PooledBuffer> {
        self.acquire(
            size,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            label,
        )
    }

    /// Returns a checked-out buffer to the pool, or defers its destruction
    /// when pooling is disabled or the relevant caps are already full.
    pub fn release(&self, handle: PooledBuffer) {
        if self.config.leak_detection {
            self.active.lock().remove(&handle.id);
        }

        if !self.config.enable_pooling {
            self.defer_destroy(handle.buffer);
            return;
        }

        let key = (handle.bucket_size, handle.usage.bits());
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_default();
        let total_pooled: usize = buckets.values().map(VecDeque::len).sum();

        if bucket.len() >= self.config.max_per_bucket || total_pooled >= self.config.max_total {
            drop(buckets);
            self.defer_destroy(handle.buffer);
        } else {
            bucket.push_back(handle.buffer);
        }
    }

    fn defer_destroy(&self, buffer: Arc<wgpu::Buffer>) {
        self.pending_destruction.lock().push(buffer);
        if self
            .destruction_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let scheduled = self.destruction_scheduled.clone();
            self.queue.on_submitted_work_done(Box::new(move || {
                scheduled.store(false, Ordering::Release);
            }));
        }
    }

    /// Drains and destroys buffers queued by `defer_destroy`. Called by the
    /// command recorder's own `onSubmittedWorkDone` continuation, since
    /// that's the only point a destroy is provably safe (no in-flight
    /// command buffer can still reference the buffer).
    pub fn flush_pending_destruction(&self) {
        let pending: Vec<_> = std::mem::take(&mut *self.pending_destruction.lock());
        for buffer in pending {
            if let Ok(buffer) = Arc::try_unwrap(buffer) {
                buffer.destroy();
            }
        }
    }

    /// Guarded GPU-to-CPU readback: copies `size` bytes (or the whole
    /// buffer when `size` is `None`) through a staging buffer and maps it.
    pub fn read_buffer(&self, buffer: &PooledBuffer, size: Option<u64>) -> KernelResult<Vec<u8>> {
        self.guard.allow_readback("BufferPool::read_buffer")?;

        let read_size = size.unwrap_or(buffer.requested_size);
        if read_size > buffer.bucket_size {
            return Err(KernelError::BufferTooSmall {
                required: read_size,
                actual: buffer.bucket_size,
            });
        }

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("buffer-pool-readback-staging"),
            size: read_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("buffer-pool-readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, read_size);
        self.guard.note_submit();
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = crossbeam_channel::bounded(1);
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = staging.slice(..).get_mapped_range().to_vec();
                staging.unmap();
                Ok(data)
            }
            Ok(Err(err)) => Err(KernelError::Context {
                context: "BufferPool::read_buffer".to_string(),
                message: err.to_string(),
            }),
            Err(_) => Err(KernelError::Context {
                context: "BufferPool::read_buffer".to_string(),
                message: "map_async callback channel disconnected".to_string(),
            }),
        }
    }

    /// Returns allocations held longer than `leak_threshold_secs`. A no-op
    /// list when `leak_detection` is off.
    pub fn detect_leaks(&self) -> Vec<LeakReport> {
        if !self.config.leak_detection {
            return Vec::new();
        }
        let now = Instant::now();
        let threshold = self.config.leak_threshold_secs;
        let leaks: Vec<LeakReport> = self
            .active
            .lock()
            .iter()
            .filter_map(|(id, record)| {
                let age = now.duration_since(record.acquired_at).as_secs();
                (age >= threshold).then_some(LeakReport {
                    id: *id,
                    bucket_size: record.bucket_size,
                    age_secs: age,
                })
            })
            .collect();
        if !leaks.is_empty() {
            warn!("[BufferPool] {} allocation(s) older than {}s", leaks.len(), threshold);
        }
        leaks
    }

    pub fn pooled_count(&self) -> usize {
        self.buckets.lock().values().map(VecDeque::len).sum()
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);
    (value + alignment - 1) / alignment * alignment
}

fn compute_bucket_size(size: u64, config: &BufferPoolConfig) -> u64 {
    let aligned = align_up(size.max(1), config.raw_alignment);
    if aligned <= config.large_threshold {
        aligned.next_power_of_two()
    } else {
        align_up(aligned, config.coarse_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(1, BUFFER_OFFSET_ALIGNMENT), BUFFER_OFFSET_ALIGNMENT);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn bucket_size_is_power_of_two_below_large_threshold() {
        let config = BufferPoolConfig::default();
        assert_eq!(compute_bucket_size(100, &config), 256);
        assert_eq!(compute_bucket_size(300, &config), 512);
        assert_eq!(compute_bucket_size(4096, &config), 4096);
    }

    #[test]
    fn bucket_size_uses_coarse_step_above_large_threshold() {
        let config = BufferPoolConfig::default();
        let above = config.large_threshold + 1;
        let bucketed = compute_bucket_size(above, &config);
        assert_eq!(bucketed % config.coarse_step, 0);
        assert!(bucketed >= above);
    }
}
