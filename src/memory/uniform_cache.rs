//! Content-addressed cache for small immutable uniform buffers.
//!
//! Keyed by an FNV-1a hash of the uniform bytes, mirroring the teacher's
//! fondness for cheap non-cryptographic hashing in hot lookup tables
//! (`rustc-hash` everywhere else in this crate is the same instinct).

use std::sync::Arc;
use std::time::Instant;

use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::config::UniformCacheConfig;
use crate::error::KernelResult;

fn fnv1a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

struct Entry {
    buffer: Arc<wgpu::Buffer>,
    last_used: Instant,
    ref_count: u32,
}

/// One process-wide instance, shared by every launcher that writes a
/// uniform struct before a dispatch.
pub struct UniformCache {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: UniformCacheConfig,
    entries: Mutex<FxHashMap<u32, Entry>>,
    pending_destruction: Mutex<Vec<Arc<wgpu::Buffer>>>,
}

impl UniformCache {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, config: UniformCacheConfig) -> Self {
        Self {
            device,
            queue,
            config,
            entries: Mutex::new(FxHashMap::default()),
            pending_destruction: Mutex::new(Vec::new()),
        }
    }

    /// Returns a cached buffer for `bytes`, creating and inserting one on a
    /// miss. Bumps `last_used`/`ref_count` on a hit.
    pub fn get_or_create(&self, bytes: &[u8], label: &str) -> KernelResult<Arc<wgpu::Buffer>> {
        let key = fnv1a(bytes);
        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&key) {
                entry.last_used = Instant::now();
                entry.ref_count += 1;
                return Ok(entry.buffer.clone());
            }
        }

        self.evict_stale();
        self.evict_to_capacity();

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue.write_buffer(&buffer, 0, bytes);
        let buffer = Arc::new(buffer);

        self.entries.lock().insert(
            key,
            Entry {
                buffer: buffer.clone(),
                last_used: Instant::now(),
                ref_count: 1,
            },
        );

        Ok(buffer)
    }

    /// Evicts entries older than `maxAgeMs`, queueing their buffers for
    /// deferred destruction.
    pub fn evict_stale(&self) {
        let max_age = std::time::Duration::from_millis(self.config.max_age_ms);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let stale_keys: Vec<u32> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) > max_age)
            .map(|(key, _)| *key)
            .collect();

        if stale_keys.is_empty() {
            return;
        }
        let mut pending = self.pending_destruction.lock();
        for key in stale_keys {
            if let Some(entry) = entries.remove(&key) {
                pending.push(entry.buffer);
            }
        }
    }

    /// Evicts down to `maxEntries - 1` when at capacity, preferring
    /// `refCount == 0` entries with the lowest `lastUsedMono`, falling back
    /// to plain LRU across all entries when every entry is still
    /// referenced.
    fn evict_to_capacity(&self) {
        let mut entries = self.entries.lock();
        if entries.len() < self.config.max_entries {
            return;
        }

        let victim_key = entries
            .iter()
            .filter(|(_, entry)| entry.ref_count == 0)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| *key)
            .or_else(|| {
                entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| *key)
            });

        if let Some(key) = victim_key {
            if let Some(entry) = entries.remove(&key) {
                self.pending_destruction.lock().push(entry.buffer);
            }
        }
    }

    /// Releases a caller's hold on a cached buffer so it becomes eligible
    /// for eviction again. Launchers call this instead of destroying the
    /// buffer directly.
    pub fn release(&self, bytes: &[u8]) {
        let key = fnv1a(bytes);
        if let Some(entry) = self.entries.lock().get_mut(&key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }

    /// Flushes buffers queued by eviction. Called by the command recorder
    /// after `onSubmittedWorkDone`, or directly by `clear`.
    pub fn flush_pending_destruction(&self) {
        let pending: Vec<_> = std::mem::take(&mut *self.pending_destruction.lock());
        let count = pending.len();
        for buffer in pending {
            if let Ok(buffer) = Arc::try_unwrap(buffer) {
                buffer.destroy();
            }
        }
        if count > 0 {
            debug!("[UniformCache] flushed {count} destroyed buffer(s)");
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let mut pending = self.pending_destruction.lock();
        for (_, entry) in entries.drain() {
            pending.push(entry.buffer);
        }
        drop(entries);
        drop(pending);
        self.flush_pending_destruction();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic_and_sensitive_to_content() {
        let a = fnv1a(b"hello");
        let b = fnv1a(b"hello");
        let c = fnv1a(b"hellp");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn fnv1a_empty_input_is_offset_basis() {
        assert_eq!(fnv1a(&[]), 0x811c9dc5);
    }
}
