//! Process-wide performance guard: policy switches and soft-error counters
//! shared by every other module that touches the GPU queue.

pub mod profiler;

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub use profiler::{Bottleneck, PerfProfiler, ProfileCategory, ProfileReport};

/// Policy knobs for a running [`crate::Engine`]. Cloned into every subsystem
/// that needs to check `allowReadback`/`strictMode` without holding a
/// reference to the engine itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PerfGuardConfig {
    pub allow_gpu_readback: bool,
    pub track_submit_count: bool,
    pub track_allocations: bool,
    pub log_expensive_ops: bool,
    pub strict_mode: bool,
}

impl Default for PerfGuardConfig {
    fn default() -> Self {
        Self {
            allow_gpu_readback: true,
            track_submit_count: true,
            track_allocations: true,
            log_expensive_ops: false,
            strict_mode: false,
        }
    }
}

/// Counters incremented by [`PerfGuard`] as the engine runs. Cheap enough to
/// read from any thread without locking.
#[derive(Debug, Default)]
pub struct PerfGuardCounters {
    pub submits: AtomicU64,
    pub allocations: AtomicU64,
    pub readbacks: AtomicU64,
}

impl PerfGuardCounters {
    pub fn snapshot(&self) -> PerfGuardSnapshot {
        PerfGuardSnapshot {
            submits: self.submits.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            readbacks: self.readbacks.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfGuardSnapshot {
    pub submits: u64,
    pub allocations: u64,
    pub readbacks: u64,
}

/// Gate for GPU-readback and bookkeeping of queue activity.
///
/// One instance lives on [`crate::Engine`] and is shared (by reference) with
/// [`crate::recorder::CommandRecorder`] and [`crate::memory::buffer_pool::BufferPool`].
#[derive(Debug, Default)]
pub struct PerfGuard {
    pub config: PerfGuardConfig,
    pub counters: PerfGuardCounters,
}

impl PerfGuard {
    pub fn new(config: PerfGuardConfig) -> Self {
        Self {
            config,
            counters: PerfGuardCounters::default(),
        }
    }

    /// Checks whether a GPU-to-CPU readback is currently permitted.
    ///
    /// Returns `Ok(())` and increments the readback counter when permitted.
    /// Returns `Err` when strict mode is on and readback is disabled; logs a
    /// warning and returns `Err` regardless so callers have one branch to
    /// write (`?` in strict mode is the common case anyway).
    pub fn allow_readback(&self, reason: &str) -> crate::error::KernelResult<()> {
        if self.config.allow_gpu_readback {
            if self.config.track_allocations {
                self.counters.readbacks.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(());
        }
        if self.config.strict_mode {
            return Err(crate::error::KernelError::ReadbackDisallowed {
                reason: reason.to_string(),
            });
        }
        warn!("[PerfGuard] readback disallowed ({reason}), proceeding is not possible — soft-failing");
        Err(crate::error::KernelError::ReadbackDisallowed {
            reason: reason.to_string(),
        })
    }

    pub fn note_submit(&self) {
        if self.config.track_submit_count {
            self.counters.submits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn note_allocation(&self, bytes: u64, label: &str) {
        if self.config.track_allocations {
            self.counters.allocations.fetch_add(1, Ordering::Relaxed);
        }
        if self.config.log_expensive_ops && bytes > 16 * 1024 * 1024 {
            debug!("[PerfGuard] large allocation: {label} ({bytes} bytes)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readback_allowed_increments_counter() {
        let guard = PerfGuard::new(PerfGuardConfig::default());
        guard.allow_readback("test").unwrap();
        assert_eq!(guard.counters.snapshot().readbacks, 1);
    }

    #[test]
    fn readback_disabled_strict_errors() {
        let config = PerfGuardConfig {
            allow_gpu_readback: false,
            strict_mode: true,
            ..Default::default()
        };
        let guard = PerfGuard::new(config);
        assert!(guard.allow_readback("test").is_err());
    }

    #[test]
    fn readback_disabled_non_strict_still_errs_but_does_not_panic() {
        let config = PerfGuardConfig {
            allow_gpu_readback: false,
            strict_mode: false,
            ..Default::default()
        };
        let guard = PerfGuard::new(config);
        assert!(guard.allow_readback("test").is_err());
    }
}
