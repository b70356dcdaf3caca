//! Host-side interval profiler with heuristic bottleneck detection.
//!
//! Mirrors the teacher's `PerformanceMetrics`/`ScopedMeasurement` pattern
//! (`memory/performance_metrics.rs`), but tags intervals by category/name
//! instead of comparing a CPU and a GPU implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::Mutex;

use crate::constants::PROFILER_DOMINANT_OP_FRACTION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileCategory {
    Kernel,
    Upload,
    Readback,
    Sync,
    Host,
}

#[derive(Debug, Clone)]
struct Sample {
    name: String,
    category: ProfileCategory,
    duration: Duration,
}

/// Tracks host-side intervals. Cheap to clone (shares its sample buffer), so
/// it can be handed to launchers the same way [`crate::perf::PerfGuard`] is.
#[derive(Debug, Default, Clone)]
pub struct PerfProfiler {
    samples: std::sync::Arc<Mutex<Vec<Sample>>>,
}

impl PerfProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times a synchronous block, tagging the sample with `name`/`category`.
    pub fn profile_sync<R>(&self, name: &str, category: ProfileCategory, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(name, category, start.elapsed());
        result
    }

    /// Times an async block. The block itself decides when to await GPU
    /// completion; this just wraps the wall-clock interval around it.
    pub async fn profile_async<R, F>(&self, name: &str, category: ProfileCategory, f: F) -> R
    where
        F: std::future::Future<Output = R>,
    {
        let start = Instant::now();
        let result = f.await;
        self.record(name, category, start.elapsed());
        result
    }

    /// Wraps a kernel dispatch closure and a completion-wait closure so the
    /// measured interval is the true kernel latency even on devices without
    /// timestamp queries: the caller submits inside `dispatch`, then
    /// `await_completion` blocks on `queue.onSubmittedWorkDone()`-equivalent.
    pub fn profile_kernel<R>(
        &self,
        name: &str,
        dispatch: impl FnOnce() -> R,
        await_completion: impl FnOnce(),
    ) -> R {
        let start = Instant::now();
        let result = dispatch();
        await_completion();
        self.record(name, ProfileCategory::Kernel, start.elapsed());
        result
    }

    fn record(&self, name: &str, category: ProfileCategory, duration: Duration) {
        self.samples.lock().push(Sample {
            name: name.to_string(),
            category,
            duration,
        });
    }

    /// Merges in durations resolved from GPU timestamp queries (see
    /// [`crate::recorder::CommandRecorder::resolve_profile_timings`]), which
    /// arrive already bucketed by label.
    pub fn record_gpu_timings(&self, timings: impl IntoIterator<Item = (String, Duration)>) {
        let mut samples = self.samples.lock();
        for (label, duration) in timings {
            samples.push(Sample {
                name: label,
                category: ProfileCategory::Kernel,
                duration,
            });
        }
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    /// Aggregates recorded samples by name, ranks by total time, and applies
    /// heuristic bottleneck tags.
    pub fn report(&self) -> ProfileReport {
        let samples = self.samples.lock();
        let mut by_name: HashMap<String, (ProfileCategory, Duration, u32)> = HashMap::new();
        let mut total = Duration::ZERO;
        let mut sync_count = 0u32;

        for sample in samples.iter() {
            let entry = by_name
                .entry(sample.name.clone())
                .or_insert((sample.category, Duration::ZERO, 0));
            entry.1 += sample.duration;
            entry.2 += 1;
            total += sample.duration;
            if sample.category == ProfileCategory::Sync {
                sync_count += 1;
            }
        }

        let mut entries: Vec<ProfileEntry> = by_name
            .into_iter()
            .map(|(name, (category, duration, count))| ProfileEntry {
                name,
                category,
                total: duration,
                count,
            })
            .collect();
        entries.sort_by(|a, b| b.total.cmp(&a.total));

        let bottlenecks = detect_bottlenecks(&entries, total, sync_count);

        debug!("[PerfProfiler] report: {} entries, {:?} total", entries.len(), total);

        ProfileReport {
            entries,
            total,
            bottlenecks,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileEntry {
    pub name: String,
    pub category: ProfileCategory,
    pub total: Duration,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct ProfileReport {
    pub entries: Vec<ProfileEntry>,
    pub total: Duration,
    pub bottlenecks: Vec<Bottleneck>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bottleneck {
    ExcessiveGpuSyncs,
    MemoryBandwidthBound,
    KernelLaunchOverhead,
    DominantOp { name: String, fraction_pct: u32 },
}

impl std::fmt::Display for Bottleneck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bottleneck::ExcessiveGpuSyncs => write!(f, "excessive GPU syncs"),
            Bottleneck::MemoryBandwidthBound => write!(f, "memory-bandwidth bound"),
            Bottleneck::KernelLaunchOverhead => write!(f, "kernel-launch overhead"),
            Bottleneck::DominantOp { name, fraction_pct } => {
                write!(f, "op {name} dominates (≥{fraction_pct}%)")
            }
        }
    }
}

fn detect_bottlenecks(entries: &[ProfileEntry], total: Duration, sync_count: u32) -> Vec<Bottleneck> {
    let mut tags = Vec::new();
    if total.is_zero() || entries.is_empty() {
        return tags;
    }

    if sync_count > 4 {
        tags.push(Bottleneck::ExcessiveGpuSyncs);
    }

    let kernel_count: u32 = entries
        .iter()
        .filter(|e| e.category == ProfileCategory::Kernel)
        .map(|e| e.count)
        .sum();
    let kernel_total: Duration = entries
        .iter()
        .filter(|e| e.category == ProfileCategory::Kernel)
        .map(|e| e.total)
        .sum();
    if kernel_count > 0 {
        let avg_kernel_us = kernel_total.as_secs_f64() * 1_000_000.0 / kernel_count as f64;
        if avg_kernel_us < 5.0 {
            tags.push(Bottleneck::KernelLaunchOverhead);
        }
    }

    let readback_total: Duration = entries
        .iter()
        .filter(|e| e.category == ProfileCategory::Readback || e.category == ProfileCategory::Upload)
        .map(|e| e.total)
        .sum();
    if readback_total.as_secs_f64() / total.as_secs_f64() > 0.5 {
        tags.push(Bottleneck::MemoryBandwidthBound);
    }

    if let Some(top) = entries.first() {
        let fraction = top.total.as_secs_f64() / total.as_secs_f64();
        if fraction >= PROFILER_DOMINANT_OP_FRACTION {
            tags.push(Bottleneck::DominantOp {
                name: top.name.clone(),
                fraction_pct: (fraction * 100.0).round() as u32,
            });
        }
    }

    tags
}

/// Drops a GPU-timestamp-resolved duration that falls outside the sane
/// range, per §4.10's "bogus sample" rule.
pub fn is_plausible_gpu_duration_ms(ms: f64) -> bool {
    use crate::constants::{PROFILER_SAMPLE_MAX_MS, PROFILER_SAMPLE_MIN_MS};
    ms >= PROFILER_SAMPLE_MIN_MS && ms <= PROFILER_SAMPLE_MAX_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn report_ranks_by_total_time() {
        let profiler = PerfProfiler::new();
        profiler.profile_sync("slow", ProfileCategory::Kernel, || sleep(Duration::from_millis(5)));
        profiler.profile_sync("fast", ProfileCategory::Kernel, || sleep(Duration::from_micros(100)));
        let report = profiler.report();
        assert_eq!(report.entries[0].name, "slow");
    }

    #[test]
    fn dominant_op_is_flagged() {
        let profiler = PerfProfiler::new();
        profiler.profile_sync("big", ProfileCategory::Kernel, || sleep(Duration::from_millis(20)));
        profiler.profile_sync("small", ProfileCategory::Kernel, || sleep(Duration::from_millis(1)));
        let report = profiler.report();
        assert!(report
            .bottlenecks
            .iter()
            .any(|b| matches!(b, Bottleneck::DominantOp { name, .. } if name == "big")));
    }

    #[test]
    fn plausible_range_rejects_bogus_samples() {
        assert!(is_plausible_gpu_duration_ms(12.5));
        assert!(!is_plausible_gpu_duration_ms(-1.0));
        assert!(!is_plausible_gpu_duration_ms(70_000.0));
    }

    #[test]
    fn empty_profiler_reports_no_bottlenecks() {
        let profiler = PerfProfiler::new();
        assert!(profiler.report().bottlenecks.is_empty());
    }
}
