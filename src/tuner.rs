//! Micro-benchmarking auto-tuner (C11): picks the best workgroup/tile size
//! for a `(kernel, input shape)` pair once, persists the result under a
//! device-signature key, and never sits on the hot dispatch path again —
//! launchers only ever read the tuner's cache (§4.11).
//!
//! Grounded in the teacher's `persistence` save/load-to-disk shape
//! (bincode-serialized state keyed by a string, written to a single file)
//! without its crash-consistency machinery, since a tuning cache is a pure
//! performance hint that's safe to regenerate from scratch if lost.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::AutoTuneConfig;
use crate::constants::{TUNER_1D_CANDIDATES, TUNER_2D_CANDIDATES};
use crate::device::Capability;
use crate::error::KernelResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkgroupShape {
    OneD(u32),
    TwoD(u32, u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub optimal_workgroup_size: WorkgroupShape,
    pub optimal_tile_size: Option<u32>,
    pub throughput: f64,
    pub time_ms: f64,
    pub device_info: String,
}

/// A single timed run of one candidate, reported by the caller-supplied
/// micro-benchmark closure (§4.11: "creates synthetic inputs, runs warmup
/// untimed and iterations timed submissions").
#[derive(Debug, Clone, Copy)]
pub struct CandidateMeasurement {
    pub time_ms: f64,
    pub throughput: f64,
}

/// Generates the 1-D or 2-D workgroup candidates named in §4.11, filtered
/// to the device's actual limits.
pub fn candidates_for(limits: &wgpu::Limits, two_dimensional: bool) -> Vec<WorkgroupShape> {
    if two_dimensional {
        TUNER_2D_CANDIDATES
            .iter()
            .flat_map(|&x| TUNER_2D_CANDIDATES.iter().map(move |&y| (x, y)))
            .filter(|&(x, y)| {
                x <= limits.max_compute_workgroup_size_x
                    && y <= limits.max_compute_workgroup_size_y
                    && x * y <= limits.max_compute_invocations_per_workgroup
            })
            .map(|(x, y)| WorkgroupShape::TwoD(x, y))
            .collect()
    } else {
        TUNER_1D_CANDIDATES
            .iter()
            .copied()
            .filter(|&x| {
                x <= limits.max_compute_workgroup_size_x && x <= limits.max_compute_invocations_per_workgroup
            })
            .map(WorkgroupShape::OneD)
            .collect()
    }
}

fn device_signature(capability: &Capability) -> String {
    format!(
        "kernel_tune_{}_{:?}_{}",
        capability.vendor, capability.backend, capability.device_id
    )
}

fn cache_key(kernel_name: &str, input_sizes: &[u64]) -> String {
    format!("{kernel_name}:{}", serde_json::to_string(input_sizes).unwrap_or_default())
}

/// Process-wide tuner. One instance lives on [`crate::Engine`]; tuning
/// results for every device this process has touched this run are kept
/// in-memory keyed by device signature, and optionally persisted to disk.
pub struct AutoTuner {
    config: AutoTuneConfig,
    cache: RwLock<HashMap<String, HashMap<String, TuningResult>>>,
    persist_path: RwLock<Option<PathBuf>>,
}

impl AutoTuner {
    pub fn new(config: AutoTuneConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            persist_path: RwLock::new(None),
        }
    }

    /// Points the tuner at a file to persist/restore results from. Loads
    /// whatever is already there; a missing or unreadable file is treated
    /// as an empty cache rather than an error, since the cache is always
    /// safe to regenerate.
    pub fn set_persist_path(&self, path: impl Into<PathBuf>) -> KernelResult<()> {
        let path = path.into();
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(loaded) = bincode::deserialize::<HashMap<String, HashMap<String, TuningResult>>>(&bytes) {
                *self.cache.write() = loaded;
            }
        }
        *self.persist_path.write() = Some(path);
        Ok(())
    }

    fn save(&self) {
        let Some(path) = self.persist_path.read().clone() else {
            return;
        };
        if let Ok(bytes) = bincode::serialize(&*self.cache.read()) {
            if let Err(err) = std::fs::write(&path, bytes) {
                log::warn!("[AutoTuner] failed to persist tuning cache to {}: {err}", path.display());
            }
        }
    }

    pub fn cached_result(&self, capability: &Capability, kernel_name: &str, input_sizes: &[u64]) -> Option<TuningResult> {
        let sig = device_signature(capability);
        self.cache.read().get(&sig)?.get(&cache_key(kernel_name, input_sizes)).cloned()
    }

    /// Runs `benchmark` once per filtered candidate (`warmup` untimed calls
    /// then `iterations` timed calls, per §4.11 — the caller owns submitting
    /// and waiting on the GPU inside the closure since only it knows how to
    /// build synthetic inputs for this particular kernel), keeps the best
    /// by median time, and persists it under the device signature.
    ///
    /// Never called from a launcher's hot path; launchers only read via
    /// [`Self::cached_result`].
    pub fn tune_kernel(
        &self,
        capability: &Capability,
        kernel_name: &str,
        input_sizes: &[u64],
        candidates: &[WorkgroupShape],
        force_retune: bool,
        mut benchmark: impl FnMut(WorkgroupShape, u32) -> CandidateMeasurement,
    ) -> TuningResult {
        if !force_retune {
            if let Some(cached) = self.cached_result(capability, kernel_name, input_sizes) {
                return cached;
            }
        }

        let warmup = self.config.warmup;
        let iterations = self.config.iterations.max(1);

        let mut best: Option<(WorkgroupShape, Vec<f64>, f64)> = None;
        for &candidate in candidates {
            for _ in 0..warmup {
                benchmark(candidate, 0);
            }
            let mut times = Vec::with_capacity(iterations as usize);
            let mut throughput_sum = 0.0;
            for i in 0..iterations {
                let measurement = benchmark(candidate, i + 1);
                times.push(measurement.time_ms);
                throughput_sum += measurement.throughput;
            }
            let median = median_of(&times);
            let avg_throughput = throughput_sum / iterations as f64;
            if best.as_ref().map(|(_, best_times, _)| median_of(best_times) > median).unwrap_or(true) {
                best = Some((candidate, times, avg_throughput));
            }
        }

        let (shape, times, throughput) = best.expect("candidates is non-empty");
        let result = TuningResult {
            optimal_workgroup_size: shape,
            optimal_tile_size: None,
            throughput,
            time_ms: median_of(&times),
            device_info: capability.adapter_name.clone(),
        };

        let sig = device_signature(capability);
        self.cache
            .write()
            .entry(sig)
            .or_default()
            .insert(cache_key(kernel_name, input_sizes), result.clone());
        self.save();

        result
    }

    pub fn clear(&self) {
        self.cache.write().clear();
        self.save();
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability() -> Capability {
        Capability {
            adapter_name: "test-adapter".to_string(),
            vendor: 0x10de,
            device_id: 0x1234,
            backend: wgpu::Backend::Vulkan,
            features: vec![],
            limits: wgpu::Limits::default(),
        }
    }

    #[test]
    fn candidates_for_1d_are_filtered_by_limits() {
        let mut limits = wgpu::Limits::default();
        limits.max_compute_workgroup_size_x = 200;
        limits.max_compute_invocations_per_workgroup = 200;
        let candidates = candidates_for(&limits, false);
        assert!(candidates.contains(&WorkgroupShape::OneD(128)));
        assert!(!candidates.contains(&WorkgroupShape::OneD(256)));
    }

    #[test]
    fn candidates_for_2d_respects_invocation_cap() {
        let mut limits = wgpu::Limits::default();
        limits.max_compute_workgroup_size_x = 32;
        limits.max_compute_workgroup_size_y = 32;
        limits.max_compute_invocations_per_workgroup = 512;
        let candidates = candidates_for(&limits, true);
        assert!(candidates.contains(&WorkgroupShape::TwoD(16, 16)));
        assert!(!candidates.contains(&WorkgroupShape::TwoD(32, 32)));
    }

    #[test]
    fn tune_kernel_picks_lowest_median_time() {
        let tuner = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 1, iterations: 3 });
        let cap = capability();
        let candidates = vec![WorkgroupShape::OneD(64), WorkgroupShape::OneD(256)];
        let result = tuner.tune_kernel(&cap, "matmul", &[64, 64, 64], &candidates, false, |shape, _| {
            let time_ms = if shape == WorkgroupShape::OneD(256) { 1.0 } else { 5.0 };
            CandidateMeasurement { time_ms, throughput: 1.0 / time_ms }
        });
        assert_eq!(result.optimal_workgroup_size, WorkgroupShape::OneD(256));
    }

    #[test]
    fn cached_result_is_reused_without_rerunning_benchmark() {
        let tuner = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 0, iterations: 1 });
        let cap = capability();
        let candidates = vec![WorkgroupShape::OneD(64)];
        tuner.tune_kernel(&cap, "softmax", &[4096], &candidates, false, |_, _| CandidateMeasurement {
            time_ms: 2.0,
            throughput: 0.5,
        });

        let mut calls = 0;
        tuner.tune_kernel(&cap, "softmax", &[4096], &candidates, false, |_, _| {
            calls += 1;
            CandidateMeasurement { time_ms: 99.0, throughput: 0.0 }
        });
        assert_eq!(calls, 0);
    }

    #[test]
    fn force_retune_bypasses_cache() {
        let tuner = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 0, iterations: 1 });
        let cap = capability();
        let candidates = vec![WorkgroupShape::OneD(64)];
        tuner.tune_kernel(&cap, "rmsnorm", &[4096], &candidates, false, |_, _| CandidateMeasurement {
            time_ms: 2.0,
            throughput: 0.5,
        });
        let result = tuner.tune_kernel(&cap, "rmsnorm", &[4096], &candidates, true, |_, _| CandidateMeasurement {
            time_ms: 9.0,
            throughput: 0.1,
        });
        assert_eq!(result.time_ms, 9.0);
    }

    #[test]
    fn tuning_cache_survives_a_persist_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning_cache.bin");
        let cap = capability();
        let candidates = vec![WorkgroupShape::OneD(64)];

        let writer = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 0, iterations: 1 });
        writer.set_persist_path(&path).unwrap();
        writer.tune_kernel(&cap, "matmul", &[64, 64, 64], &candidates, false, |_, _| CandidateMeasurement {
            time_ms: 3.0,
            throughput: 0.33,
        });
        assert!(path.exists());

        let reader = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 0, iterations: 1 });
        reader.set_persist_path(&path).unwrap();
        let cached = reader.cached_result(&cap, "matmul", &[64, 64, 64]).unwrap();
        assert_eq!(cached.time_ms, 3.0);

        let mut calls = 0;
        reader.tune_kernel(&cap, "matmul", &[64, 64, 64], &candidates, false, |_, _| {
            calls += 1;
            CandidateMeasurement { time_ms: 99.0, throughput: 0.0 }
        });
        assert_eq!(calls, 0, "reloaded cache should short-circuit re-tuning");
    }

    #[test]
    fn missing_persist_file_starts_from_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist-yet.bin");
        let tuner = AutoTuner::new(AutoTuneConfig { enabled: true, warmup: 0, iterations: 1 });
        tuner.set_persist_path(&path).unwrap();
        assert!(tuner.cached_result(&capability(), "matmul", &[1]).is_none());
    }
}
