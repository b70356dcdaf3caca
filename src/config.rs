//! Process configuration.
//!
//! Every "default N" the component design calls out in prose lives here as a
//! field with that default, so a host can override one knob (e.g. disable
//! buffer pooling for a leak hunt) without touching the rest.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::KernelResult;
use crate::perf::PerfGuardConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub perf_guard: PerfGuardConfig,
    pub buffer_pool: BufferPoolConfig,
    pub uniform_cache: UniformCacheConfig,
    pub auto_tune: AutoTuneConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            perf_guard: PerfGuardConfig::default(),
            buffer_pool: BufferPoolConfig::default(),
            uniform_cache: UniformCacheConfig::default(),
            auto_tune: AutoTuneConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn load_from_toml(path: &std::path::Path) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn to_toml(&self) -> KernelResult<String> {
        toml::to_string_pretty(self).map_err(|e| crate::error::KernelError::Context {
            context: "serializing RuntimeConfig".to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    pub large_threshold: u64,
    pub coarse_step: u64,
    pub raw_alignment: u64,
    pub max_per_bucket: usize,
    pub max_total: usize,
    pub enable_pooling: bool,
    pub leak_detection: bool,
    pub leak_threshold_secs: u64,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            large_threshold: POOL_LARGE_THRESHOLD,
            coarse_step: POOL_COARSE_STEP,
            raw_alignment: POOL_RAW_ALIGNMENT,
            max_per_bucket: POOL_MAX_PER_BUCKET,
            max_total: POOL_MAX_TOTAL,
            enable_pooling: true,
            leak_detection: cfg!(debug_assertions),
            leak_threshold_secs: POOL_LEAK_THRESHOLD_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformCacheConfig {
    pub max_entries: usize,
    pub max_age_ms: u64,
}

impl Default for UniformCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: UNIFORM_CACHE_MAX_ENTRIES,
            max_age_ms: UNIFORM_CACHE_MAX_AGE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoTuneConfig {
    pub enabled: bool,
    pub warmup: u32,
    pub iterations: u32,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup: TUNER_DEFAULT_WARMUP,
            iterations: TUNER_DEFAULT_ITERATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = RuntimeConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: RuntimeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.buffer_pool.max_total, config.buffer_pool.max_total);
        assert_eq!(parsed.uniform_cache.max_entries, config.uniform_cache.max_entries);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let text = "[perf_guard]\nstrict_mode = true\n";
        let parsed: RuntimeConfig = toml::from_str(text).unwrap();
        assert!(parsed.perf_guard.strict_mode);
        assert_eq!(parsed.buffer_pool.max_total, POOL_MAX_TOTAL);
    }
}
