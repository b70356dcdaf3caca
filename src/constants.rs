//! Crate-wide numeric constants
//!
//! Every "default N" called out in the component design is named here once,
//! so launchers and selectors never hard-code a magic number twice.

/// wgpu's per-dimension workgroup-count ceiling. Dispatches above this on the
/// X axis are folded into a second dimension by the launcher (§4.9).
pub const MAX_WORKGROUPS: u32 = 65535;

/// Required alignment for uniform/storage buffer offsets.
pub const BUFFER_OFFSET_ALIGNMENT: u64 = 256;

/// Buffer pool: powers-of-two bucketing stops being used above this size.
pub const POOL_LARGE_THRESHOLD: u64 = 32 * 1024 * 1024;

/// Buffer pool: coarse bucket step once above `POOL_LARGE_THRESHOLD`.
pub const POOL_COARSE_STEP: u64 = 16 * 1024 * 1024;

/// Buffer pool: raw alignment fallback when a bucketed size would exceed a
/// device limit.
pub const POOL_RAW_ALIGNMENT: u64 = 256;

/// Buffer pool: maximum buffers retained per size bucket.
pub const POOL_MAX_PER_BUCKET: usize = 8;

/// Buffer pool: maximum buffers retained across all buckets.
pub const POOL_MAX_TOTAL: usize = 64;

/// Buffer pool: age (seconds) after which an active allocation is reported
/// as a possible leak by the debug leak detector.
pub const POOL_LEAK_THRESHOLD_SECS: u64 = 60;

/// Uniform cache: default maximum resident entries before eviction kicks in.
pub const UNIFORM_CACHE_MAX_ENTRIES: usize = 256;

/// Uniform cache: default staleness threshold for on-demand eviction.
pub const UNIFORM_CACHE_MAX_AGE_MS: u64 = 30_000;

/// Matmul GEMV: N above which the multicol subgroup variant is preferred
/// over the plain subgroup GEMV variant.
pub const GEMV_MULTICOL_THRESHOLD: u32 = 256;

/// RMSNorm / Softmax: inner size at/below which the "small" (non-subgroup)
/// variant is preferred.
pub const SMALL_KERNEL_THRESHOLD: u32 = 256;

/// Attention: headDim at/below which the `tiled_large` tier applies, given
/// enough shared memory.
pub const ATTENTION_TILED_LARGE_MAX_HEAD_DIM: u32 = 64;
/// Attention: minimum shared memory (bytes) required for `tiled_large`.
pub const ATTENTION_TILED_LARGE_MIN_SHARED: u32 = 48 * 1024;

/// Attention: headDim at/below which `tiled_small` applies.
pub const ATTENTION_TILED_SMALL_MAX_HEAD_DIM: u32 = 256;
/// Attention: minimum shared memory (bytes) for `tiled_small` with an f16 KV cache.
pub const ATTENTION_TILED_SMALL_MIN_SHARED_F16KV: u32 = 4 * 1024;
/// Attention: minimum shared memory (bytes) for `tiled_small` with a non-f16 KV cache.
pub const ATTENTION_TILED_SMALL_MIN_SHARED: u32 = 8 * 1024;

/// Attention: minimum shared memory (bytes) for the decode-only `subgroup` tier.
pub const ATTENTION_SUBGROUP_MIN_SHARED: u32 = 8 * 1024;

/// Attention: headDim threshold for selecting `decode_chunked_f16kv`.
pub const ATTENTION_CHUNKED_MIN_HEAD_DIM: u32 = 128;
/// Attention: kvLen at/below which the chunked f16kv decode variant applies;
/// above it, decode falls back to the streaming f16kv variant.
pub const ATTENTION_CHUNKED_MAX_KV_LEN: u32 = 2048;
/// Attention: headDim at/below which `decode_subgroup` applies.
pub const ATTENTION_SUBGROUP_MAX_HEAD_DIM: u32 = 256;
/// Attention: kvLen at/below which `decode_subgroup` applies.
pub const ATTENTION_SUBGROUP_MAX_KV_LEN: u32 = 2048;

/// Attention tiled_large prefill dispatch tile along the sequence axis.
pub const ATTENTION_TILE_SEQ: u32 = 64;

/// Q4_K super-block size in elements and bytes.
pub const Q4K_BLOCK_ELEMENTS: u32 = 256;
pub const Q4K_BLOCK_BYTES: u32 = 144;

/// Auto-tuner: candidate workgroup sizes considered for 1-D dispatch kernels.
pub const TUNER_1D_CANDIDATES: [u32; 4] = [64, 128, 256, 512];
/// Auto-tuner: candidate workgroup sizes (per axis) considered for 2-D dispatch kernels.
pub const TUNER_2D_CANDIDATES: [u32; 3] = [8, 16, 32];

/// Auto-tuner: default warmup/iteration counts when unspecified.
pub const TUNER_DEFAULT_WARMUP: u32 = 3;
pub const TUNER_DEFAULT_ITERATIONS: u32 = 10;

/// Command recorder: timestamp-query capacity when profiling is enabled.
pub const PROFILER_QUERY_CAPACITY: u32 = 512;

/// Profiler: bounds outside which a resolved GPU timing sample is treated as
/// bogus and dropped (§4.10).
pub const PROFILER_SAMPLE_MIN_MS: f64 = 0.0;
pub const PROFILER_SAMPLE_MAX_MS: f64 = 60_000.0;

/// Kernel-path: a single op is flagged as dominating a profiler report above
/// this fraction of total time.
pub const PROFILER_DOMINANT_OP_FRACTION: f64 = 0.30;
