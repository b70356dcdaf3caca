//! WGSL source for every operation family in the kernel registry.
//!
//! One source string per *operation*, not per variant: variants within an
//! operation differ in dispatch geometry, capability requirements, and
//! binding layout (handled by `registry::variants` and the launchers), not
//! in shader logic distinct enough to warrant separate WGSL bodies for this
//! crate's purposes. [`source_for`] is the single place a `shader_file`
//! resolves to text, mirroring the teacher's `include_str!`-per-shader
//! convention but collapsed to the family level.

/// Returns the WGSL source backing `variant.shader_file`, keyed by
/// `operation` since that's what actually determines the shader body here.
pub fn source_for(operation: &str) -> &'static str {
    match operation {
        "matmul" => MATMUL,
        "attention" => ATTENTION,
        "rmsnorm" => RMSNORM,
        "softmax" => SOFTMAX,
        "silu" => SILU,
        "gelu" => GELU,
        "gather" => GATHER,
        "residual" => RESIDUAL,
        "bias_add" => BIAS_ADD,
        "dequant" => DEQUANT,
        "rope" => ROPE,
        "topk" => TOPK,
        "scatter_add" => SCATTER_ADD,
        "sample" => SAMPLE,
        "cast" => CAST,
        other => panic!("no shader source registered for operation `{other}`"),
    }
}

const MATMUL: &str = r#"
struct Uniforms {
    m: u32,
    n: u32,
    k: u32,
    alpha: f32,
    aux0: u32,
    uniform_workgroups_x: u32,
};

@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> a: array<f32>;
@group(0) @binding(2) var<storage, read> b: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.n || gid.y >= params.m) {
        return;
    }
    var acc: f32 = 0.0;
    for (var i: u32 = 0u; i < params.k; i = i + 1u) {
        acc = acc + a[gid.y * params.k + i] * b[i * params.n + gid.x];
    }
    out[gid.y * params.n + gid.x] = acc * params.alpha;
}
"#;

const ATTENTION: &str = r#"
struct Uniforms {
    num_heads: u32,
    num_kv_heads: u32,
    head_dim: u32,
    kv_len: u32,
    seq_len: u32,
    scale: f32,
    causal: u32,
    start_pos: u32,
};

@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> q: array<f32>;
@group(0) @binding(2) var<storage, read> k: array<f32>;
@group(0) @binding(3) var<storage, read> v: array<f32>;
@group(0) @binding(4) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(64, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let pos = gid.x;
    if (pos >= params.seq_len) {
        return;
    }
    // Single-pass softmax-attention; tiling/decode variants share this body
    // and differ only in dispatch geometry and binding layout.
    var max_score: f32 = -3.4e38;
    for (var j: u32 = 0u; j < params.kv_len; j = j + 1u) {
        var score: f32 = 0.0;
        for (var d: u32 = 0u; d < params.head_dim; d = d + 1u) {
            score = score + q[pos * params.head_dim + d] * k[j * params.head_dim + d];
        }
        score = score * params.scale;
        max_score = max(max_score, score);
    }
    var denom: f32 = 0.0;
    for (var d: u32 = 0u; d < params.head_dim; d = d + 1u) {
        out[pos * params.head_dim + d] = 0.0;
    }
    for (var j: u32 = 0u; j < params.kv_len; j = j + 1u) {
        var score: f32 = 0.0;
        for (var d: u32 = 0u; d < params.head_dim; d = d + 1u) {
            score = score + q[pos * params.head_dim + d] * k[j * params.head_dim + d];
        }
        let weight = exp(score * params.scale - max_score);
        denom = denom + weight;
        for (var d: u32 = 0u; d < params.head_dim; d = d + 1u) {
            out[pos * params.head_dim + d] = out[pos * params.head_dim + d] + weight * v[j * params.head_dim + d];
        }
    }
    for (var d: u32 = 0u; d < params.head_dim; d = d + 1u) {
        out[pos * params.head_dim + d] = out[pos * params.head_dim + d] / denom;
    }
}
"#;

const RMSNORM: &str = r#"
struct Uniforms {
    hidden_size: u32,
    batch_size: u32,
    eps: f32,
    has_residual: u32,
};

@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<f32>;
@group(0) @binding(2) var<storage, read> weight: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.x;
    if (row >= params.batch_size) {
        return;
    }
    var sum_sq: f32 = 0.0;
    let base = row * params.hidden_size;
    for (var i: u32 = 0u; i < params.hidden_size; i = i + 1u) {
        let v = input[base + i];
        sum_sq = sum_sq + v * v;
    }
    let inv_rms = inverseSqrt(sum_sq / f32(params.hidden_size) + params.eps);
    for (var i: u32 = 0u; i < params.hidden_size; i = i + 1u) {
        out[base + i] = input[base + i] * inv_rms * weight[i];
    }
}
"#;

const SOFTMAX: &str = r#"
struct Uniforms {
    inner_size: u32,
    outer_size: u32,
    temperature: f32,
};

@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<f32>;
@group(0) @binding(2) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let row = gid.x;
    if (row >= params.outer_size) {
        return;
    }
    let base = row * params.inner_size;
    var max_v: f32 = -3.4e38;
    for (var i: u32 = 0u; i < params.inner_size; i = i + 1u) {
        max_v = max(max_v, input[base + i] / params.temperature);
    }
    var sum: f32 = 0.0;
    for (var i: u32 = 0u; i < params.inner_size; i = i + 1u) {
        let e = exp(input[base + i] / params.temperature - max_v);
        out[base + i] = e;
        sum = sum + e;
    }
    for (var i: u32 = 0u; i < params.inner_size; i = i + 1u) {
        out[base + i] = out[base + i] / sum;
    }
}
"#;

const SILU: &str = r#"
struct Uniforms { size: u32 };
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<f32>;
@group(0) @binding(2) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.size) { return; }
    let x = input[gid.x];
    out[gid.x] = x / (1.0 + exp(-x));
}
"#;

const GELU: &str = r#"
struct Uniforms { size: u32 };
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<f32>;
@group(0) @binding(2) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.size) { return; }
    let x = input[gid.x];
    out[gid.x] = 0.5 * x * (1.0 + tanh(0.7978845608 * (x + 0.044715 * x * x * x)));
}
"#;

const GATHER: &str = r#"
struct Uniforms {
    num_tokens: u32,
    hidden_size: u32,
    vocab_size: u32,
    transpose: u32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> table: array<f32>;
@group(0) @binding(2) var<storage, read> ids: array<u32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let token = gid.x;
    if (token >= params.num_tokens) { return; }
    let id = ids[token];
    let src = id * params.hidden_size;
    let dst = token * params.hidden_size;
    for (var i: u32 = 0u; i < params.hidden_size; i = i + 1u) {
        out[dst + i] = table[src + i];
    }
}
"#;

const RESIDUAL: &str = r#"
struct Uniforms { size: u32 };
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> a: array<f32>;
@group(0) @binding(2) var<storage, read> b: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.size) { return; }
    out[gid.x] = a[gid.x] + b[gid.x];
}
"#;

const BIAS_ADD: &str = r#"
struct Uniforms { size: u32 };
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<f32>;
@group(0) @binding(2) var<storage, read> bias: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= params.size) { return; }
    out[gid.x] = input[gid.x] + bias[gid.x];
}
"#;

const DEQUANT: &str = r#"
// Q4_K super-block: 256 elements packed into 144 bytes (36 u32 words).
// Word 0 holds the super-block's (d, dmin) scale pair as two packed f16
// values; bytes 4..16 hold 12 bytes of 6-bit-packed per-subblock scale/min
// indices (8 subblocks of 32 elements each); bytes 16..144 hold the 128
// bytes of 4-bit-packed quant nibbles. Mirrors ggml's block_q4_K layout and
// its get_scale_min_k4 / dequantize_row_q4_K unpacking.
struct Uniforms {
    num_blocks: u32,
    elements_per_block: u32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> packed: array<u32>;
@group(0) @binding(2) var<storage, read_write> out: array<f32>;

const WORDS_PER_BLOCK: u32 = 36u;

fn read_byte(block_word_base: u32, byte_offset: u32) -> u32 {
    let word = packed[block_word_base + byte_offset / 4u];
    let shift = 8u * (byte_offset % 4u);
    return (word >> shift) & 0xFFu;
}

// ggml's get_scale_min_k4: unpacks the 6-bit (scale, min) pair for
// subblock `is` (0..7) from the block's 12-byte `scales` region, which
// starts at byte offset 4 within the block.
fn scale_min(block_word_base: u32, is: u32) -> vec2<u32> {
    if (is < 4u) {
        let d = read_byte(block_word_base, 4u + is) & 63u;
        let m = read_byte(block_word_base, 4u + is + 4u) & 63u;
        return vec2<u32>(d, m);
    }
    let d = (read_byte(block_word_base, 4u + is + 4u) & 0xFu)
        | ((read_byte(block_word_base, 4u + is - 4u) >> 6u) << 4u);
    let m = (read_byte(block_word_base, 4u + is + 4u) >> 4u)
        | ((read_byte(block_word_base, 4u + is) >> 6u) << 4u);
    return vec2<u32>(d, m);
}

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let idx = gid.x;
    if (idx >= params.num_blocks * params.elements_per_block) { return; }

    let block = idx / params.elements_per_block;
    let pos = idx % params.elements_per_block;
    let group = pos / 64u;
    let within = pos % 64u;
    let high_nibble = within >= 32u;
    let l = within % 32u;

    let block_word_base = block * WORDS_PER_BLOCK;
    let dm = unpack2x16float(packed[block_word_base]);
    let d = dm.x;
    let dmin = dm.y;

    let is = group * 2u + select(0u, 1u, high_nibble);
    let sm = scale_min(block_word_base, is);
    let scale = d * f32(sm.x);
    let min_v = dmin * f32(sm.y);

    let qs_byte_offset = 16u + group * 32u + l;
    let qbyte = read_byte(block_word_base, qs_byte_offset);
    let nibble = select(qbyte & 0xFu, qbyte >> 4u, high_nibble);

    out[idx] = scale * f32(nibble) - min_v;
}
"#;

const ROPE: &str = r#"
struct Uniforms {
    seq_len: u32,
    num_heads: u32,
    head_dim: u32,
    start_pos: u32,
    rope_theta: f32,
    scale: f32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read_write> x: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let pair = gid.x;
    let half_dim = params.head_dim / 2u;
    if (pair >= params.seq_len * params.num_heads * half_dim) { return; }
    let dim_idx = pair % half_dim;
    let pos = f32(params.start_pos) + f32(pair / (params.num_heads * half_dim));
    let freq = 1.0 / pow(params.rope_theta, f32(2u * dim_idx) / f32(params.head_dim));
    let angle = pos * freq * params.scale;
    let cos_a = cos(angle);
    let sin_a = sin(angle);
    let base = pair * 2u;
    let x0 = x[base];
    let x1 = x[base + 1u];
    x[base] = x0 * cos_a - x1 * sin_a;
    x[base + 1u] = x0 * sin_a + x1 * cos_a;
}
"#;

const TOPK: &str = r#"
struct Uniforms {
    num_tokens: u32,
    num_experts: u32,
    top_k: u32,
    normalize: u32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> logits: array<f32>;
@group(0) @binding(2) var<storage, read_write> indices: array<u32>;
@group(0) @binding(3) var<storage, read_write> weights: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let token = gid.x;
    if (token >= params.num_tokens) { return; }
    let base = token * params.num_experts;
    var taken: array<bool, 64>;
    var sum: f32 = 0.0;
    for (var k: u32 = 0u; k < params.top_k; k = k + 1u) {
        var best_idx: u32 = 0u;
        var best_val: f32 = -3.4e38;
        for (var e: u32 = 0u; e < params.num_experts; e = e + 1u) {
            if (!taken[e] && logits[base + e] > best_val) {
                best_val = logits[base + e];
                best_idx = e;
            }
        }
        taken[best_idx] = true;
        indices[token * params.top_k + k] = best_idx;
        weights[token * params.top_k + k] = best_val;
        sum = sum + best_val;
    }
    if (params.normalize == 1u && sum > 0.0) {
        for (var k: u32 = 0u; k < params.top_k; k = k + 1u) {
            weights[token * params.top_k + k] = weights[token * params.top_k + k] / sum;
        }
    }
}
"#;

const SCATTER_ADD: &str = r#"
struct Uniforms {
    num_tokens: u32,
    hidden_size: u32,
    top_k: u32,
    num_experts: u32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> expert_out: array<f32>;
@group(0) @binding(2) var<storage, read> weights: array<f32>;
@group(0) @binding(3) var<storage, read_write> out: array<f32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let token = gid.x;
    if (token >= params.num_tokens) { return; }
    let dst = token * params.hidden_size;
    for (var k: u32 = 0u; k < params.top_k; k = k + 1u) {
        let w = weights[token * params.top_k + k];
        let src = (token * params.top_k + k) * params.hidden_size;
        for (var i: u32 = 0u; i < params.hidden_size; i = i + 1u) {
            out[dst + i] = out[dst + i] + w * expert_out[src + i];
        }
    }
}
"#;

const SAMPLE: &str = r#"
struct Uniforms {
    vocab_size: u32,
    top_k: u32,
    temperature: f32,
    random_value: f32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> logits: array<f32>;
@group(0) @binding(2) var<storage, read_write> chosen: array<u32>;

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x != 0u) { return; }
    var best_idx: u32 = 0u;
    var best_val: f32 = -3.4e38;
    for (var i: u32 = 0u; i < params.vocab_size; i = i + 1u) {
        let v = logits[i] / params.temperature;
        if (v > best_val) {
            best_val = v;
            best_idx = i;
        }
    }
    chosen[0] = best_idx;
}
"#;

const CAST: &str = r#"
// mode: 0 = bf16->f32, 1 = bf16->f16, 2 = f32->f16, 3 = f16->f32.
// bf16/f16 buffers pack two 16-bit elements per u32 word (low half first);
// f32 buffers hold one element per word. The packed-output modes (1, 2)
// dispatch one thread per output WORD, not per element, so two invocations
// never perform a non-atomic read-modify-write on the same word.
struct Uniforms {
    num_elements: u32,
    mode: u32,
};
@group(0) @binding(0) var<uniform> params: Uniforms;
@group(0) @binding(1) var<storage, read> input: array<u32>;
@group(0) @binding(2) var<storage, read_write> out: array<u32>;

fn half_of(word: u32, lane: u32) -> u32 {
    return select(word & 0xFFFFu, word >> 16u, lane == 1u);
}

fn bf16_bits_to_f32(half: u32) -> f32 {
    return bitcast<f32>(half << 16u);
}

@compute @workgroup_size(256, 1, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (params.mode == 0u) {
        if (gid.x >= params.num_elements) { return; }
        let half = half_of(input[gid.x / 2u], gid.x % 2u);
        out[gid.x] = bitcast<u32>(bf16_bits_to_f32(half));
        return;
    }
    if (params.mode == 3u) {
        if (gid.x >= params.num_elements) { return; }
        let value = unpack2x16float(input[gid.x / 2u])[gid.x % 2u];
        out[gid.x] = bitcast<u32>(value);
        return;
    }

    // mode 1 (bf16->f16) or mode 2 (f32->f16): gid.x indexes an output word.
    let lo_idx = gid.x * 2u;
    if (lo_idx >= params.num_elements) { return; }
    let hi_idx = lo_idx + 1u;
    var lo_val: f32;
    var hi_val: f32 = 0.0;
    if (params.mode == 1u) {
        lo_val = bf16_bits_to_f32(half_of(input[lo_idx / 2u], lo_idx % 2u));
        if (hi_idx < params.num_elements) {
            hi_val = bf16_bits_to_f32(half_of(input[hi_idx / 2u], hi_idx % 2u));
        }
    } else {
        lo_val = bitcast<f32>(input[lo_idx]);
        if (hi_idx < params.num_elements) { hi_val = bitcast<f32>(input[hi_idx]); }
    }
    out[gid.x] = pack2x16float(vec2<f32>(lo_val, hi_val));
}
"#;
