//! `#[repr(C)]` uniform structs written by the launchers before each
//! dispatch (§6). Each is `Pod`/`Zeroable` so it can be viewed as raw bytes
//! for both `queue.write_buffer` and the uniform cache's content hash —
//! the teacher's closure-into-a-DataView pattern, replaced per the
//! redesign notes with a deterministic byte view over a plain struct.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MatmulUniform {
    pub m: u32,
    pub n: u32,
    pub k: u32,
    pub alpha: f32,
    /// `numBlocksPerRow` for q4k-fused variants, else the transpose-B flag.
    pub aux0: u32,
    pub uniform_workgroups_x: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}
const_assert_eq!(std::mem::size_of::<MatmulUniform>(), 32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct AttentionUniform {
    pub num_heads: u32,
    pub num_kv_heads: u32,
    pub head_dim: u32,
    pub kv_len: u32,
    pub seq_len: u32,
    pub scale: f32,
    pub causal: u32,
    pub start_pos: u32,
    pub attn_softcap: f32,
    pub sliding_window: u32,
    pub kv_len_source: u32,
    pub _pad0: u32,
}
const_assert_eq!(std::mem::size_of::<AttentionUniform>(), 48);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RmsNormUniform {
    pub hidden_size: u32,
    pub batch_size: u32,
    pub eps: f32,
    pub has_residual: u32,
}
const_assert_eq!(std::mem::size_of::<RmsNormUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SoftmaxUniform {
    pub inner_size: u32,
    pub outer_size: u32,
    pub temperature: f32,
    pub _pad: u32,
}
const_assert_eq!(std::mem::size_of::<SoftmaxUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RopeUniform {
    pub seq_len: u32,
    pub num_heads: u32,
    pub head_dim: u32,
    pub start_pos: u32,
    pub rope_theta: f32,
    pub scale: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}
const_assert_eq!(std::mem::size_of::<RopeUniform>(), 32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SiluGeluUniform {
    pub size: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}
const_assert_eq!(std::mem::size_of::<SiluGeluUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GatherUniform {
    pub num_tokens: u32,
    pub hidden_size: u32,
    pub vocab_size: u32,
    pub transpose: u32,
}
const_assert_eq!(std::mem::size_of::<GatherUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ResidualUniform {
    pub size: u32,
    pub _pad0: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}
const_assert_eq!(std::mem::size_of::<ResidualUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TopKUniform {
    pub num_tokens: u32,
    pub num_experts: u32,
    pub top_k: u32,
    pub normalize: u32,
}
const_assert_eq!(std::mem::size_of::<TopKUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ScatterAddUniform {
    pub num_tokens: u32,
    pub hidden_size: u32,
    pub top_k: u32,
    pub num_experts: u32,
}
const_assert_eq!(std::mem::size_of::<ScatterAddUniform>(), 16);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SampleUniform {
    pub vocab_size: u32,
    pub top_k: u32,
    pub temperature: f32,
    pub random_value: f32,
    pub pad_token_id: u32,
    pub logit_softcap: f32,
    pub _pad0: u32,
    pub _pad1: u32,
}
const_assert_eq!(std::mem::size_of::<SampleUniform>(), 32);

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CastUniform {
    pub num_elements: u32,
    /// 0 = bf16->f32, 1 = bf16->f16, 2 = f32->f16, 3 = f16->f32.
    pub mode: u32,
    pub _pad1: u32,
    pub _pad2: u32,
}
const_assert_eq!(std::mem::size_of::<CastUniform>(), 16);

/// Every uniform struct in this module implements this so launchers can
/// write bytes to the uniform cache / a buffer without a per-kernel match.
pub trait UniformBytes: Pod {
    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl<T: Pod> UniformBytes for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_uniforms_are_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<MatmulUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<AttentionUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<RmsNormUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<SoftmaxUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<RopeUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<SampleUniform>() % 16, 0);
    }

    #[test]
    fn as_bytes_matches_struct_size() {
        let uniform = RmsNormUniform {
            hidden_size: 4096,
            batch_size: 1,
            eps: 1e-5,
            has_residual: 0,
        };
        assert_eq!(uniform.as_bytes().len(), std::mem::size_of::<RmsNormUniform>());
    }
}
