//! Attention variant selection (§4.8). Decode-path resolution is checked
//! before the tier ladder since the spec's boundary test fixes concrete
//! decode variants at exact `kvLen` cutoffs, independent of shared-memory
//! tier.

use crate::constants::{
    ATTENTION_CHUNKED_MAX_KV_LEN, ATTENTION_CHUNKED_MIN_HEAD_DIM, ATTENTION_SUBGROUP_MAX_HEAD_DIM,
    ATTENTION_SUBGROUP_MAX_KV_LEN, ATTENTION_SUBGROUP_MIN_SHARED, ATTENTION_TILED_LARGE_MAX_HEAD_DIM,
    ATTENTION_TILED_LARGE_MIN_SHARED, ATTENTION_TILED_SMALL_MAX_HEAD_DIM,
    ATTENTION_TILED_SMALL_MIN_SHARED, ATTENTION_TILED_SMALL_MIN_SHARED_F16KV,
};
use crate::device::Capability;
use crate::error::KernelResult;
use crate::selector::{resolve_override, validate_heuristic_pick};

#[derive(Debug, Clone, Copy)]
pub struct AttentionSelectionInput {
    pub is_decode: bool,
    pub use_f16_kv: bool,
    pub head_dim: u32,
    pub kv_len: u32,
    pub shared_memory_bytes: u32,
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    TiledLarge,
    TiledSmall,
    Streaming,
}

fn tier_for(head_dim: u32, shared_memory_bytes: u32, use_f16_kv: bool) -> Tier {
    if head_dim <= ATTENTION_TILED_LARGE_MAX_HEAD_DIM && shared_memory_bytes >= ATTENTION_TILED_LARGE_MIN_SHARED {
        Tier::TiledLarge
    } else {
        let small_min_shared = if use_f16_kv {
            ATTENTION_TILED_SMALL_MIN_SHARED_F16KV
        } else {
            ATTENTION_TILED_SMALL_MIN_SHARED
        };
        if head_dim <= ATTENTION_TILED_SMALL_MAX_HEAD_DIM && shared_memory_bytes >= small_min_shared {
            Tier::TiledSmall
        } else {
            Tier::Streaming
        }
    }
}

pub fn select_attention(
    input: AttentionSelectionInput,
    capability: &Capability,
    override_variant: Option<&str>,
) -> KernelResult<String> {
    if let Some(v) = resolve_override("attention", override_variant, input.strict, capability)? {
        return Ok(v);
    }

    let picked = if input.is_decode && input.use_f16_kv {
        if input.head_dim >= ATTENTION_CHUNKED_MIN_HEAD_DIM && input.kv_len <= ATTENTION_CHUNKED_MAX_KV_LEN {
            "decode_chunked_f16kv"
        } else {
            "decode_streaming_f16kv"
        }
    } else if input.is_decode
        && !input.use_f16_kv
        && capability.has_feature("subgroups")
        && input.head_dim <= ATTENTION_SUBGROUP_MAX_HEAD_DIM
        && input.kv_len <= ATTENTION_SUBGROUP_MAX_KV_LEN
        && input.shared_memory_bytes >= ATTENTION_SUBGROUP_MIN_SHARED
    {
        "decode_subgroup"
    } else {
        match tier_for(input.head_dim, input.shared_memory_bytes, input.use_f16_kv) {
            Tier::TiledLarge => "tiled_large",
            Tier::TiledSmall => "tiled_small",
            Tier::Streaming => "streaming",
        }
    };

    validate_heuristic_pick("attention", picked, capability)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(features: Vec<&'static str>) -> Capability {
        Capability {
            adapter_name: "test".to_string(),
            vendor: 0,
            device_id: 0,
            backend: wgpu::Backend::Vulkan,
            features,
            limits: wgpu::Limits::default(),
        }
    }

    #[test]
    fn chunked_f16kv_at_exact_boundary() {
        let cap = capability(vec!["f16"]);
        let input = AttentionSelectionInput {
            is_decode: true,
            use_f16_kv: true,
            head_dim: 128,
            kv_len: ATTENTION_CHUNKED_MAX_KV_LEN,
            shared_memory_bytes: 0,
            strict: false,
        };
        assert_eq!(select_attention(input, &cap, None).unwrap(), "decode_chunked_f16kv");
    }

    #[test]
    fn one_past_chunked_boundary_falls_to_streaming_f16kv() {
        let cap = capability(vec!["f16"]);
        let input = AttentionSelectionInput {
            is_decode: true,
            use_f16_kv: true,
            head_dim: 128,
            kv_len: ATTENTION_CHUNKED_MAX_KV_LEN + 1,
            shared_memory_bytes: 0,
            strict: false,
        };
        assert_eq!(select_attention(input, &cap, None).unwrap(), "decode_streaming_f16kv");
    }

    #[test]
    fn decode_subgroup_picked_for_non_f16_kv_decode() {
        let cap = capability(vec!["subgroups"]);
        let input = AttentionSelectionInput {
            is_decode: true,
            use_f16_kv: false,
            head_dim: 64,
            kv_len: 512,
            shared_memory_bytes: ATTENTION_SUBGROUP_MIN_SHARED,
            strict: false,
        };
        assert_eq!(select_attention(input, &cap, None).unwrap(), "decode_subgroup");
    }

    #[test]
    fn prefill_picks_tiled_large_when_shared_memory_is_generous() {
        let cap = capability(vec![]);
        let input = AttentionSelectionInput {
            is_decode: false,
            use_f16_kv: false,
            head_dim: 64,
            kv_len: 4096,
            shared_memory_bytes: ATTENTION_TILED_LARGE_MIN_SHARED,
            strict: false,
        };
        assert_eq!(select_attention(input, &cap, None).unwrap(), "tiled_large");
    }

    #[test]
    fn prefill_falls_back_to_streaming_when_shared_memory_is_scarce() {
        let cap = capability(vec![]);
        let input = AttentionSelectionInput {
            is_decode: false,
            use_f16_kv: false,
            head_dim: 512,
            kv_len: 4096,
            shared_memory_bytes: 1024,
            strict: false,
        };
        assert_eq!(select_attention(input, &cap, None).unwrap(), "streaming");
    }
}
