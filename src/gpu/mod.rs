//! Shader/pipeline caching (C5) and the Tensor/WeightBuffer handle (C7).

pub mod pipeline_cache;
pub mod tensor;

pub use pipeline_cache::{PipelineCache, PipelineCacheStats};
pub use tensor::{infer_output_dtype, DType, Layout, Tensor, WeightBuffer};
