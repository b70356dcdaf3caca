//! GPU buffer lifecycle: bucketed pooling (C3) and content-addressed
//! uniform caching (C4).

pub mod buffer_pool;
pub mod uniform_cache;

pub use buffer_pool::{BufferPool, BufferUsageKind};
pub use uniform_cache::UniformCache;
