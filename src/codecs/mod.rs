//! Cache Codec Implementations
//!
//! Built-in implementations of the [`CacheCodec`](crate::traits::CacheCodec) trait
//! used by the [`Memoizer`](crate::Memoizer) to store typed values in any level.

mod json;
pub use json::JsonCodec;
