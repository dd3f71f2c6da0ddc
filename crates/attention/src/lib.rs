//! Masked multi-head attention over sentence blocks.
//!
//! Inputs and outputs follow the `(batch, units, length)` layout of the
//! `layers` crate. [`MultiHeadAttention`] projects queries, keys and values,
//! splits the unit axis into heads and stacks them along the batch axis (a
//! *pseudo-batch* of `heads * batch` entries, head-major) so a single batched
//! kernel computes every head at once.
//!
//! Masks are `u8` tensors shaped `(batch, query_len, key_len)` with `1` where
//! attention is permitted. A query whose row is entirely masked attends to
//! nothing and yields an exact zero vector rather than `NaN`.

pub mod core;
pub mod masks;
pub mod multi_head;
pub mod reference;

pub use core::{Attention, AttentionConfig, AttentionError, AttentionKind};
pub use multi_head::MultiHeadAttention;
pub use reference::ExactAttention;
