//! Core traits and types shared across attention implementations.
//!
//! Kernels operate on pseudo-batched tensors:
//!
//! * `q`: `(n, head_dim, q_len)`
//! * `k`, `v`: `(n, head_dim, k_len)`
//! * `mask`: `(n, q_len, k_len)` with dtype [`MASK_DTYPE`](crate::masks::MASK_DTYPE)
//!
//! and return `(n, head_dim, q_len)`.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::{AttentionConfig, AttentionKind};
pub use errors::AttentionError;

/// Unified interface for scaled dot-product attention kernels.
pub trait Attention {
    /// Computes `v · softmax(mask(qᵀk / sqrt(head_dim)))ᵀ` per pseudo-batch entry.
    ///
    /// Rows of the mask with no permitted key produce zero output.
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor, AttentionError>;
}
