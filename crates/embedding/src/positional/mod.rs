//! Position information added to token embeddings.
//!
//! [`sinusoidal`] holds the fixed table every model uses; [`learned_positions`]
//! builds the optional trainable table that is added on top of it.

pub mod sinusoidal;

use candle_core::{Device, Result, Tensor};

use crate::token::{EmbeddingInit, TokenEmbedding, TokenEmbeddingConfig};

pub use sinusoidal::{sinusoid_angle, SinusoidalEncoding};

/// Trainable `(max_length, units)` position table sampled from `N(0, 1)`.
pub fn learned_positions(max_length: usize, units: usize, device: &Device) -> Result<TokenEmbedding> {
    TokenEmbedding::new(TokenEmbeddingConfig {
        vocab_size: max_length,
        hidden_dim: units,
        init: EmbeddingInit::StandardNormal,
        device: device.clone(),
    })
}

/// `(batch, length)` block of 0-based position ids.
pub fn position_ids(batch: usize, length: usize, device: &Device) -> Result<Tensor> {
    Tensor::arange(0i64, length as i64, device)?
        .unsqueeze(0)?
        .broadcast_as((batch, length))?
        .contiguous()
}
