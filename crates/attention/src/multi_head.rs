//! Multi-head attention over `(batch, units, length)` sentence blocks.
//!
//! Self-attention projects queries, keys and values from one block with a
//! single fused `units -> 3 * units` projection. Cross-attention projects
//! queries from the decoder block and keys/values from the encoder block with
//! a fused `units -> 2 * units` projection. None of the projections, including
//! the finishing one, carry a bias.

use candle_core::{Device, Tensor, Var};
use layers::{checks, Linear, LinearConfig, LinearInit};

use crate::core::{Attention, AttentionConfig, AttentionError, AttentionKind};
use crate::masks::MASK_DTYPE;
use crate::reference::ExactAttention;

#[derive(Debug, Clone)]
enum Projections {
    SelfAttention { w_qkv: Linear },
    Cross { w_q: Linear, w_kv: Linear },
}

/// Masked scaled dot-product attention with `heads` parallel heads.
#[derive(Debug)]
pub struct MultiHeadAttention {
    config: AttentionConfig,
    projections: Projections,
    finishing: Linear,
    kernel: ExactAttention,
}

impl MultiHeadAttention {
    /// LeCun-uniform projections for the given configuration.
    pub fn new(config: AttentionConfig, device: &Device) -> Result<Self, AttentionError> {
        config.validate()?;
        let units = config.units;
        let projection = |out_dim: usize| {
            Linear::with_init(
                LinearConfig::new(units, out_dim).without_bias(),
                LinearInit::LecunUniform,
                device,
            )
        };
        let projections = match config.kind {
            AttentionKind::SelfAttention => Projections::SelfAttention {
                w_qkv: projection(3 * units)?,
            },
            AttentionKind::Cross => Projections::Cross {
                w_q: projection(units)?,
                w_kv: projection(2 * units)?,
            },
        };
        let finishing = projection(units)?;
        log::debug!(
            "multi-head attention kind={:?} units={} heads={}",
            config.kind,
            config.units,
            config.heads
        );
        Ok(Self {
            config,
            projections,
            finishing,
            kernel: ExactAttention::new(),
        })
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    /// Attends from the queries of `x` to the keys of `z` (or of `x` itself
    /// for self-attention).
    ///
    /// * `x`: `(batch, units, q_len)`
    /// * `z`: `(batch, units, k_len)`; required for cross-attention, must be
    ///   `None` for self-attention
    /// * `mask`: `(batch, q_len, k_len)` `u8`
    ///
    /// Returns `(batch, units, q_len)`.
    pub fn forward(
        &self,
        x: &Tensor,
        z: Option<&Tensor>,
        mask: &Tensor,
    ) -> Result<Tensor, AttentionError> {
        let units = self.config.units;
        let (batch, _, q_len) = checks::expect_sentence_block("attention.query", x, units)?;

        let (query, key, value) = match (&self.projections, z) {
            (Projections::SelfAttention { w_qkv }, None) => {
                let qkv = w_qkv.forward(x)?;
                (
                    qkv.narrow(1, 0, units)?,
                    qkv.narrow(1, units, units)?,
                    qkv.narrow(1, 2 * units, units)?,
                )
            }
            (Projections::Cross { w_q, w_kv }, Some(z)) => {
                let (key_batch, _, _) = checks::expect_sentence_block("attention.source", z, units)?;
                if key_batch != batch {
                    return Err(AttentionError::InvalidShape {
                        context: format!("source batch {key_batch} differs from query batch {batch}"),
                    });
                }
                let kv = w_kv.forward(z)?;
                (
                    w_q.forward(x)?,
                    kv.narrow(1, 0, units)?,
                    kv.narrow(1, units, units)?,
                )
            }
            (Projections::SelfAttention { .. }, Some(_)) => {
                return Err(AttentionError::InvalidShape {
                    context: "self-attention takes no separate source block".to_string(),
                })
            }
            (Projections::Cross { .. }, None) => {
                return Err(AttentionError::InvalidShape {
                    context: "cross-attention requires a source block".to_string(),
                })
            }
        };
        let (_, _, k_len) = key.dims3()?;

        if mask.dtype() != MASK_DTYPE || mask.dims() != [batch, q_len, k_len] {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "mask must be {MASK_DTYPE:?} ({batch}, {q_len}, {k_len}), got {:?} {:?}",
                    mask.dtype(),
                    mask.dims()
                ),
            });
        }
        let heads = self.config.heads;
        let pseudo_mask = mask.repeat((heads, 1, 1))?;

        let attended = self.kernel.attend(
            &split_heads(&query, heads)?,
            &split_heads(&key, heads)?,
            &split_heads(&value, heads)?,
            Some(&pseudo_mask),
        )?;
        let merged = merge_heads(&attended, heads, batch)?;
        Ok(self.finishing.forward(&merged)?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = match &self.projections {
            Projections::SelfAttention { w_qkv } => w_qkv.named_parameters(&format!("{scope}.w_qkv")),
            Projections::Cross { w_q, w_kv } => {
                let mut params = w_q.named_parameters(&format!("{scope}.w_q"));
                params.extend(w_kv.named_parameters(&format!("{scope}.w_kv")));
                params
            }
        };
        params.extend(self.finishing.named_parameters(&format!("{scope}.finishing")));
        params
    }
}

/// `(batch, heads * head_dim, length)` -> `(heads * batch, head_dim, length)`.
///
/// Entry `h * batch + b` holds head `h` of sequence `b`.
pub fn split_heads(block: &Tensor, heads: usize) -> candle_core::Result<Tensor> {
    let (batch, units, length) = block.dims3()?;
    block
        .reshape((batch, heads, units / heads, length))?
        .transpose(0, 1)?
        .contiguous()?
        .reshape((heads * batch, units / heads, length))
}

/// Inverse of [`split_heads`].
pub fn merge_heads(pseudo: &Tensor, heads: usize, batch: usize) -> candle_core::Result<Tensor> {
    let (_, head_dim, length) = pseudo.dims3()?;
    pseudo
        .reshape((heads, batch, head_dim, length))?
        .transpose(0, 1)?
        .contiguous()?
        .reshape((batch, heads * head_dim, length))
}
