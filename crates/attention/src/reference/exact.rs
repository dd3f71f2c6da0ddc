//! Exact pseudo-batched attention kernel.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::core::{Attention, AttentionError};
use crate::masks::MASK_DTYPE;

/// Numerically exact attention over `(n, head_dim, length)` tensors.
#[derive(Debug, Default)]
pub struct ExactAttention {
    first_call: OnceLock<()>,
}

impl ExactAttention {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Attention for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
    ) -> Result<Tensor, AttentionError> {
        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::InvalidShape {
                context: "q, k, v must reside on the same device".to_string(),
            });
        }
        if q.dtype() != DType::F32 || k.dtype() != DType::F32 || v.dtype() != DType::F32 {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "q, k, v must be f32, got {:?}/{:?}/{:?}",
                    q.dtype(),
                    k.dtype(),
                    v.dtype()
                ),
            });
        }

        let (n, head_dim, q_len) = q.dims3().map_err(|_| AttentionError::InvalidShape {
            context: format!("q must have shape (n, head_dim, q_len), got {:?}", q.dims()),
        })?;
        let (kn, kd, k_len) = k.dims3().map_err(|_| AttentionError::InvalidShape {
            context: format!("k must have shape (n, head_dim, k_len), got {:?}", k.dims()),
        })?;
        if kn != n || kd != head_dim {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "k shape mismatch: expected ({n}, {head_dim}, _) got ({kn}, {kd}, {k_len})"
                ),
            });
        }
        if v.dims() != [n, head_dim, k_len] {
            return Err(AttentionError::InvalidShape {
                context: format!(
                    "v shape mismatch: expected ({n}, {head_dim}, {k_len}) got {:?}",
                    v.dims()
                ),
            });
        }

        if self.first_call.set(()).is_ok() {
            log::debug!(
                "attention::reference first call n={n} head_dim={head_dim} q_len={q_len} k_len={k_len} masked={}",
                mask.is_some()
            );
        }

        // (n, q_len, k_len)
        let scale = 1.0 / (head_dim as f64).sqrt();
        let scores = (q.transpose(1, 2)?.contiguous()?.matmul(&k.contiguous()?)? * scale)?;

        let probs = match mask {
            Some(mask) => {
                if mask.dtype() != MASK_DTYPE {
                    return Err(AttentionError::InvalidShape {
                        context: format!(
                            "mask expects dtype {MASK_DTYPE:?}, got {:?}",
                            mask.dtype()
                        ),
                    });
                }
                if mask.dims() != [n, q_len, k_len] {
                    return Err(AttentionError::InvalidShape {
                        context: format!(
                            "mask shape mismatch: expected ({n}, {q_len}, {k_len}) got {:?}",
                            mask.dims()
                        ),
                    });
                }
                let blocked = Tensor::full(f32::NEG_INFINITY, scores.dims(), device)?;
                let scores = mask.where_cond(&scores, &blocked)?;
                let probs = softmax_last_dim(&scores)?;

                // Rows without a single permitted key come out of the softmax
                // as NaN; they must contribute nothing.
                let has_key = mask
                    .to_dtype(DType::F32)?
                    .sum_keepdim(2)?
                    .gt(0f32)?
                    .broadcast_as(probs.shape())?
                    .contiguous()?;
                has_key.where_cond(&probs, &probs.zeros_like()?)?
            }
            None => softmax_last_dim(&scores)?,
        };

        // (n, head_dim, k_len) x (n, k_len, q_len) -> (n, head_dim, q_len)
        let output = v.contiguous()?.matmul(&probs.transpose(1, 2)?.contiguous()?)?;
        Ok(output)
    }
}
