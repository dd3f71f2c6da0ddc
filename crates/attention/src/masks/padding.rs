//! Validity masks derived from padded token-id blocks.
//!
//! A position is valid when its id is non-negative. Attention from query `i`
//! to key `j` is permitted only when both positions are valid.

use candle_core::{bail, Result, Tensor};

use super::MASK_DTYPE;

/// `(batch, q_len)` and `(batch, k_len)` id blocks -> `(batch, q_len, k_len)` mask.
pub fn padding_mask(query_ids: &Tensor, key_ids: &Tensor) -> Result<Tensor> {
    let (batch, q_len) = query_ids.dims2()?;
    let (key_batch, k_len) = key_ids.dims2()?;
    if batch != key_batch {
        bail!("query block has batch {batch} but key block has batch {key_batch}");
    }
    let query_valid = query_ids.ge(0i64)?.to_dtype(MASK_DTYPE)?.unsqueeze(2)?;
    let key_valid = key_ids.ge(0i64)?.to_dtype(MASK_DTYPE)?.unsqueeze(1)?;
    query_valid
        .broadcast_mul(&key_valid)?
        .broadcast_as((batch, q_len, k_len))?
        .contiguous()
}
