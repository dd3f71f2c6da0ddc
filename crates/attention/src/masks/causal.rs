//! Retrospective (causal) masks.
//!
//! Query `i` may attend to key `j` iff `j <= i`. The mask depends only on the
//! sequence length and is repeated over the batch.

use candle_core::{Device, Result, Tensor};

/// Lower-triangular `(batch, length, length)` mask, diagonal included.
pub fn causal_mask(device: &Device, batch: usize, length: usize) -> Result<Tensor> {
    let mut data = vec![0u8; batch * length * length];
    for b in 0..batch {
        for q in 0..length {
            let row_start = (b * length + q) * length;
            for slot in &mut data[row_start..=row_start + q] {
                *slot = 1;
            }
        }
    }
    Tensor::from_vec(data, (batch, length, length), device)
}
