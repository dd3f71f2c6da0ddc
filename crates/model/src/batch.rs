//! Padding variable-length id sequences into rectangular blocks.

use candle_core::{Device, Tensor};

use crate::errors::{ModelError, Result};

/// Id prepended to every source sequence.
pub const BOS_ID: i64 = 2;
/// End-of-sequence id; also the decoder's start token.
pub const EOS_ID: i64 = 0;
/// Fill value for positions past the end of a sequence.
pub const PAD_ID: i64 = -1;

/// Pads `sequences` to the longest one with `pad`, giving a `(batch, max_len)`
/// `i64` block.
pub fn pad_block(sequences: &[Vec<i64>], pad: i64, device: &Device) -> Result<Tensor> {
    if sequences.is_empty() {
        return Err(ModelError::Shape("cannot pad an empty batch".to_string()));
    }
    let width = sequences.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return Err(ModelError::Shape("every sequence in the batch is empty".to_string()));
    }
    let mut data = Vec::with_capacity(sequences.len() * width);
    for sequence in sequences {
        data.extend_from_slice(sequence);
        data.extend(std::iter::repeat(pad).take(width - sequence.len()));
    }
    Ok(Tensor::from_vec(data, (sequences.len(), width), device)?)
}

/// Source block for the encoder: each row is `BOS, sequence..., EOS` followed
/// by `-1` padding, shaped `(batch, max_len + 2)`.
pub fn source_pad_concat_convert(sequences: &[Vec<i64>], device: &Device) -> Result<Tensor> {
    let wrapped: Vec<Vec<i64>> = sequences
        .iter()
        .map(|sequence| {
            let mut row = Vec::with_capacity(sequence.len() + 2);
            row.push(BOS_ID);
            row.extend_from_slice(sequence);
            row.push(EOS_ID);
            row
        })
        .collect();
    pad_block(&wrapped, PAD_ID, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_block_fills_the_tail() -> Result<()> {
        let block = pad_block(&[vec![4, 5, 6], vec![7]], -1, &Device::Cpu)?;
        assert_eq!(block.to_vec2::<i64>()?, vec![vec![4, 5, 6], vec![7, -1, -1]]);
        Ok(())
    }

    #[test]
    fn source_rows_are_wrapped_in_bos_and_eos() -> Result<()> {
        let block = source_pad_concat_convert(&[vec![5, 6, 7], vec![8], vec![]], &Device::Cpu)?;
        assert_eq!(
            block.to_vec2::<i64>()?,
            vec![
                vec![2, 5, 6, 7, 0],
                vec![2, 8, 0, -1, -1],
                vec![2, 0, -1, -1, -1],
            ]
        );
        Ok(())
    }

    #[test]
    fn empty_batches_are_rejected() {
        assert!(matches!(
            source_pad_concat_convert(&[], &Device::Cpu),
            Err(ModelError::Shape(_))
        ));
        assert!(pad_block(&[vec![], vec![]], -1, &Device::Cpu).is_err());
    }
}
