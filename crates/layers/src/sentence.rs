//! Reshape utilities between the sentence-block layout and position rows.
//!
//! Every layer in the stack exchanges tensors shaped `(batch, units, length)`.
//! Position-wise operations (projections, layer norm, the vocabulary readout)
//! are plain 2D operations over `(batch * length, units)` rows. The helpers in
//! this module are the only place the two layouts are converted.

use candle_core::{Error, Result, Tensor};

/// `(batch, units, length)` -> `(batch * length, units)`.
///
/// Row `b * length + t` holds the feature vector of position `t` in sequence
/// `b`. The result is contiguous.
pub fn to_position_rows(block: &Tensor) -> Result<Tensor> {
    let (batch, units, length) = block.dims3()?;
    block
        .transpose(1, 2)?
        .contiguous()?
        .reshape((batch * length, units))
}

/// `(batch * length, units)` -> `(batch, units, length)`.
///
/// Inverse of [`to_position_rows`]; `units` is taken from the rows so the
/// feature width may differ from the block the rows were produced from.
pub fn from_position_rows(rows: &Tensor, batch: usize, length: usize) -> Result<Tensor> {
    let (n_rows, units) = rows.dims2()?;
    if n_rows != batch * length {
        return Err(Error::Msg(format!(
            "cannot fold {n_rows} rows into a ({batch}, _, {length}) sentence block"
        )));
    }
    rows.reshape((batch, length, units))?
        .transpose(1, 2)?
        .contiguous()
}

/// Picks the feature vector of one position from every sequence.
///
/// `(batch, units, length)` -> `(batch, units)`.
pub fn select_position(block: &Tensor, position: usize) -> Result<Tensor> {
    let (_, _, length) = block.dims3()?;
    if position >= length {
        return Err(Error::Msg(format!(
            "position {position} out of range for block length {length}"
        )));
    }
    block.narrow(2, position, 1)?.squeeze(2)?.contiguous()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn rows_are_ordered_by_batch_then_position() -> Result<()> {
        // block[b][u][t] = 100 * b + 10 * u + t
        let data: Vec<f32> = (0..2)
            .flat_map(|b| (0..3).flat_map(move |u| (0..4).map(move |t| (100 * b + 10 * u + t) as f32)))
            .collect();
        let block = Tensor::from_vec(data, (2, 3, 4), &Device::Cpu)?;

        let rows = to_position_rows(&block)?;
        assert_eq!(rows.dims(), &[8, 3]);
        // batch 1, position 2 lives at row 1 * 4 + 2.
        assert_eq!(rows.to_vec2::<f32>()?[6], vec![102.0, 112.0, 122.0]);

        let restored = from_position_rows(&rows, 2, 4)?;
        assert_eq!(
            restored.flatten_all()?.to_vec1::<f32>()?,
            block.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn select_position_takes_one_column() -> Result<()> {
        let block = Tensor::arange(0f32, 12.0, &Device::Cpu)?.reshape((1, 3, 4))?;
        let last = select_position(&block, 3)?;
        assert_eq!(last.to_vec2::<f32>()?, vec![vec![3.0, 7.0, 11.0]]);
        assert!(select_position(&block, 4).is_err());
        Ok(())
    }

    #[test]
    fn fold_rejects_wrong_row_count() -> Result<()> {
        let rows = Tensor::zeros((5, 2), candle_core::DType::F32, &Device::Cpu)?;
        assert!(from_position_rows(&rows, 2, 3).is_err());
        Ok(())
    }
}
