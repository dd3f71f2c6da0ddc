//! Lightweight validation helpers shared across layer components.
//!
//! These routines provide concise shape and dtype assertions that can be wired
//! into constructors or forward paths. They return `candle_core::Result<()>`
//! so call sites can propagate errors without panicking.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(label: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label} expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Ensures a tensor has the requested number of axes.
pub fn expect_rank(label: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let actual = tensor.rank();
    if actual == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label} expected rank {rank}, got {actual} ({:?})",
            tensor.dims()
        )))
    }
}

/// Validates the `(batch, units, length)` sentence-block convention and
/// returns the three extents.
pub fn expect_sentence_block(label: &str, tensor: &Tensor, units: usize) -> Result<(usize, usize, usize)> {
    match tensor.dims() {
        [batch, actual_units, length] if *actual_units == units => Ok((*batch, units, *length)),
        [_, actual_units, _] => Err(Error::Msg(format!(
            "{label} expected {units} units, got {actual_units}"
        ))),
        dims => Err(Error::Msg(format!(
            "{label} expected (batch, {units}, length) layout, got {dims:?}"
        ))),
    }
}

/// Validates a rectangular `(batch, length)` block of token ids.
pub fn expect_token_block(label: &str, tensor: &Tensor) -> Result<(usize, usize)> {
    let (batch, length) = match tensor.dims() {
        [batch, length] => (*batch, *length),
        dims => {
            return Err(Error::Msg(format!(
                "{label} must be shaped (batch, length), got {dims:?}"
            )))
        }
    };
    if batch == 0 || length == 0 {
        return Err(Error::Msg(format!(
            "{label} must have non-zero batch and length, got ({batch}, {length})"
        )));
    }
    if !tensor.dtype().is_int() {
        return Err(Error::Msg(format!(
            "{label} expected integer dtype, got {:?}",
            tensor.dtype()
        )));
    }
    Ok((batch, length))
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(label: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label} expected dtype in {allowed:?}, got {dtype:?}"
        )))
    }
}
