//! Boolean mask builders shared by attention implementations.
//!
//! Every mask is a `u8` tensor shaped `(batch, query_len, key_len)` holding
//! `1` where the query may attend to the key and `0` otherwise. Masks combine
//! with [`mask_and`]; the kernel turns zeros into `-inf` scores.

pub mod causal;
pub mod padding;

use candle_core::{bail, DType, Result, Tensor};

/// Dtype shared by all masks.
pub const MASK_DTYPE: DType = DType::U8;

pub use causal::causal_mask;
pub use padding::padding_mask;

/// Elementwise logical AND of two masks of identical shape.
pub fn mask_and(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    if lhs.dtype() != MASK_DTYPE || rhs.dtype() != MASK_DTYPE {
        bail!(
            "masks must have dtype {MASK_DTYPE:?}, got {:?} and {:?}",
            lhs.dtype(),
            rhs.dtype()
        );
    }
    if lhs.dims() != rhs.dims() {
        bail!(
            "cannot combine masks of shapes {:?} and {:?}",
            lhs.dims(),
            rhs.dims()
        );
    }
    lhs.mul(rhs)
}
