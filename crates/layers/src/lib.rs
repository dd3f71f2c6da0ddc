//! Building blocks for transformer layers operating on sentence blocks.
//!
//! A sentence block is a `(batch, units, length)` tensor: one feature vector
//! per position, features on the middle axis. Every layer in this crate is
//! position-wise; the [`sentence`] module holds the reshapes that let 2D
//! operations run over all positions at once.

pub mod checks;
pub mod dropout;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod residual;
pub mod sentence;

pub use dropout::{Dropout, TrainingFlag};
pub use linear::{Linear, LinearConfig, LinearInit};
pub use mlp::{FeedForward, FeedForwardConfig};
pub use norm::{LayerNorm, NormConfig};
pub use residual::Residual;
