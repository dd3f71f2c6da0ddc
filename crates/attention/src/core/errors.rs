//! Error types emitted by attention implementations.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("invalid tensor shape for {context}")]
    InvalidShape { context: String },
    /// Head count and unit width cannot be combined.
    #[error("invalid attention configuration: {0}")]
    InvalidConfig(String),
    /// A backend failure propagated to the caller.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}
