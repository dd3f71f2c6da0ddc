//! Construction-time options for [`MultiHeadAttention`](crate::MultiHeadAttention).

use super::AttentionError;

/// Where keys and values come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionKind {
    /// Queries, keys and values are all projected from the same block.
    SelfAttention,
    /// Queries come from one block, keys and values from another.
    Cross,
}

/// Width, head count and source of keys/values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionConfig {
    pub units: usize,
    pub heads: usize,
    pub kind: AttentionKind,
}

impl AttentionConfig {
    pub fn new(units: usize, heads: usize, kind: AttentionKind) -> Self {
        Self { units, heads, kind }
    }

    /// Width of one head.
    pub fn head_dim(&self) -> usize {
        self.units / self.heads
    }

    pub fn validate(&self) -> Result<(), AttentionError> {
        if self.units == 0 || self.heads == 0 {
            return Err(AttentionError::InvalidConfig(format!(
                "units ({}) and heads ({}) must be positive",
                self.units, self.heads
            )));
        }
        if self.units % self.heads != 0 {
            return Err(AttentionError::InvalidConfig(format!(
                "units ({}) must be divisible by heads ({})",
                self.units, self.heads
            )));
        }
        Ok(())
    }
}
