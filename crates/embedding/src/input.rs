//! Token ids to the first sentence block of an encoder or decoder stack.

use candle_core::{bail, Result, Tensor, Var};
use layers::{checks, Dropout};

use crate::{
    positional::{position_ids, SinusoidalEncoding},
    token::TokenEmbedding,
};

/// `dropout(embed(ids) * sqrt(units) + sinusoid[:length] [+ learned[:length]])`
#[derive(Debug, Clone)]
pub struct InputEmbedding {
    tokens: TokenEmbedding,
    position: SinusoidalEncoding,
    learned: Option<TokenEmbedding>,
    dropout: Dropout,
    scale: f64,
}

impl InputEmbedding {
    pub fn new(
        tokens: TokenEmbedding,
        position: SinusoidalEncoding,
        learned: Option<TokenEmbedding>,
        dropout: Dropout,
    ) -> Result<Self> {
        let units = tokens.hidden_dim();
        if position.units() != units {
            bail!(
                "position table has {} units but the token table has {units}",
                position.units()
            );
        }
        if let Some(learned) = &learned {
            if learned.hidden_dim() != units || learned.vocab_size() != position.max_length() {
                bail!(
                    "learned position table must be ({}, {units}), got ({}, {})",
                    position.max_length(),
                    learned.vocab_size(),
                    learned.hidden_dim()
                );
            }
        }
        Ok(Self {
            tokens,
            position,
            learned,
            dropout,
            scale: (units as f64).sqrt(),
        })
    }

    pub fn tokens(&self) -> &TokenEmbedding {
        &self.tokens
    }

    pub fn units(&self) -> usize {
        self.tokens.hidden_dim()
    }

    /// `(batch, length)` ids -> `(batch, units, length)` block.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, length) = checks::expect_token_block("input_embedding.ids", token_ids)?;
        let position = self.position.slice(length)?;
        let mut block = self
            .tokens
            .forward(token_ids)?
            .affine(self.scale, 0.0)?
            .broadcast_add(&position)?;
        if let Some(learned) = &self.learned {
            let positions = position_ids(batch, length, token_ids.device())?;
            block = (block + learned.forward(&positions)?)?;
        }
        self.dropout.forward(&block)
    }

    /// Parameters of the token table only; a learned position table is shared
    /// between inputs and reported once by its owner.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.tokens.named_parameters(scope)
    }
}
