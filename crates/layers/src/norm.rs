//! Position-wise layer normalisation for sentence blocks.
//!
//! Statistics are taken over the `units` axis of every `(batch, position)`
//! pair, never across positions. The block is folded into position rows,
//! normalised along the last axis and unfolded back into
//! `(batch, units, length)`.

use candle_core::{bail, DType, Device, Result, Tensor, Var, D};

use crate::{checks, sentence};

/// Epsilon used by the encoder and decoder normalisation layers.
pub const SENTENCE_NORM_EPSILON: f64 = 1e-9;

/// Configuration for [`LayerNorm`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormConfig {
    /// Size of the feature axis being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the variance.
    pub epsilon: f64,
}

impl NormConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            epsilon: SENTENCE_NORM_EPSILON,
        }
    }
}

/// LayerNorm with a learnable scale (`gamma`) and shift (`beta`).
#[derive(Debug, Clone)]
pub struct LayerNorm {
    config: NormConfig,
    weight: Var,
    bias: Var,
}

impl LayerNorm {
    /// Constructs a LayerNorm from explicit scale and shift vectors.
    pub fn new(weight: Tensor, bias: Tensor, config: NormConfig) -> Result<Self> {
        if config.hidden_size == 0 {
            bail!("layer norm requires a non-zero hidden size");
        }
        checks::expect_shape("norm.weight", &weight, &[config.hidden_size])?;
        checks::expect_shape("norm.bias", &bias, &[config.hidden_size])?;
        checks::expect_dtype_in("norm.weight", &weight, &[DType::F32])?;
        checks::expect_dtype_in("norm.bias", &bias, &[DType::F32])?;
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias: Var::from_tensor(&bias)?,
        })
    }

    /// Identity-initialised LayerNorm (scale one, shift zero).
    pub fn identity(config: NormConfig, device: &Device) -> Result<Self> {
        let weight = Tensor::ones(config.hidden_size, DType::F32, device)?;
        let bias = Tensor::zeros(config.hidden_size, DType::F32, device)?;
        Self::new(weight, bias, config)
    }

    pub fn config(&self) -> &NormConfig {
        &self.config
    }

    /// Normalises `(rows, hidden)` rows along the last axis.
    pub fn forward_rows(&self, rows: &Tensor) -> Result<Tensor> {
        let hidden = self.config.hidden_size as f64;
        let mean = (rows.sum_keepdim(D::Minus1)? / hidden)?;
        let centered = rows.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden)?;
        let denom = (variance + self.config.epsilon)?.sqrt()?;
        centered
            .broadcast_div(&denom)?
            .broadcast_mul(self.weight.as_tensor())?
            .broadcast_add(self.bias.as_tensor())
    }

    /// Normalises a `(batch, hidden, length)` block position by position.
    pub fn forward(&self, block: &Tensor) -> Result<Tensor> {
        let (batch, _, length) =
            checks::expect_sentence_block("norm.input", block, self.config.hidden_size)?;
        let rows = sentence::to_position_rows(block)?;
        let normalized = self.forward_rows(&rows)?;
        sentence::from_position_rows(&normalized, batch, length)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![
            (format!("{scope}.weight"), self.weight.clone()),
            (format!("{scope}.bias"), self.bias.clone()),
        ]
    }
}
