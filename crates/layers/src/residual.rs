//! Post-norm residual connection: `norm(input + dropout(branch))`.
//!
//! Both operands are `(batch, units, length)` sentence blocks of identical
//! shape; the branch is whatever sub-layer (attention or feed-forward) ran on
//! `input`.

use candle_core::{Device, Result, Tensor, Var};

use crate::{
    checks,
    dropout::{Dropout, TrainingFlag},
    norm::{LayerNorm, NormConfig},
};

/// Residual add, dropout on the branch, then layer normalisation.
#[derive(Debug, Clone)]
pub struct Residual {
    dropout: Dropout,
    norm: LayerNorm,
}

impl Residual {
    pub fn new(dropout: Dropout, norm: LayerNorm) -> Self {
        Self { dropout, norm }
    }

    /// Identity-initialised norm over `units` features with the given dropout.
    pub fn with_units(
        units: usize,
        dropout_p: f32,
        training: TrainingFlag,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self::new(
            Dropout::new(dropout_p, training)?,
            LayerNorm::identity(NormConfig::new(units), device)?,
        ))
    }

    pub fn norm(&self) -> &LayerNorm {
        &self.norm
    }

    /// Computes `norm(input + dropout(branch))`.
    pub fn forward(&self, input: &Tensor, branch: &Tensor) -> Result<Tensor> {
        checks::expect_shape("residual.branch", branch, input.dims())?;
        let dropped = self.dropout.forward(branch)?;
        self.norm.forward(&(input + dropped)?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.norm.named_parameters(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn residual_normalises_the_sum() -> Result<()> {
        let device = Device::Cpu;
        let residual = Residual::with_units(4, 0.0, TrainingFlag::default(), &device)?;
        let input = Tensor::randn(0f32, 1.0, (2, 4, 3), &device)?;
        let branch = Tensor::randn(0f32, 1.0, (2, 4, 3), &device)?;

        let out = residual.forward(&input, &branch)?;
        let expected = residual.norm().forward(&(&input + &branch)?)?;
        let diff = out.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert_eq!(diff, 0.0);
        Ok(())
    }

    #[test]
    fn branch_shape_must_match_input() -> Result<()> {
        let device = Device::Cpu;
        let residual = Residual::with_units(4, 0.1, TrainingFlag::new(false), &device)?;
        let input = Tensor::zeros((2, 4, 3), DType::F32, &device)?;
        let branch = Tensor::zeros((2, 4, 2), DType::F32, &device)?;
        assert!(residual.forward(&input, &branch).is_err());
        Ok(())
    }
}
