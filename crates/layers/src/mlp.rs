//! Position-wise feed-forward block.
//!
//! `units -> expansion * units -> units` with a ReLU in between, applied to
//! each position of a `(batch, units, length)` block independently. The
//! default expansion ratio is 4.

use candle_core::{Device, Result, Tensor, Var};

use crate::linear::{Linear, LinearConfig, LinearInit};

/// Inner width multiplier used by the encoder and decoder layers.
pub const DEFAULT_EXPANSION: usize = 4;

/// Configuration for [`FeedForward`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
}

impl FeedForwardConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self::with_expansion(hidden_size, DEFAULT_EXPANSION)
    }

    pub fn with_expansion(hidden_size: usize, expansion: usize) -> Self {
        Self {
            hidden_size,
            intermediate_size: hidden_size * expansion,
        }
    }
}

/// Two biased projections around a ReLU.
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    w_1: Linear,
    w_2: Linear,
}

impl FeedForward {
    pub fn new(config: FeedForwardConfig, w_1: Linear, w_2: Linear) -> Result<Self> {
        let up = w_1.config();
        let down = w_2.config();
        if up.input_dim != config.hidden_size
            || up.output_dim != config.intermediate_size
            || down.input_dim != config.intermediate_size
            || down.output_dim != config.hidden_size
        {
            candle_core::bail!(
                "feed-forward projections {}->{} / {}->{} do not match {}->{}->{}",
                up.input_dim,
                up.output_dim,
                down.input_dim,
                down.output_dim,
                config.hidden_size,
                config.intermediate_size,
                config.hidden_size
            );
        }
        Ok(Self { config, w_1, w_2 })
    }

    pub fn with_init(config: FeedForwardConfig, init: LinearInit, device: &Device) -> Result<Self> {
        let w_1 = Linear::with_init(
            LinearConfig::new(config.hidden_size, config.intermediate_size),
            init,
            device,
        )?;
        let w_2 = Linear::with_init(
            LinearConfig::new(config.intermediate_size, config.hidden_size),
            init,
            device,
        )?;
        Self::new(config, w_1, w_2)
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    pub fn forward(&self, block: &Tensor) -> Result<Tensor> {
        let inner = self.w_1.forward(block)?.relu()?;
        self.w_2.forward(&inner)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self.w_1.named_parameters(&format!("{scope}.w_1"));
        params.extend(self.w_2.named_parameters(&format!("{scope}.w_2")));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, IndexOp};

    #[test]
    fn feed_forward_keeps_block_shape_and_expands_inside() -> Result<()> {
        let device = Device::Cpu;
        let ff = FeedForward::with_init(FeedForwardConfig::new(8), LinearInit::LecunUniform, &device)?;
        assert_eq!(ff.config().intermediate_size, 32);
        let block = Tensor::randn(0f32, 1.0, (3, 8, 5), &device)?;
        assert_eq!(ff.forward(&block)?.dims(), &[3, 8, 5]);
        Ok(())
    }

    #[test]
    fn positions_do_not_mix() -> Result<()> {
        let device = Device::Cpu;
        let ff = FeedForward::with_init(FeedForwardConfig::new(4), LinearInit::LecunUniform, &device)?;
        let block = Tensor::randn(0f32, 1.0, (1, 4, 3), &device)?;
        let full = ff.forward(&block)?;

        // Perturbing position 2 must leave positions 0 and 1 untouched.
        let perturbed = Tensor::cat(
            &[&block.narrow(2, 0, 2)?, &Tensor::ones((1, 4, 1), DType::F32, &device)?],
            2,
        )?;
        let partial = ff.forward(&perturbed)?;
        let diff = full
            .i((.., .., 0..2))?
            .sub(&partial.i((.., .., 0..2))?)?
            .abs()?
            .max_all()?
            .to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }

    #[test]
    fn relu_clips_negative_inner_activations() -> Result<()> {
        let device = Device::Cpu;
        let config = FeedForwardConfig::with_expansion(1, 1);
        let w_1 = Linear::new(
            LinearConfig::new(1, 1),
            Tensor::new(&[[1f32]], &device)?,
            Some(Tensor::new(&[0f32], &device)?),
        )?;
        let w_2 = Linear::new(
            LinearConfig::new(1, 1),
            Tensor::new(&[[2f32]], &device)?,
            Some(Tensor::new(&[0.5f32], &device)?),
        )?;
        let ff = FeedForward::new(config, w_1, w_2)?;
        let block = Tensor::new(&[[[-3f32, 1.5]]], &device)?;
        assert_eq!(
            ff.forward(&block)?.flatten_all()?.to_vec1::<f32>()?,
            vec![0.5, 3.5]
        );
        Ok(())
    }
}
