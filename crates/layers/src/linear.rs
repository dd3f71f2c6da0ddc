//! Position-wise linear projections for sentence blocks.
//!
//! A projection maps every position of a `(batch, in_dim, length)` block to
//! `(batch, out_dim, length)` with the same weight matrix, i.e. a 1x1
//! convolution over the length axis. Internally the block is folded into
//! `(batch * length, in_dim)` rows with [`crate::sentence`] helpers, multiplied
//! by the transposed `(out_dim, in_dim)` weight and unfolded again.
//!
//! Parameters are stored as [`Var`]s so an external optimiser can update them
//! in place; every clone of a `Var` observes the update.

use candle_core::{bail, DType, Device, Result, Tensor, Var};

use crate::{checks, sentence};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Same projection without the bias term.
    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }
}

/// Weight initialisation policies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinearInit {
    /// LeCun uniform: `U(-sqrt(3 / fan_in), sqrt(3 / fan_in))`.
    LecunUniform,
    /// Glorot/Xavier normal: `N(0, sqrt(2 / (fan_in + fan_out)))`.
    GlorotNormal,
}

impl LinearInit {
    /// Samples an `f32` matrix shaped `(fan_out, fan_in)`.
    pub fn sample(&self, shape: (usize, usize), device: &Device) -> Result<Tensor> {
        let (fan_out, fan_in) = shape;
        if fan_in == 0 || fan_out == 0 {
            bail!("cannot initialise a {fan_out}x{fan_in} weight");
        }
        match self {
            LinearInit::LecunUniform => {
                let bound = (3.0f64 / fan_in as f64).sqrt() as f32;
                Tensor::rand(-bound, bound, shape, device)
            }
            LinearInit::GlorotNormal => {
                let std = (2.0f64 / (fan_in + fan_out) as f64).sqrt() as f32;
                Tensor::randn(0f32, std, shape, device)
            }
        }
    }
}

/// Dense affine projection applied independently at every position.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Var,
    bias: Option<Var>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        checks::expect_shape("linear.weight", &weight, &[config.output_dim, config.input_dim])?;
        checks::expect_dtype_in("linear.weight", &weight, &[DType::F32])?;
        match (config.bias, &bias) {
            (true, Some(b)) => checks::expect_shape("linear.bias", b, &[config.output_dim])?,
            (false, None) => {}
            (true, None) => bail!("linear config expects a bias but none was supplied"),
            (false, Some(_)) => bail!("linear bias supplied but config disables bias"),
        }
        Ok(Self {
            config,
            weight: Var::from_tensor(&weight)?,
            bias: bias.map(|b| Var::from_tensor(&b)).transpose()?,
        })
    }

    /// Builds a linear layer with randomly initialised weights and zero bias.
    pub fn with_init(config: LinearConfig, init: LinearInit, device: &Device) -> Result<Self> {
        let weight = init.sample((config.output_dim, config.input_dim), device)?;
        log::trace!(
            "linear init {}->{} policy={init:?} bias={}",
            config.input_dim,
            config.output_dim,
            config.bias
        );
        let bias = if config.bias {
            Some(Tensor::zeros(config.output_dim, DType::F32, device)?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Returns the `(output_dim, input_dim)` weight.
    pub fn weight(&self) -> &Tensor {
        self.weight.as_tensor()
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref().map(Var::as_tensor)
    }

    /// Applies the projection to `(rows, input_dim)` position rows.
    pub fn forward_rows(&self, rows: &Tensor) -> Result<Tensor> {
        let (_, in_dim) = rows.dims2()?;
        if in_dim != self.config.input_dim {
            bail!(
                "linear.input expected {} units, got {}",
                self.config.input_dim,
                in_dim
            );
        }
        let output = rows.matmul(&self.weight.as_tensor().t()?)?;
        match &self.bias {
            Some(bias) => output.broadcast_add(bias.as_tensor()),
            None => Ok(output),
        }
    }

    /// Applies the projection to a `(batch, input_dim, length)` sentence block.
    pub fn forward(&self, block: &Tensor) -> Result<Tensor> {
        let (batch, _, length) =
            checks::expect_sentence_block("linear.input", block, self.config.input_dim)?;
        let rows = sentence::to_position_rows(block)?;
        let projected = self.forward_rows(&rows)?;
        sentence::from_position_rows(&projected, batch, length)
    }

    /// Trainable parameters under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = vec![(format!("{scope}.weight"), self.weight.clone())];
        if let Some(bias) = &self.bias {
            params.push((format!("{scope}.bias"), bias.clone()));
        }
        params
    }
}
