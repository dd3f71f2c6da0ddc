//! Token embedding table and tied vocabulary readout.

use candle_core::{bail, DType, Device, Result, Tensor, Var};
use layers::{checks, sentence, LinearInit};

/// How the embedding table is sampled at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInit {
    /// `U(-sqrt(3 / hidden_dim), sqrt(3 / hidden_dim))`.
    LecunUniform,
    /// `N(0, 1)`.
    StandardNormal,
}

/// Configuration for building a token embedding table.
#[derive(Debug, Clone)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
    pub init: EmbeddingInit,
    /// Device hosting the parameters.
    pub device: Device,
}

/// Learnable `(vocab_size, hidden_dim)` lookup table.
///
/// Negative ids are padding: they look up a zero vector instead of a row of
/// the table. The same table doubles as the output projection through
/// [`TokenEmbedding::linear_out`], so updates to the weight `Var` are seen by
/// both the lookup and the readout.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Var,
}

impl TokenEmbedding {
    /// Builds a new embedding table sampled according to `config.init`.
    pub fn new(config: TokenEmbeddingConfig) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        let shape = (config.vocab_size, config.hidden_dim);
        let initial = match config.init {
            EmbeddingInit::LecunUniform => LinearInit::LecunUniform.sample(shape, &config.device)?,
            EmbeddingInit::StandardNormal => Tensor::randn(0f32, 1f32, shape, &config.device)?,
        };
        Ok(Self {
            weight: Var::from_tensor(&initial)?,
            config,
        })
    }

    /// Wraps an existing `(vocab_size, hidden_dim)` table.
    pub fn from_weight(weight: Tensor, init: EmbeddingInit) -> Result<Self> {
        checks::expect_rank("embedding.weight", &weight, 2)?;
        checks::expect_dtype_in("embedding.weight", &weight, &[DType::F32])?;
        let (vocab_size, hidden_dim) = weight.dims2()?;
        let config = TokenEmbeddingConfig {
            vocab_size,
            hidden_dim,
            init,
            device: weight.device().clone(),
        };
        Ok(Self {
            weight: Var::from_tensor(&weight)?,
            config,
        })
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    pub fn hidden_dim(&self) -> usize {
        self.config.hidden_dim
    }

    /// The `(vocab_size, hidden_dim)` table.
    pub fn weight(&self) -> &Tensor {
        self.weight.as_tensor()
    }

    /// Looks up a `(batch, length)` block of ids.
    ///
    /// Returns a `(batch, hidden_dim, length)` sentence block; padding
    /// positions (negative ids) are zero vectors.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, length) = checks::expect_token_block("token_ids", token_ids)?;
        let ids = token_ids.to_dtype(DType::I64)?.flatten_all()?;

        let valid = ids.ge(0i64)?;
        let lookup_ids = valid.where_cond(&ids, &ids.zeros_like()?)?;
        self.ensure_id_range(&lookup_ids)?;

        let rows = self.weight.as_tensor().index_select(&lookup_ids, 0)?;
        let keep = valid.to_dtype(DType::F32)?.unsqueeze(1)?;
        let rows = rows.broadcast_mul(&keep)?;
        sentence::from_position_rows(&rows, batch, length)
    }

    /// Projects `(rows, hidden_dim)` hidden states onto the vocabulary with
    /// the transposed table, yielding `(rows, vocab_size)` logits. No bias.
    pub fn linear_out(&self, rows: &Tensor) -> Result<Tensor> {
        let (_, hidden_dim) = rows.dims2()?;
        if hidden_dim != self.config.hidden_dim {
            bail!(
                "linear_out expected hidden dim {} but received {}",
                self.config.hidden_dim,
                hidden_dim
            );
        }
        rows.matmul(&self.weight.as_tensor().t()?)
    }

    /// Returns the trainable parameters for this embedding under `scope`.
    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        vec![(format!("{scope}.weight"), self.weight.clone())]
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            bail!("token id {max_id} exceeds vocab size {vocab}");
        }
        Ok(())
    }
}
