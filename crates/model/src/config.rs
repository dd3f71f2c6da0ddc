//! Model hyperparameters, loadable from TOML or JSON.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, Result};

fn default_heads() -> usize {
    8
}

fn default_dropout() -> f32 {
    0.1
}

fn default_max_length() -> usize {
    500
}

/// Hyperparameters of the encoder-decoder [`Transformer`](crate::Transformer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformerConfig {
    /// Depth of both the encoder and the decoder stack. Zero is allowed.
    pub n_layers: usize,
    pub n_source_vocab: usize,
    pub n_target_vocab: usize,
    /// Width of every sentence block.
    pub n_units: usize,
    #[serde(default = "default_heads")]
    pub n_heads: usize,
    /// Dropout on embeddings and on every residual branch.
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    /// Rows of the position tables; no block may be longer.
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub use_label_smoothing: bool,
    /// Adds a learned position table on top of the sinusoidal one.
    #[serde(default)]
    pub embed_position: bool,
}

impl TransformerConfig {
    pub fn new(n_layers: usize, n_source_vocab: usize, n_target_vocab: usize, n_units: usize) -> Self {
        Self {
            n_layers,
            n_source_vocab,
            n_target_vocab,
            n_units,
            n_heads: default_heads(),
            dropout: default_dropout(),
            max_length: default_max_length(),
            use_label_smoothing: false,
            embed_position: false,
        }
    }

    pub fn with_heads(mut self, n_heads: usize) -> Self {
        self.n_heads = n_heads;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_label_smoothing(mut self, enabled: bool) -> Self {
        self.use_label_smoothing = enabled;
        self
    }

    pub fn with_embed_position(mut self, enabled: bool) -> Self {
        self.embed_position = enabled;
        self
    }

    /// Reads a `.toml` (or extension-less) or `.json` file and validates it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: TransformerConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => {
                return Err(ModelError::Config(format!(
                    "unsupported configuration extension '{other}'"
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.n_source_vocab == 0 {
            errors.push("n_source_vocab must be greater than 0".to_string());
        }
        if self.n_target_vocab == 0 {
            errors.push("n_target_vocab must be greater than 0".to_string());
        }
        if self.n_units == 0 || self.n_units % 2 != 0 {
            errors.push(format!("n_units must be a positive even number, got {}", self.n_units));
        }
        if self.n_heads == 0 {
            errors.push("n_heads must be greater than 0".to_string());
        } else if self.n_units % self.n_heads != 0 {
            errors.push(format!(
                "n_units ({}) must be divisible by n_heads ({})",
                self.n_units, self.n_heads
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            errors.push(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        if self.max_length == 0 {
            errors.push("max_length must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Config(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_base_model() {
        let config = TransformerConfig::new(6, 100, 120, 512);
        assert_eq!(config.n_heads, 8);
        assert_eq!(config.dropout, 0.1);
        assert_eq!(config.max_length, 500);
        assert!(!config.use_label_smoothing);
        assert!(!config.embed_position);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_reports_every_problem() {
        let config = TransformerConfig::new(1, 0, 10, 10)
            .with_heads(4)
            .with_dropout(1.0);
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("n_source_vocab"));
        assert!(message.contains("divisible by n_heads"));
        assert!(message.contains("dropout"));
    }

    #[test]
    fn odd_units_and_zero_heads_are_rejected() {
        assert!(TransformerConfig::new(1, 5, 5, 7).with_heads(7).validate().is_err());
        assert!(TransformerConfig::new(1, 5, 5, 8).with_heads(0).validate().is_err());
        assert!(TransformerConfig::new(0, 5, 5, 8).with_heads(2).validate().is_ok());
    }
}
