use attention::AttentionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("target block holds no valid (non-negative) token")]
    NoValidTargets,

    #[error(transparent)]
    Attention(#[from] AttentionError),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
