//! Encoder-decoder transformer for sequence-to-sequence translation.
//!
//! Builds on `layers`, `embedding` and `attention`: every intermediate value
//! is a `(batch, units, length)` sentence block, masks are `(batch, q, k)`
//! and padding ids are negative.

pub mod batch;
pub mod block;
pub mod config;
pub mod errors;
pub mod loss;
pub mod model;
pub mod report;
pub mod stack;

pub use batch::{pad_block, source_pad_concat_convert};
pub use block::{DecoderLayer, EncoderLayer, LayerSettings};
pub use config::TransformerConfig;
pub use errors::{ModelError, Result};
pub use loss::{LossMetrics, LossOutput, SequenceLoss};
pub use model::{Transformer, EMPTY_OUTPUT_ID};
pub use report::{EvaluationSummary, LogReporter, MetricsRecorder, Reporter};
pub use stack::{Decoder, Encoder};
