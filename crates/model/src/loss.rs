//! Token-level cross entropy over flattened decoder outputs.

use candle_core::{DType, Tensor, D};
use candle_nn::ops;

use crate::errors::{ModelError, Result};

/// Weight of the true-label term when label smoothing is on.
pub const CONFIDENCE: f64 = 0.9;
/// Weight of the uniform term when label smoothing is on.
pub const SMOOTHING: f64 = 0.1;

/// Cross entropy that ignores negative targets, with optional label smoothing.
#[derive(Debug, Clone)]
pub struct SequenceLoss {
    n_vocab: usize,
    label_smoothing: bool,
}

impl SequenceLoss {
    pub fn new(n_vocab: usize, label_smoothing: bool) -> Self {
        Self {
            n_vocab,
            label_smoothing,
        }
    }

    pub fn label_smoothing(&self) -> bool {
        self.label_smoothing
    }

    /// `logits`: `(rows, n_vocab)`, `targets`: `rows` ids (any shape that
    /// flattens to `rows`), negative ids are ignored.
    ///
    /// The optimised loss is the mean negative log-likelihood over valid rows,
    /// or with smoothing `0.9 * nll + 0.1 * u` where `u` is the mean over
    /// valid rows of `-(1 / n_vocab) * sum(log_prob)`. Reported metrics always
    /// use the plain mean negative log-likelihood.
    pub fn compute(&self, logits: &Tensor, targets: &Tensor) -> Result<LossOutput> {
        let (rows, n_vocab) = logits.dims2()?;
        if n_vocab != self.n_vocab {
            return Err(ModelError::Shape(format!(
                "logits have {n_vocab} classes, expected {}",
                self.n_vocab
            )));
        }
        let targets = targets.to_dtype(DType::I64)?.flatten_all()?;
        if targets.dim(0)? != rows {
            return Err(ModelError::Shape(format!(
                "{} targets for {rows} logit rows",
                targets.dim(0)?
            )));
        }

        let valid = targets.ge(0i64)?;
        let valid_f = valid.to_dtype(DType::F32)?;
        let n_token = valid_f.sum_all()?.to_vec0::<f32>()?.round() as usize;
        if n_token == 0 {
            return Err(ModelError::NoValidTargets);
        }
        let normalizer = n_token as f64;

        let safe_targets = valid
            .where_cond(&targets, &targets.zeros_like()?)?
            .to_dtype(DType::U32)?;
        let log_prob = ops::log_softmax(logits, D::Minus1)?;
        let picked = log_prob.gather(&safe_targets.unsqueeze(1)?, 1)?.squeeze(1)?;
        let nll = ((picked * &valid_f)?.sum_all()?.neg()? / normalizer)?;
        let nll_value = nll.to_vec0::<f32>()?;

        let loss = if self.label_smoothing {
            let uniform = (log_prob.broadcast_mul(&valid_f.unsqueeze(1)?)?.sum_all()?
                * (-1.0 / (self.n_vocab as f64 * normalizer)))?;
            ((&nll * CONFIDENCE)? + (uniform * SMOOTHING)?)?
        } else {
            nll
        };

        let predictions = logits.argmax(D::Minus1)?;
        let correct = predictions
            .eq(&safe_targets)?
            .to_dtype(DType::F32)?
            .mul(&valid_f)?
            .sum_all()?
            .to_vec0::<f32>()?
            .round() as usize;

        Ok(LossOutput {
            loss,
            metrics: LossMetrics {
                loss: nll_value,
                accuracy: correct as f32 / n_token as f32,
                perplexity: nll_value.exp(),
                tokens: n_token,
            },
        })
    }
}

/// Differentiable scalar loss plus the values reported for it.
#[derive(Debug, Clone)]
pub struct LossOutput {
    pub loss: Tensor,
    pub metrics: LossMetrics,
}

/// Reported side-channel values for one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossMetrics {
    /// Mean negative log-likelihood over valid targets.
    pub loss: f32,
    /// Share of valid targets whose arg-max prediction is correct.
    pub accuracy: f32,
    /// `exp(loss)`.
    pub perplexity: f32,
    /// Number of valid targets.
    pub tokens: usize,
}
