//! Side channel for per-batch loss metrics.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use crate::loss::LossMetrics;

/// Receives the metrics of every loss computation.
pub trait Reporter: Debug + Send + Sync {
    fn report(&self, metrics: &LossMetrics);
}

/// Writes each report to the `log` facade at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, metrics: &LossMetrics) {
        log::info!(
            "loss={:.4} acc={:.4} perp={:.3} tokens={}",
            metrics.loss,
            metrics.accuracy,
            metrics.perplexity,
            metrics.tokens
        );
    }
}

/// Keeps every report for later aggregation.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    records: Mutex<Vec<LossMetrics>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LossMetrics> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Token-weighted aggregate of everything recorded so far.
    pub fn summary(&self) -> Option<EvaluationSummary> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let tokens: usize = records.iter().map(|m| m.tokens).sum();
        if tokens == 0 {
            return None;
        }
        let loss_sum: f64 = records.iter().map(|m| m.loss as f64 * m.tokens as f64).sum();
        let correct: f64 = records
            .iter()
            .map(|m| m.accuracy as f64 * m.tokens as f64)
            .sum();
        let average_loss = loss_sum / tokens as f64;
        Some(EvaluationSummary {
            average_loss,
            perplexity: average_loss.exp(),
            accuracy: correct / tokens as f64,
            tokens,
        })
    }
}

impl Reporter for MetricsRecorder {
    fn report(&self, metrics: &LossMetrics) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*metrics);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    pub average_loss: f64,
    pub perplexity: f64,
    pub accuracy: f64,
    pub tokens: usize,
}
