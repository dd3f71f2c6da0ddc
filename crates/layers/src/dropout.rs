//! Train-only dropout with a mode switch shared across a whole model.
//!
//! Every [`Dropout`] site holds a clone of the owning model's
//! [`TrainingFlag`]. Flipping the flag once switches every site between
//! training (stochastic) and evaluation (identity) behaviour.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use candle_core::{bail, Result, Tensor};
use candle_nn::ops;

/// Shared training/evaluation switch.
#[derive(Debug, Clone)]
pub struct TrainingFlag(Arc<AtomicBool>);

impl TrainingFlag {
    pub fn new(training: bool) -> Self {
        Self(Arc::new(AtomicBool::new(training)))
    }

    pub fn set(&self, training: bool) {
        self.0.store(training, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for TrainingFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Inverted dropout: kept activations are scaled by `1 / (1 - p)`.
#[derive(Debug, Clone)]
pub struct Dropout {
    probability: f32,
    training: TrainingFlag,
}

impl Dropout {
    pub fn new(probability: f32, training: TrainingFlag) -> Result<Self> {
        if !(0.0..1.0).contains(&probability) {
            bail!("dropout probability must be in [0, 1), got {probability}");
        }
        Ok(Self {
            probability,
            training,
        })
    }

    /// Whether a forward call would currently drop activations.
    pub fn is_active(&self) -> bool {
        self.probability > 0.0 && self.training.is_training()
    }

    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        if self.is_active() {
            ops::dropout(input, self.probability)
        } else {
            Ok(input.clone())
        }
    }
}
