//! Encoder and decoder layers: post-norm residual sub-layers over sentence
//! blocks.

use attention::{AttentionConfig, AttentionKind, MultiHeadAttention};
use candle_core::{Device, Tensor, Var};
use layers::{FeedForward, FeedForwardConfig, LinearInit, Residual, TrainingFlag};

use crate::errors::Result;

/// Hyperparameters shared by every layer of a stack.
#[derive(Debug, Clone)]
pub struct LayerSettings {
    pub units: usize,
    pub heads: usize,
    pub dropout: f32,
    pub training: TrainingFlag,
}

impl LayerSettings {
    fn attention(&self, kind: AttentionKind, device: &Device) -> Result<MultiHeadAttention> {
        Ok(MultiHeadAttention::new(
            AttentionConfig::new(self.units, self.heads, kind),
            device,
        )?)
    }

    fn feed_forward(&self, device: &Device) -> Result<FeedForward> {
        Ok(FeedForward::with_init(
            FeedForwardConfig::new(self.units),
            LinearInit::LecunUniform,
            device,
        )?)
    }

    fn residual(&self, device: &Device) -> Result<Residual> {
        Ok(Residual::with_units(
            self.units,
            self.dropout,
            self.training.clone(),
            device,
        )?)
    }
}

/// Self-attention then feed-forward, each wrapped in `norm(e + dropout(sub))`.
#[derive(Debug)]
pub struct EncoderLayer {
    self_attention: MultiHeadAttention,
    feed_forward: FeedForward,
    norm_1: Residual,
    norm_2: Residual,
}

impl EncoderLayer {
    pub fn new(settings: &LayerSettings, device: &Device) -> Result<Self> {
        Ok(Self {
            self_attention: settings.attention(AttentionKind::SelfAttention, device)?,
            feed_forward: settings.feed_forward(device)?,
            norm_1: settings.residual(device)?,
            norm_2: settings.residual(device)?,
        })
    }

    /// `e`: `(batch, units, x_len)`, `xx_mask`: `(batch, x_len, x_len)`.
    pub fn forward(&self, e: &Tensor, xx_mask: &Tensor) -> Result<Tensor> {
        let sub = self.self_attention.forward(e, None, xx_mask)?;
        let e = self.norm_1.forward(e, &sub)?;
        let sub = self.feed_forward.forward(&e)?;
        Ok(self.norm_2.forward(&e, &sub)?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .self_attention
            .named_parameters(&format!("{scope}.self_attention"));
        params.extend(self.feed_forward.named_parameters(&format!("{scope}.feed_forward")));
        params.extend(self.norm_1.named_parameters(&format!("{scope}.norm_1")));
        params.extend(self.norm_2.named_parameters(&format!("{scope}.norm_2")));
        params
    }
}

/// Masked self-attention, attention over the encoded source, feed-forward.
#[derive(Debug)]
pub struct DecoderLayer {
    self_attention: MultiHeadAttention,
    source_attention: MultiHeadAttention,
    feed_forward: FeedForward,
    norm_1: Residual,
    norm_2: Residual,
    norm_3: Residual,
}

impl DecoderLayer {
    pub fn new(settings: &LayerSettings, device: &Device) -> Result<Self> {
        Ok(Self {
            self_attention: settings.attention(AttentionKind::SelfAttention, device)?,
            source_attention: settings.attention(AttentionKind::Cross, device)?,
            feed_forward: settings.feed_forward(device)?,
            norm_1: settings.residual(device)?,
            norm_2: settings.residual(device)?,
            norm_3: settings.residual(device)?,
        })
    }

    /// * `e`: `(batch, units, y_len)` decoder block
    /// * `source`: `(batch, units, x_len)` encoder output
    /// * `xy_mask`: `(batch, y_len, x_len)`
    /// * `yy_mask`: `(batch, y_len, y_len)`, already causal
    pub fn forward(&self, e: &Tensor, source: &Tensor, xy_mask: &Tensor, yy_mask: &Tensor) -> Result<Tensor> {
        let sub = self.self_attention.forward(e, None, yy_mask)?;
        let e = self.norm_1.forward(e, &sub)?;
        let sub = self.source_attention.forward(&e, Some(source), xy_mask)?;
        let e = self.norm_2.forward(&e, &sub)?;
        let sub = self.feed_forward.forward(&e)?;
        Ok(self.norm_3.forward(&e, &sub)?)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        let mut params = self
            .self_attention
            .named_parameters(&format!("{scope}.self_attention"));
        params.extend(
            self.source_attention
                .named_parameters(&format!("{scope}.source_attention")),
        );
        params.extend(self.feed_forward.named_parameters(&format!("{scope}.feed_forward")));
        params.extend(self.norm_1.named_parameters(&format!("{scope}.norm_1")));
        params.extend(self.norm_2.named_parameters(&format!("{scope}.norm_2")));
        params.extend(self.norm_3.named_parameters(&format!("{scope}.norm_3")));
        params
    }
}
