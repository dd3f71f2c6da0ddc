//! Encoder-decoder transformer with tied target embedding and readout.

use std::sync::Arc;

use attention::masks::{causal_mask, mask_and, padding_mask};
use candle_core::{DType, Device, Tensor, Var, D};
use embedding::{
    learned_positions, EmbeddingInit, InputEmbedding, SinusoidalEncoding, TokenEmbedding,
    TokenEmbeddingConfig,
};
use layers::{checks, sentence, Dropout, TrainingFlag};

use crate::{
    batch::{source_pad_concat_convert, EOS_ID},
    block::LayerSettings,
    config::TransformerConfig,
    errors::{ModelError, Result},
    loss::{LossOutput, SequenceLoss},
    report::{LogReporter, Reporter},
    stack::{Decoder, Encoder},
};

/// Emitted for a sequence whose first prediction is already the end token.
pub const EMPTY_OUTPUT_ID: i64 = 1;

/// Source and target id blocks are `(batch, length)` integer tensors where
/// negative ids mark padding.
#[derive(Debug)]
pub struct Transformer {
    config: TransformerConfig,
    device: Device,
    training: TrainingFlag,
    embed_x: InputEmbedding,
    embed_y: InputEmbedding,
    embed_pos: Option<TokenEmbedding>,
    encoder: Encoder,
    decoder: Decoder,
    loss: SequenceLoss,
    reporter: Arc<dyn Reporter>,
}

impl Transformer {
    /// Builds the model in training mode.
    pub fn new(config: TransformerConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let units = config.n_units;
        let training = TrainingFlag::new(true);

        let position = SinusoidalEncoding::new(units, config.max_length, device)?;
        let embed_pos = if config.embed_position {
            Some(learned_positions(config.max_length, units, device)?)
        } else {
            None
        };
        let input = |vocab_size: usize| -> Result<InputEmbedding> {
            let tokens = TokenEmbedding::new(TokenEmbeddingConfig {
                vocab_size,
                hidden_dim: units,
                init: EmbeddingInit::LecunUniform,
                device: device.clone(),
            })?;
            Ok(InputEmbedding::new(
                tokens,
                position.clone(),
                embed_pos.clone(),
                Dropout::new(config.dropout, training.clone())?,
            )?)
        };
        let embed_x = input(config.n_source_vocab)?;
        let embed_y = input(config.n_target_vocab)?;

        let settings = LayerSettings {
            units,
            heads: config.n_heads,
            dropout: config.dropout,
            training: training.clone(),
        };
        let encoder = Encoder::new(config.n_layers, &settings, device)?;
        let decoder = Decoder::new(config.n_layers, &settings, device)?;

        let model = Self {
            loss: SequenceLoss::new(config.n_target_vocab, config.use_label_smoothing),
            config,
            device: device.clone(),
            training,
            embed_x,
            embed_y,
            embed_pos,
            encoder,
            decoder,
            reporter: Arc::new(LogReporter),
        };
        log::info!(
            "transformer layers={}/{} units={} heads={} source_vocab={} target_vocab={} label_smoothing={} parameters={}",
            model.encoder.depth(),
            model.decoder.depth(),
            model.config.n_units,
            model.config.n_heads,
            model.config.n_source_vocab,
            model.config.n_target_vocab,
            model.loss.label_smoothing(),
            model.parameter_count()
        );
        Ok(model)
    }

    /// Replaces the collaborator that receives loss metrics.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Switches every dropout site of the model at once.
    pub fn set_training(&self, training: bool) {
        self.training.set(training);
    }

    pub fn is_training(&self) -> bool {
        self.training.is_training()
    }

    /// Every trainable parameter under a dotted name. The output projection
    /// reads `embed_y.weight` and owns nothing.
    pub fn named_parameters(&self) -> Vec<(String, Var)> {
        let mut params = self.embed_x.named_parameters("embed_x");
        params.extend(self.embed_y.named_parameters("embed_y"));
        if let Some(embed_pos) = &self.embed_pos {
            params.extend(embed_pos.named_parameters("embed_pos"));
        }
        params.extend(self.encoder.named_parameters("encoder"));
        params.extend(self.decoder.named_parameters("decoder"));
        params
    }

    pub fn parameter_count(&self) -> usize {
        self.named_parameters()
            .iter()
            .map(|(_, var)| var.as_tensor().elem_count())
            .sum()
    }

    /// `(batch, q_len, k_len)` mask permitting pairs where both ids are
    /// non-negative.
    pub fn make_attention_mask(&self, query_block: &Tensor, key_block: &Tensor) -> Result<Tensor> {
        Ok(padding_mask(query_block, key_block)?)
    }

    /// `(batch, length, length)` mask permitting key `j` for query `i` iff `j <= i`.
    pub fn make_retrospective_mask(&self, block: &Tensor) -> Result<Tensor> {
        let (batch, length) = block.dims2()?;
        Ok(causal_mask(&self.device, batch, length)?)
    }

    /// Scalar training loss; metrics go to the reporter.
    pub fn forward(&self, x_block: &Tensor, y_in_block: &Tensor, y_out_block: &Tensor) -> Result<Tensor> {
        Ok(self.forward_with_metrics(x_block, y_in_block, y_out_block)?.loss)
    }

    /// Same as [`Transformer::forward`] but also hands the metrics back.
    pub fn forward_with_metrics(
        &self,
        x_block: &Tensor,
        y_in_block: &Tensor,
        y_out_block: &Tensor,
    ) -> Result<LossOutput> {
        if y_out_block.dims() != y_in_block.dims() {
            return Err(ModelError::Shape(format!(
                "target output block {:?} must match target input block {:?}",
                y_out_block.dims(),
                y_in_block.dims()
            )));
        }
        let h_block = self.decode(x_block, y_in_block)?;
        let rows = sentence::to_position_rows(&h_block)?;
        let logits = self.embed_y.tokens().linear_out(&rows)?;
        let output = self.loss.compute(&logits, y_out_block)?;
        self.reporter.report(&output.metrics);
        Ok(output)
    }

    /// `(batch, n_target_vocab)` logits for the token following the last
    /// position of `y_in_block`.
    pub fn predict(&self, x_block: &Tensor, y_in_block: &Tensor) -> Result<Tensor> {
        let h_block = self.decode(x_block, y_in_block)?;
        let (_, _, length) = h_block.dims3()?;
        let last = sentence::select_position(&h_block, length - 1)?;
        Ok(self.embed_y.tokens().linear_out(&last)?)
    }

    /// Greedy decoding of every source sequence.
    ///
    /// Decoding starts from the end token, runs at most `max_length` steps
    /// and stops early once every sequence has produced the end token. Each
    /// output is cut before its first end token; an empty result becomes
    /// `[EMPTY_OUTPUT_ID]`. Dropout is off for the duration of the call.
    pub fn translate(&self, sources: &[Vec<i64>], max_length: usize) -> Result<Vec<Vec<i64>>> {
        let was_training = self.is_training();
        self.set_training(false);
        let result = self.greedy_decode(sources, max_length);
        self.set_training(was_training);
        result
    }

    fn greedy_decode(&self, sources: &[Vec<i64>], max_length: usize) -> Result<Vec<Vec<i64>>> {
        let x_block = source_pad_concat_convert(sources, &self.device)?;
        let batch = sources.len();

        // Step `i` feeds a target block of length `i + 1`, which must fit the
        // position table.
        let steps = max_length.min(self.config.max_length);
        if steps < max_length {
            log::debug!("decode capped at {steps} steps by max_length {}", self.config.max_length);
        }

        let mut y_block = Tensor::full(EOS_ID, (batch, 1), &self.device)?;
        let mut emitted: Vec<Vec<i64>> = vec![Vec::new(); batch];
        let mut finished = vec![false; batch];
        for step in 0..steps {
            let logits = self.predict(&x_block, &y_block)?;
            let ys = logits.argmax(D::Minus1)?.to_dtype(DType::I64)?;
            for ((tokens, done), &id) in emitted
                .iter_mut()
                .zip(finished.iter_mut())
                .zip(ys.to_vec1::<i64>()?.iter())
            {
                tokens.push(id);
                *done |= id == EOS_ID;
            }
            y_block = Tensor::cat(&[&y_block, &ys.unsqueeze(1)?], 1)?;
            log::debug!("decode step {} of {steps}", step + 1);
            if finished.iter().all(|&done| done) {
                log::debug!("every sequence emitted the end token after {} steps", step + 1);
                break;
            }
        }

        Ok(emitted
            .into_iter()
            .map(|tokens| {
                let end = tokens.iter().position(|&id| id == EOS_ID).unwrap_or(tokens.len());
                if end == 0 {
                    vec![EMPTY_OUTPUT_ID]
                } else {
                    tokens[..end].to_vec()
                }
            })
            .collect())
    }

    /// Embeds, encodes and decodes; returns the `(batch, units, y_len)` block
    /// of the last decoder layer.
    fn decode(&self, x_block: &Tensor, y_block: &Tensor) -> Result<Tensor> {
        let (batch, x_length) = self.check_ids("x_block", x_block)?;
        let (y_batch, y_length) = self.check_ids("y_block", y_block)?;
        if batch != y_batch {
            return Err(ModelError::Shape(format!(
                "source batch {batch} differs from target batch {y_batch}"
            )));
        }
        log::trace!("decode batch={batch} x_len={x_length} y_len={y_length}");

        let ex_block = self.embed_x.forward(x_block)?;
        let ey_block = self.embed_y.forward(y_block)?;

        let xx_mask = self.make_attention_mask(x_block, x_block)?;
        let xy_mask = self.make_attention_mask(y_block, x_block)?;
        let yy_mask = mask_and(
            &self.make_attention_mask(y_block, y_block)?,
            &self.make_retrospective_mask(y_block)?,
        )?;

        let z_block = self.encoder.forward(&ex_block, &xx_mask)?;
        self.decoder.forward(&ey_block, &z_block, &xy_mask, &yy_mask)
    }

    fn check_ids(&self, label: &str, block: &Tensor) -> Result<(usize, usize)> {
        let (batch, length) = checks::expect_token_block(label, block)?;
        if length > self.config.max_length {
            return Err(ModelError::Shape(format!(
                "{label} has length {length} but max_length is {}",
                self.config.max_length
            )));
        }
        Ok((batch, length))
    }
}
