use std::sync::Arc;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use embedding::SinusoidalEncoding;
use model::{MetricsRecorder, ModelError, Transformer, TransformerConfig};

fn small_config() -> TransformerConfig {
    TransformerConfig::new(1, 12, 10, 8).with_heads(2).with_max_length(16)
}

/// Sources of lengths 3 and 5 padded with -1, targets shifted by one.
fn batch(device: &Device) -> Result<(Tensor, Tensor, Tensor)> {
    let x = Tensor::new(&[[3i64, 4, 5, -1, -1], [6, 7, 8, 9, 11]], device)?;
    let y_in = Tensor::new(&[[0i64, 2, 3, -1], [0, 4, 5, 6]], device)?;
    let y_out = Tensor::new(&[[2i64, 3, 0, -1], [4, 5, 6, 0]], device)?;
    Ok((x, y_in, y_out))
}

#[test]
fn forward_returns_finite_non_negative_loss() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config(), &device)?;
    let (x, y_in, y_out) = batch(&device)?;

    let loss = model.forward(&x, &y_in, &y_out)?;
    assert_eq!(loss.dims(), &[] as &[usize]);
    let value = loss.to_vec0::<f32>()?;
    assert!(value.is_finite());
    assert!(value >= 0.0);

    let logits = model.predict(&x, &y_in)?;
    assert_eq!(logits.dims(), &[2, 10]);
    Ok(())
}

#[test]
fn metrics_reach_the_reporter() -> Result<()> {
    let device = Device::Cpu;
    let recorder = Arc::new(MetricsRecorder::new());
    let model = Transformer::new(small_config(), &device)?.with_reporter(recorder.clone());
    let (x, y_in, y_out) = batch(&device)?;

    let output = model.forward_with_metrics(&x, &y_in, &y_out)?;
    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], output.metrics);
    assert_eq!(output.metrics.tokens, 7);
    assert!((0.0..=1.0).contains(&output.metrics.accuracy));
    assert!((output.metrics.perplexity - output.metrics.loss.exp()).abs() < 1e-3);
    Ok(())
}

#[test]
fn evaluation_mode_is_deterministic() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config().with_dropout(0.3), &device)?;
    assert!(model.is_training());
    model.set_training(false);
    let (x, y_in, y_out) = batch(&device)?;

    let first = model.forward(&x, &y_in, &y_out)?.to_vec0::<f32>()?;
    let second = model.forward(&x, &y_in, &y_out)?.to_vec0::<f32>()?;
    assert_eq!(first.to_bits(), second.to_bits());

    let a = model.predict(&x, &y_in)?.flatten_all()?.to_vec1::<f32>()?;
    let b = model.predict(&x, &y_in)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn label_smoothing_changes_only_the_optimised_loss() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config().with_label_smoothing(true), &device)?;
    model.set_training(false);
    let (x, y_in, y_out) = batch(&device)?;

    let output = model.forward_with_metrics(&x, &y_in, &y_out)?;
    let loss = output.loss.to_vec0::<f32>()?;
    assert!(loss.is_finite() && loss > 0.0);
    assert!((loss - output.metrics.loss).abs() > 1e-6);
    Ok(())
}

#[test]
fn all_padding_targets_are_rejected() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config(), &device)?;
    let (x, y_in, _) = batch(&device)?;
    let y_out = Tensor::full(-1i64, (2, 4), &device)?;

    let err = model.forward(&x, &y_in, &y_out).unwrap_err();
    assert!(matches!(err, ModelError::NoValidTargets));
    Ok(())
}

#[test]
fn mismatched_blocks_are_shape_errors() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config(), &device)?;
    let (x, y_in, y_out) = batch(&device)?;

    let one_row = y_in.narrow(0, 0, 1)?;
    assert!(matches!(model.predict(&x, &one_row), Err(ModelError::Shape(_))));
    let short_out = y_out.narrow(1, 0, 3)?;
    assert!(matches!(model.forward(&x, &y_in, &short_out), Err(ModelError::Shape(_))));
    let too_long = Tensor::zeros((1, 17), DType::I64, &device)?;
    assert!(matches!(model.predict(&too_long, &one_row), Err(ModelError::Shape(_))));
    Ok(())
}

#[test]
fn masks_follow_validity_and_causality() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config(), &device)?;
    let query = Tensor::new(&[[1i64, 2, -1]], &device)?;
    let key = Tensor::new(&[[5i64, -1]], &device)?;

    let mask = model.make_attention_mask(&query, &key)?;
    assert_eq!(mask.to_vec3::<u8>()?, vec![vec![vec![1, 0], vec![1, 0], vec![0, 0]]]);

    let causal = model.make_retrospective_mask(&query)?;
    assert_eq!(
        causal.to_vec3::<u8>()?,
        vec![vec![vec![1, 0, 0], vec![1, 1, 0], vec![1, 1, 1]]]
    );
    Ok(())
}

#[test]
fn zero_depth_predicts_from_embeddings_alone() -> Result<()> {
    let device = Device::Cpu;
    let units = 8;
    let config = TransformerConfig::new(0, 6, 5, units).with_heads(2).with_max_length(10);
    let model = Transformer::new(config, &device)?;
    model.set_training(false);

    let x = Tensor::new(&[[1i64, 2]], &device)?;
    let y_in = Tensor::new(&[[0i64, 3, 4]], &device)?;
    let logits = model.predict(&x, &y_in)?.flatten_all()?.to_vec1::<f32>()?;

    let params = model.named_parameters();
    let (_, embed_y) = params
        .iter()
        .find(|(name, _)| name == "embed_y.weight")
        .expect("target embedding");
    let table = embed_y.as_tensor().to_vec2::<f32>()?;
    let position = SinusoidalEncoding::new(units, 10, &device)?
        .table()
        .squeeze(0)?
        .to_vec2::<f32>()?;
    // last position (index 2) holds token 4
    let hidden: Vec<f32> = (0..units)
        .map(|u| table[4][u] * (units as f32).sqrt() + position[u][2])
        .collect();
    for (vocab, logit) in logits.iter().enumerate() {
        let expected: f32 = hidden.iter().zip(&table[vocab]).map(|(h, w)| h * w).sum();
        assert!((logit - expected).abs() < 1e-4, "vocab {vocab}: {logit} vs {expected}");
    }
    Ok(())
}

#[test]
fn parameters_are_named_and_the_readout_is_tied() -> Result<()> {
    let device = Device::Cpu;
    let model = Transformer::new(small_config().with_embed_position(true), &device)?;
    let params = model.named_parameters();
    let names: Vec<&str> = params.iter().map(|(name, _)| name.as_str()).collect();

    assert_eq!(&names[..3], &["embed_x.weight", "embed_y.weight", "embed_pos.weight"]);
    assert!(names.contains(&"encoder.layers.0.self_attention.w_qkv.weight"));
    assert!(names.contains(&"decoder.layers.0.source_attention.w_kv.weight"));
    assert!(names.contains(&"decoder.layers.0.norm_3.bias"));
    assert!(!names.iter().any(|name| name.contains("output")));

    // 12*8 + 10*8 + 16*8 embeddings, then per layer:
    // encoder: qkv 192 + finishing 64 + ff 8*32+32+32*8+8 = 552 + norms 32
    // decoder: qkv 192 + finishing 64 + q 64 + kv 128 + finishing 64 + 552 + norms 48
    assert_eq!(
        model.parameter_count(),
        96 + 80 + 128 + (192 + 64 + 552 + 32) + (192 + 64 + 64 + 128 + 64 + 552 + 48)
    );

    // Overwriting the target table changes the readout.
    let (x, y_in, _) = batch(&device)?;
    model.set_training(false);
    let before = model.predict(&x, &y_in)?;
    let embed_y = &params[1].1;
    embed_y.set(&Tensor::zeros((10, 8), DType::F32, &device)?)?;
    let after = model.predict(&x, &y_in)?.flatten_all()?.to_vec1::<f32>()?;
    assert!(after.iter().all(|&v| v == 0.0));
    assert!(before.abs()?.sum_all()?.to_vec0::<f32>()? > 0.0);
    Ok(())
}
