use anyhow::Result;
use candle_core::{Device, Tensor};
use embedding::{
    learned_positions, position_ids, sinusoid_angle, EmbeddingInit, InputEmbedding,
    SinusoidalEncoding, TokenEmbedding,
};
use layers::{Dropout, TrainingFlag};

#[test]
fn table_follows_sin_cos_formula() -> Result<()> {
    let units = 8;
    let max_length = 6;
    let encoding = SinusoidalEncoding::new(units, max_length, &Device::Cpu)?;
    assert_eq!(encoding.table().dims(), &[1, units, max_length]);

    let table = encoding.table().squeeze(0)?.to_vec2::<f32>()?;
    for column in 0..max_length {
        let position = column + 1;
        for pair in 0..units / 2 {
            let angle = position as f64 / 10_000f64.powf(2.0 * pair as f64 / units as f64);
            assert!((table[2 * pair][column] as f64 - angle.sin()).abs() < 1e-6);
            assert!((table[2 * pair + 1][column] as f64 - angle.cos()).abs() < 1e-6);
        }
    }
    assert_eq!(sinusoid_angle(3, 0, units), 3.0);
    Ok(())
}

#[test]
fn table_is_deterministic_and_slices_prefix() -> Result<()> {
    let a = SinusoidalEncoding::new(6, 10, &Device::Cpu)?;
    let b = SinusoidalEncoding::new(6, 10, &Device::Cpu)?;
    assert_eq!(
        a.table().flatten_all()?.to_vec1::<f32>()?,
        b.table().flatten_all()?.to_vec1::<f32>()?
    );

    let prefix = a.slice(4)?;
    assert_eq!(prefix.dims(), &[1, 6, 4]);
    assert_eq!(
        prefix.flatten_all()?.to_vec1::<f32>()?,
        a.table().narrow(2, 0, 4)?.flatten_all()?.to_vec1::<f32>()?
    );
    assert!(a.slice(11).is_err());
    Ok(())
}

#[test]
fn odd_unit_counts_are_rejected() {
    assert!(SinusoidalEncoding::new(7, 4, &Device::Cpu).is_err());
}

#[test]
fn input_embedding_scales_tokens_and_adds_positions() -> Result<()> {
    let device = Device::Cpu;
    let units = 4;
    let weight = Tensor::new(
        &[[1f32, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 1.0]],
        &device,
    )?;
    let tokens = TokenEmbedding::from_weight(weight, EmbeddingInit::LecunUniform)?;
    let position = SinusoidalEncoding::new(units, 8, &device)?;
    let dropout = Dropout::new(0.5, TrainingFlag::new(false))?;
    let input = InputEmbedding::new(tokens, position.clone(), None, dropout)?;

    let ids = Tensor::new(&[[2i64, -1, 0]], &device)?;
    let block = input.forward(&ids)?;
    assert_eq!(block.dims(), &[1, units, 3]);

    let expected_tokens = Tensor::new(
        &[[[0f32, 0.0, 2.0], [0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [2.0, 0.0, 0.0]]],
        &device,
    )?;
    let expected = expected_tokens.broadcast_add(&position.slice(3)?)?;
    let diff = block.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(diff < 1e-6);
    Ok(())
}

#[test]
fn learned_positions_are_added_per_position() -> Result<()> {
    let device = Device::Cpu;
    let units = 2;
    let tokens = TokenEmbedding::from_weight(
        Tensor::zeros((3, units), candle_core::DType::F32, &device)?,
        EmbeddingInit::LecunUniform,
    )?;
    let position = SinusoidalEncoding::new(units, 4, &device)?;
    let learned = learned_positions(4, units, &device)?;
    let dropout = Dropout::new(0.0, TrainingFlag::default())?;
    let input = InputEmbedding::new(tokens, position.clone(), Some(learned.clone()), dropout)?;

    let block = input.forward(&Tensor::new(&[[1i64, 1, 1], [0, 2, -1]], &device)?)?;
    let expected = position
        .slice(3)?
        .broadcast_add(&learned.forward(&position_ids(2, 3, &device)?)?)?;
    let diff = block.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
    assert!(diff < 1e-6);
    Ok(())
}
