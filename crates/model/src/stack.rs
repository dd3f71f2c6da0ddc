//! Fixed-depth encoder and decoder stacks.
//!
//! Layers are owned in order and applied one after the other. Every decoder
//! layer attends to the same final encoder output.

use candle_core::{Device, Tensor, Var};

use crate::{
    block::{DecoderLayer, EncoderLayer, LayerSettings},
    errors::Result,
};

#[derive(Debug)]
pub struct Encoder {
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    pub fn new(n_layers: usize, settings: &LayerSettings, device: &Device) -> Result<Self> {
        let layers = (0..n_layers)
            .map(|_| EncoderLayer::new(settings, device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// With no layers the embedded block is returned unchanged.
    pub fn forward(&self, e: &Tensor, xx_mask: &Tensor) -> Result<Tensor> {
        let mut e = e.clone();
        for layer in &self.layers {
            e = layer.forward(&e, xx_mask)?;
        }
        Ok(e)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(index, layer)| layer.named_parameters(&format!("{scope}.layers.{index}")))
            .collect()
    }
}

#[derive(Debug)]
pub struct Decoder {
    layers: Vec<DecoderLayer>,
}

impl Decoder {
    pub fn new(n_layers: usize, settings: &LayerSettings, device: &Device) -> Result<Self> {
        let layers = (0..n_layers)
            .map(|_| DecoderLayer::new(settings, device))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    pub fn forward(&self, e: &Tensor, source: &Tensor, xy_mask: &Tensor, yy_mask: &Tensor) -> Result<Tensor> {
        let mut e = e.clone();
        for layer in &self.layers {
            e = layer.forward(&e, source, xy_mask, yy_mask)?;
        }
        Ok(e)
    }

    pub fn named_parameters(&self, scope: &str) -> Vec<(String, Var)> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(index, layer)| layer.named_parameters(&format!("{scope}.layers.{index}")))
            .collect()
    }
}
