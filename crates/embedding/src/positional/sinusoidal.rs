//! Fixed sinusoidal position table.
//!
//! For position `pos` (1-based) and feature pair `i` in `[0, units / 2)`:
//!
//! ```text
//! angle           = pos / 10000^(2i / units)
//! table[2i][pos]  = sin(angle)
//! table[2i+1][pos] = cos(angle)
//! ```
//!
//! The table is computed once per `(units, max_length)` and shaped
//! `(1, units, max_length)` so it broadcasts over a batch of sentence blocks.

use candle_core::{bail, Device, Result, Tensor};

const BASE: f64 = 10_000.0;

/// Angle for the 1-based `position` and feature pair `pair`.
pub fn sinusoid_angle(position: usize, pair: usize, units: usize) -> f64 {
    position as f64 / BASE.powf(2.0 * pair as f64 / units as f64)
}

/// Precomputed `(1, units, max_length)` sinusoid table.
#[derive(Debug, Clone)]
pub struct SinusoidalEncoding {
    units: usize,
    max_length: usize,
    table: Tensor,
}

impl SinusoidalEncoding {
    pub fn new(units: usize, max_length: usize, device: &Device) -> Result<Self> {
        if units == 0 || units % 2 != 0 {
            bail!("sinusoidal encoding needs a positive even unit count, got {units}");
        }
        if max_length == 0 {
            bail!("sinusoidal encoding needs max_length > 0");
        }

        let mut data = vec![0f32; units * max_length];
        for pair in 0..units / 2 {
            let sin_row = 2 * pair * max_length;
            let cos_row = sin_row + max_length;
            for column in 0..max_length {
                let angle = sinusoid_angle(column + 1, pair, units);
                data[sin_row + column] = angle.sin() as f32;
                data[cos_row + column] = angle.cos() as f32;
            }
        }
        let table = Tensor::from_vec(data, (1, units, max_length), device)?;
        log::debug!("sinusoidal table built units={units} max_length={max_length}");

        Ok(Self {
            units,
            max_length,
            table,
        })
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// The full `(1, units, max_length)` table.
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    /// First `length` positions, `(1, units, length)`.
    pub fn slice(&self, length: usize) -> Result<Tensor> {
        if length > self.max_length {
            bail!(
                "sequence length {length} exceeds position table length {}",
                self.max_length
            );
        }
        self.table.narrow(2, 0, length)
    }
}
