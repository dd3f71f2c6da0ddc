//! Embedding crate
//!
//! Token lookup tables plus the position information mixed into them before
//! the encoder and decoder stacks. Outputs follow the `(batch, units, length)`
//! sentence-block layout used by the `layers` crate.

pub mod input;
pub mod positional;
pub mod token;

pub use input::InputEmbedding;
pub use positional::*;
pub use token::*;
