//! Portable, exact scaled dot-product attention.
//!
//! The reference kernel favours clarity over raw speed and is the only kernel
//! the model uses.

pub mod exact;

pub use exact::ExactAttention;
