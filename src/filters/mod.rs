//! Signal conditioning for raw accelerometer streams

pub mod band_pass;

pub use band_pass::{BandPassFilter, FilterState};
