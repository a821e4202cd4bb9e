use crate::sensor_receiver::{FilteredSample, RawSample};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes {
    fn from_raw(sample: &RawSample) -> Self {
        Self {
            x: sample.x,
            y: sample.y,
            z: sample.z,
        }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Accumulators carried between samples
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub last_raw: Axes,
    pub high_pass: Axes,
    pub low_pass: Axes,
    pub samples: u64,
}

/// Causal high-pass → low-pass cascade, applied per axis.
///
/// High-pass: `hp = α·(hp_prev + raw − raw_prev)` strips gravity and tilt.
/// Low-pass:  `lp = β·hp + (1−β)·lp_prev` strips fine vibration.
/// What is left is the band a wheel hitting a defect produces.
///
/// All previous values start at zero, so the first output carries the full
/// gravity step and is flagged as warm-up.
#[derive(Clone, Debug)]
pub struct BandPassFilter {
    alpha: f64,
    beta: f64,
    state: FilterState,
}

impl BandPassFilter {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Self {
            alpha,
            beta,
            state: FilterState::default(),
        }
    }

    /// Feed one raw sample. Returns the band-passed vector and whether it is
    /// the warm-up output, or `None` (state untouched) when the step would
    /// overflow the accumulators.
    pub fn update(&mut self, raw: &RawSample) -> Option<(FilteredSample, bool)> {
        let current = Axes::from_raw(raw);
        let warm_up = self.state.samples == 0;

        let hp = Axes {
            x: self.high_pass_axis(self.state.high_pass.x, current.x, self.state.last_raw.x),
            y: self.high_pass_axis(self.state.high_pass.y, current.y, self.state.last_raw.y),
            z: self.high_pass_axis(self.state.high_pass.z, current.z, self.state.last_raw.z),
        };
        let lp = Axes {
            x: self.low_pass_axis(hp.x, self.state.low_pass.x),
            y: self.low_pass_axis(hp.y, self.state.low_pass.y),
            z: self.low_pass_axis(hp.z, self.state.low_pass.z),
        };

        if !(hp.is_finite() && lp.is_finite()) {
            return None;
        }

        self.state.last_raw = current;
        self.state.high_pass = hp;
        self.state.low_pass = lp;
        self.state.samples += 1;

        Some((FilteredSample::new(lp.x, lp.y, lp.z, raw.timestamp), warm_up))
    }

    #[inline]
    fn high_pass_axis(&self, hp_prev: f64, raw: f64, raw_prev: f64) -> f64 {
        self.alpha * (hp_prev + raw - raw_prev)
    }

    #[inline]
    fn low_pass_axis(&self, hp: f64, lp_prev: f64) -> f64 {
        self.beta * hp + (1.0 - self.beta) * lp_prev
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }
}
