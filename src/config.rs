//! Detection tunables
//! Defaults target a phone mounted in a car, sampling at ~60 Hz, axes in g

use crate::error::{BResult, BumpDetectorError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted history buffer, about a minute at 60 Hz
pub const MAX_HISTORY_LEN: usize = 4096;

/// One row of the speed-factor table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBand {
    /// Upper bound of the band (inclusive), miles per hour
    pub max_speed_mph: f64,
    /// Multiplier applied to the base threshold inside this band
    pub factor: f64,
}

impl SpeedBand {
    pub const fn new(max_speed_mph: f64, factor: f64) -> Self {
        Self {
            max_speed_mph,
            factor,
        }
    }
}

/// Complete configuration for one detection session.
///
/// Validated once at session start and never mutated afterwards. Every field
/// has a default so partial JSON files only need to name what they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Requested sensor update interval. Default 16 ms (~60 Hz).
    pub sample_interval_ms: u64,

    /// High-pass coefficient, (0, 1). Higher keeps more of the raw signal.
    pub hp_alpha: f64,

    /// Low-pass coefficient applied to the high-pass output, (0, 1).
    /// Higher follows the high-pass output more closely.
    pub lp_beta: f64,

    /// Spike threshold on |filtered z| at factor 1.0, g. Must be > 0.
    pub base_threshold_g: f64,

    /// Scale the threshold by travel speed. Disable for the plain spike detector.
    pub speed_scaling: bool,

    /// Ascending `(max_speed_mph, factor)` table. Speeds past the last band
    /// use the last band's factor.
    pub speed_bands: Vec<SpeedBand>,

    /// Below this speed nothing is reported. 0 disables the cutoff.
    pub min_speed_mph: f64,

    /// Lateral filtered magnitude above which a sample may be braking/turning, g.
    pub brake_lateral_g: f64,

    /// Samples whose acceleration magnitude exceeds this are discarded at
    /// ingestion, g. Phone accelerometers saturate at 8-16 g.
    pub max_accel_g: f64,

    /// History buffer capacity in samples (30 ≈ 0.5 s at 60 Hz), at most
    /// `MAX_HISTORY_LEN`.
    pub history_len: usize,

    /// Search the history for a drop-then-bounce signature.
    pub pattern_matching: bool,

    /// A drop is filtered z below -drop_threshold_g.
    pub drop_threshold_g: f64,

    /// A bounce is filtered z above +bounce_threshold_g.
    pub bounce_threshold_g: f64,

    /// Minimum drop → bounce spacing, ms.
    pub bounce_min_ms: f64,

    /// Maximum drop → bounce spacing, ms.
    pub bounce_window_ms: f64,

    /// Minimum spacing between two emitted events, ms. Must be > 0.
    pub cooldown_ms: f64,

    pub min_severity: f64,
    pub max_severity: f64,

    /// Severity points per g above the base threshold.
    pub severity_scale: f64,

    /// Severity points per unit of pattern score.
    pub pattern_weight: f64,

    /// Above this speed the severity is multiplied by `high_speed_boost`.
    pub high_speed_mph: f64,
    pub high_speed_boost: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 16,
            hp_alpha: 0.9,
            lp_beta: 0.85,
            base_threshold_g: 1.8,
            speed_scaling: true,
            speed_bands: vec![
                SpeedBand::new(12.0, 1.25),
                SpeedBand::new(30.0, 1.0),
                SpeedBand::new(50.0, 0.9),
                SpeedBand::new(75.0, 0.8),
            ],
            min_speed_mph: 5.0,
            brake_lateral_g: 1.2,
            max_accel_g: 16.0,
            history_len: 30,
            pattern_matching: true,
            drop_threshold_g: 0.6,
            bounce_threshold_g: 0.6,
            bounce_min_ms: 16.0,
            bounce_window_ms: 300.0,
            cooldown_ms: 1200.0,
            min_severity: 1.0,
            max_severity: 10.0,
            severity_scale: 4.0,
            pattern_weight: 0.5,
            high_speed_mph: 45.0,
            high_speed_boost: 1.2,
        }
    }
}

impl DetectionConfig {
    /// High-pass-only z spike with a fixed threshold: no pattern search, no
    /// speed scaling, no speed cutoff.
    pub fn spike_only() -> Self {
        Self {
            speed_scaling: false,
            pattern_matching: false,
            min_speed_mph: 0.0,
            ..Self::default()
        }
    }

    /// Parse a (possibly partial) JSON document and validate it
    pub fn from_json_str(json: &str) -> BResult<Self> {
        let config: DetectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> BResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> BResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject anything that would leave the detector partially configured
    pub fn validate(&self) -> BResult<()> {
        check_finite("hp_alpha", self.hp_alpha)?;
        check_finite("lp_beta", self.lp_beta)?;
        check_unit_open("hp_alpha", self.hp_alpha)?;
        check_unit_open("lp_beta", self.lp_beta)?;

        if self.sample_interval_ms == 0 {
            return Err(invalid("sample_interval_ms must be > 0"));
        }

        for (name, value) in [
            ("base_threshold_g", self.base_threshold_g),
            ("brake_lateral_g", self.brake_lateral_g),
            ("max_accel_g", self.max_accel_g),
            ("drop_threshold_g", self.drop_threshold_g),
            ("bounce_threshold_g", self.bounce_threshold_g),
            ("cooldown_ms", self.cooldown_ms),
            ("severity_scale", self.severity_scale),
            ("high_speed_boost", self.high_speed_boost),
        ] {
            check_positive(name, value)?;
        }

        for (name, value) in [
            ("min_speed_mph", self.min_speed_mph),
            ("bounce_min_ms", self.bounce_min_ms),
            ("bounce_window_ms", self.bounce_window_ms),
            ("pattern_weight", self.pattern_weight),
            ("high_speed_mph", self.high_speed_mph),
        ] {
            check_non_negative(name, value)?;
        }

        if !(2..=MAX_HISTORY_LEN).contains(&self.history_len) {
            return Err(invalid(&format!(
                "history_len must be in [2, {}], got {}",
                MAX_HISTORY_LEN, self.history_len
            )));
        }
        if self.bounce_min_ms > self.bounce_window_ms {
            return Err(invalid("bounce_min_ms must not exceed bounce_window_ms"));
        }

        check_finite("min_severity", self.min_severity)?;
        check_finite("max_severity", self.max_severity)?;
        if self.min_severity >= self.max_severity {
            return Err(invalid("min_severity must be below max_severity"));
        }

        if self.speed_scaling && self.speed_bands.is_empty() {
            return Err(invalid("speed_bands must not be empty when speed_scaling is on"));
        }
        let mut previous_bound = f64::NEG_INFINITY;
        for (index, band) in self.speed_bands.iter().enumerate() {
            check_non_negative(&format!("speed_bands[{}].max_speed_mph", index), band.max_speed_mph)?;
            check_positive(&format!("speed_bands[{}].factor", index), band.factor)?;
            if band.max_speed_mph <= previous_bound {
                return Err(invalid(&format!(
                    "speed_bands must be strictly ascending (band {} is {} mph)",
                    index, band.max_speed_mph
                )));
            }
            previous_bound = band.max_speed_mph;
        }

        Ok(())
    }
}

fn invalid(message: &str) -> BumpDetectorError {
    BumpDetectorError::InvalidConfig(message.to_string())
}

fn check_finite(name: &str, value: f64) -> BResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be finite, got {}", name, value)))
    }
}

fn check_unit_open(name: &str, value: f64) -> BResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be in (0, 1), got {}", name, value)))
    }
}

fn check_positive(name: &str, value: f64) -> BResult<()> {
    check_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be > 0, got {}", name, value)))
    }
}

fn check_non_negative(name: &str, value: f64) -> BResult<()> {
    check_finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be >= 0, got {}", name, value)))
    }
}
