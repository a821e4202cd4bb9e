use crate::config::DetectionConfig;

/// Maps spike size, pattern confirmation and speed onto a bounded score
#[derive(Clone, Debug)]
pub struct SeverityScorer {
    base_threshold: f64,
    scale: f64,
    min_severity: f64,
    max_severity: f64,
    pattern_weight: f64,
    high_speed_mph: f64,
    high_speed_boost: f64,
}

impl SeverityScorer {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            base_threshold: config.base_threshold_g,
            scale: config.severity_scale,
            min_severity: config.min_severity,
            max_severity: config.max_severity,
            pattern_weight: config.pattern_weight,
            high_speed_mph: config.high_speed_mph,
            high_speed_boost: config.high_speed_boost,
        }
    }

    /// `(|spike| - base)·scale + min`, plus the weighted pattern score, boosted
    /// above the high-speed cutoff, rounded to 0.1 and clamped.
    pub fn score(&self, spike_z: f64, pattern_score: f64, speed_mph: Option<f64>) -> f64 {
        let mut raw = (spike_z.abs() - self.base_threshold) * self.scale + self.min_severity;

        if pattern_score > 0.0 {
            raw += pattern_score * self.pattern_weight;
        }
        if speed_mph.map_or(false, |speed| speed > self.high_speed_mph) {
            raw *= self.high_speed_boost;
        }

        let rounded = (raw * 10.0).round() / 10.0;
        rounded.clamp(self.min_severity, self.max_severity)
    }
}
