use crate::config::{DetectionConfig, SpeedBand};
use crate::sensor_receiver::FilteredSample;

/// Speed-dependent spike threshold plus the braking/turning heuristic.
///
/// Slow: the suspension sinks further into the same defect, so spikes run
/// large and the threshold goes up. Fast: the car skims small defects, so
/// the threshold comes down only for what still registers.
#[derive(Clone, Debug)]
pub struct ThresholdPolicy {
    base_threshold: f64,
    speed_scaling: bool,
    bands: Vec<SpeedBand>,
    min_speed_mph: f64,
    brake_lateral_g: f64,
}

impl ThresholdPolicy {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            base_threshold: config.base_threshold_g,
            speed_scaling: config.speed_scaling,
            bands: config.speed_bands.clone(),
            min_speed_mph: config.min_speed_mph,
            brake_lateral_g: config.brake_lateral_g,
        }
    }

    /// Multiplier for the given speed; 1.0 when scaling is off or speed unknown
    pub fn speed_factor(&self, speed_mph: Option<f64>) -> f64 {
        let speed = match speed_mph {
            Some(speed) if self.speed_scaling => speed,
            _ => return 1.0,
        };

        self.bands
            .iter()
            .find(|band| speed <= band.max_speed_mph)
            .or_else(|| self.bands.last())
            .map(|band| band.factor)
            .unwrap_or(1.0)
    }

    pub fn effective_threshold(&self, speed_mph: Option<f64>) -> f64 {
        self.base_threshold * self.speed_factor(speed_mph)
    }

    /// Parked or crawling: jostling here is not road surface.
    /// Unknown speed is not treated as slow.
    pub fn below_min_speed(&self, speed_mph: Option<f64>) -> bool {
        match speed_mph {
            Some(speed) => speed < self.min_speed_mph,
            None => false,
        }
    }

    /// Strong lateral component that z does not dominate
    pub fn is_braking(&self, filtered: &FilteredSample) -> bool {
        let lateral = filtered.y.abs();
        lateral > self.brake_lateral_g && filtered.z.abs() <= lateral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::from_config(&DetectionConfig::default())
    }

    #[test]
    fn test_band_selection() {
        let p = policy();
        assert_relative_eq!(p.speed_factor(Some(8.0)), 1.25);
        assert_relative_eq!(p.speed_factor(Some(12.0)), 1.25);
        assert_relative_eq!(p.speed_factor(Some(20.0)), 1.0);
        assert_relative_eq!(p.speed_factor(Some(40.0)), 0.9);
        assert_relative_eq!(p.speed_factor(Some(70.0)), 0.8);
        // Past the table: last band
        assert_relative_eq!(p.speed_factor(Some(120.0)), 0.8);
    }

    #[test]
    fn test_effective_threshold() {
        let p = policy();
        assert_relative_eq!(p.effective_threshold(Some(20.0)), 1.8);
        assert_relative_eq!(p.effective_threshold(Some(5.0)), 2.25);
        assert_relative_eq!(p.effective_threshold(None), 1.8);
    }

    #[test]
    fn test_scaling_disabled() {
        let p = ThresholdPolicy::from_config(&DetectionConfig::spike_only());
        assert_relative_eq!(p.effective_threshold(Some(5.0)), 1.8);
        assert_relative_eq!(p.effective_threshold(Some(70.0)), 1.8);
        assert!(!p.below_min_speed(Some(0.0)));
    }

    #[test]
    fn test_min_speed_cutoff() {
        let p = policy();
        assert!(p.below_min_speed(Some(0.0)));
        assert!(p.below_min_speed(Some(4.9)));
        assert!(!p.below_min_speed(Some(5.0)));
        assert!(!p.below_min_speed(None));
    }

    #[test]
    fn test_braking_rejection() {
        let p = policy();
        // Large lateral, z smaller than it (even though z is over the base threshold)
        assert!(p.is_braking(&FilteredSample::new(0.0, 2.5, 2.0, 0.0)));
        assert!(p.is_braking(&FilteredSample::new(0.0, -2.5, -2.0, 0.0)));
        // z dominates
        assert!(!p.is_braking(&FilteredSample::new(0.0, 1.5, 2.4, 0.0)));
        // Lateral under the bound
        assert!(!p.is_braking(&FilteredSample::new(0.0, 1.0, 0.2, 0.0)));
    }
}
