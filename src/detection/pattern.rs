use crate::config::DetectionConfig;
use crate::detection::history::HistoryBuffer;

/// Drop-then-bounce search over the history buffer.
///
/// A wheel dropping into a pothole pulls z negative, then the rebound pushes
/// it positive a few tens of milliseconds later. A single noisy spike has no
/// such two-phase shape.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternMatcher {
    drop_threshold: f64,
    bounce_threshold: f64,
    bounce_min_ms: f64,
    bounce_window_ms: f64,
}

impl PatternMatcher {
    pub fn new(
        drop_threshold: f64,
        bounce_threshold: f64,
        bounce_min_ms: f64,
        bounce_window_ms: f64,
    ) -> Self {
        Self {
            drop_threshold,
            bounce_threshold,
            bounce_min_ms,
            bounce_window_ms,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.drop_threshold_g,
            config.bounce_threshold_g,
            config.bounce_min_ms,
            config.bounce_window_ms,
        )
    }

    /// Returns `|drop_z| + bounce_z`, or 0.0 when no signature is present.
    ///
    /// The drop is the most recent entry below `-drop_threshold`. The bounce
    /// is the tallest later entry above `+bounce_threshold` that lands inside
    /// `[bounce_min_ms, bounce_window_ms]` after the drop.
    pub fn find_pothole_signature(&self, buffer: &HistoryBuffer) -> f64 {
        let drop_index = match buffer
            .iter()
            .rposition(|entry| entry.z < -self.drop_threshold)
        {
            Some(index) => index,
            None => return 0.0,
        };
        let drop = match buffer.get(drop_index) {
            Some(entry) => *entry,
            None => return 0.0,
        };

        let mut best_bounce: Option<f64> = None;
        for entry in buffer.iter().skip(drop_index + 1) {
            let elapsed = entry.timestamp - drop.timestamp;
            if elapsed > self.bounce_window_ms {
                break;
            }
            if elapsed >= self.bounce_min_ms && entry.z > self.bounce_threshold {
                best_bounce = Some(best_bounce.map_or(entry.z, |best| best.max(entry.z)));
            }
        }

        match best_bounce {
            Some(bounce_z) => drop.z.abs() + bounce_z,
            None => 0.0,
        }
    }
}
