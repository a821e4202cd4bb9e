use crate::location::SharedLocation;
use crate::sensor_receiver::{LocationFix, RawSample};
use crossbeam::channel::{Sender, TrySendError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tokio::time::{interval, Duration, Instant};

/// Shape of the simulated road
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadProfile {
    /// Vertical vibration amplitude (g)
    pub roughness_g: f64,
    /// Time between potholes (ms)
    pub pothole_every_ms: f64,
    /// Depth of the drop into a pothole (g)
    pub pothole_depth_g: f64,
    /// Rebound as a multiple of the depth
    pub rebound_ratio: f64,
}

impl Default for RoadProfile {
    fn default() -> Self {
        Self {
            roughness_g: 0.08,
            pothole_every_ms: 4000.0,
            pothole_depth_g: 2.2,
            rebound_ratio: 1.6,
        }
    }
}

impl RoadProfile {
    /// Smooth road, never a pothole
    pub fn smooth() -> Self {
        Self {
            pothole_every_ms: f64::INFINITY,
            ..Self::default()
        }
    }
}

/// Accelerometer reading in g at `t_ms` since the drive started.
///
/// Gravity on z plus vibration; each pothole is a 48 ms drop followed by a
/// 48 ms rebound.
pub fn synthetic_sample(profile: &RoadProfile, t_ms: f64) -> RawSample {
    let t = t_ms / 1000.0;
    let mut z = 1.0 + (t * 2.0 * PI * 7.0).sin() * profile.roughness_g;

    if profile.pothole_every_ms.is_finite() && profile.pothole_every_ms > 0.0 {
        let phase = t_ms % profile.pothole_every_ms;
        let start = profile.pothole_every_ms / 2.0;
        if (start..start + 48.0).contains(&phase) {
            z -= profile.pothole_depth_g;
        } else if (start + 48.0..start + 96.0).contains(&phase) {
            z += profile.pothole_depth_g * profile.rebound_ratio;
        }
    }

    RawSample::new(
        (t * 2.0 * PI * 0.5).sin() * profile.roughness_g,
        (t * 2.0 * PI * 0.3).cos() * profile.roughness_g * 0.5,
        z,
        t_ms,
    )
}

/// Simulated accelerometer: one sample per tick into the channel
pub async fn synthetic_accel_loop(tx: Sender<RawSample>, interval_ms: u64, profile: RoadProfile) {
    let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
    let started = Instant::now();
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;
        let t_ms = started.elapsed().as_secs_f64() * 1000.0;

        match tx.try_send(synthetic_sample(&profile, t_ms)) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 500 == 0 {
                    debug!("[accel] {} samples", sample_count);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                info!("[accel] Channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Consumer behind, drop this sample
            }
        }
    }
}

/// Simulated location tracker: heads north-east at `speed_mps`, one fix per tick
pub async fn synthetic_gps_loop(location: SharedLocation, speed_mps: f64, every: Duration) {
    let mut ticker = interval(every);
    let mut fix_count = 0u64;
    let (mut latitude, mut longitude) = (51.5074, -0.1278);
    // Degrees per metre, close enough at this latitude
    let step = speed_mps * every.as_secs_f64() / 111_320.0;

    loop {
        ticker.tick().await;
        let speed = speed_mps + (fix_count as f64 * 0.5).sin() * 0.5;
        location.update(LocationFix::new(latitude, longitude, speed.max(0.0)));
        latitude += step;
        longitude += step;
        fix_count += 1;
        debug!("[gps] {} fixes", fix_count);
    }
}
