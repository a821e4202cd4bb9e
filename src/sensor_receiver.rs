use serde::{Deserialize, Serialize};

pub const MPS_TO_MPH: f64 = 2.236_936_292_054_402;

/// Accelerometer sample as delivered by the sensor source.
///
/// Axes are in g, `timestamp` is a monotonic clock in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl RawSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    /// True when every axis and the timestamp are finite numbers
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.timestamp.is_finite()
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Band-passed acceleration, same units as the raw sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilteredSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl FilteredSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }
}

/// Most recent position/speed fix from the location tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f64,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64, speed_mps: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
        }
    }

    /// Fix from coordinates and a speed given in miles per hour
    pub fn with_speed_mph(latitude: f64, longitude: f64, speed_mph: f64) -> Self {
        Self::new(latitude, longitude, speed_mph / MPS_TO_MPH)
    }

    pub fn speed_mph(&self) -> f64 {
        mps_to_mph(self.speed_mps)
    }

    /// Android reports -1 (or garbage) when speed is unknown
    pub fn is_usable(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.speed_mps.is_finite()
            && self.speed_mps >= 0.0
    }
}

pub fn mps_to_mph(speed_mps: f64) -> f64 {
    speed_mps * MPS_TO_MPH
}
