use serde::{Deserialize, Serialize};

/// A confirmed road anomaly
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BumpEvent {
    pub latitude: f64,
    pub longitude: f64,
    pub severity: f64,
    pub speed_mps: f64,
    pub timestamp: f64, // ms, same clock as the samples
}
