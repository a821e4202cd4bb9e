// Road bump detection engine
// Turns accelerometer samples plus a cached location fix into bump events

pub mod config;
pub mod detection;
pub mod error;
pub mod event;
pub mod filters;
pub mod location;
pub mod sensor_receiver;
pub mod sensor_source;
pub mod sensors;
pub mod session;

pub use config::{DetectionConfig, SpeedBand};
pub use detection::{BumpDetector, DetectorStats, SampleTrace, Verdict};
pub use error::{BResult, BumpDetectorError};
pub use event::BumpEvent;
pub use location::{LocationProvider, SharedLocation};
pub use sensor_receiver::{FilteredSample, LocationFix, RawSample};
pub use sensor_source::{
    ChannelSensorSource, ManualFeed, ManualSensorSource, SampleListener, SensorSource,
    Subscription,
};
pub use session::{DetectionSession, EventSink, SessionState, TraceSink};
