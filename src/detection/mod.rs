//! Bump detection pipeline
//!
//! Leaves first: history buffer, pattern matcher, threshold policy, event
//! gate and severity scorer, composed per sample by `BumpDetector`.

pub mod detector;
pub mod gate;
pub mod history;
pub mod pattern;
pub mod severity;
pub mod threshold;

pub use detector::{BumpDetector, DetectorStats, SampleTrace, Verdict};
pub use gate::EventGate;
pub use history::{HistoryBuffer, PatternScan};
pub use pattern::PatternMatcher;
pub use severity::SeverityScorer;
pub use threshold::ThresholdPolicy;
