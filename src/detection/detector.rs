use crate::config::DetectionConfig;
use crate::detection::gate::EventGate;
use crate::detection::history::{HistoryBuffer, PatternScan};
use crate::detection::pattern::PatternMatcher;
use crate::detection::severity::SeverityScorer;
use crate::detection::threshold::ThresholdPolicy;
use crate::error::BResult;
use crate::event::BumpEvent;
use crate::filters::BandPassFilter;
use crate::sensor_receiver::{FilteredSample, LocationFix, RawSample};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Why a sample did or did not become an event
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// NaN/∞ from the sensor, dropped before touching any state
    Rejected,
    /// First output of the session
    WarmUp,
    BelowThreshold,
    Braking,
    BelowMinSpeed,
    /// Over threshold but inside the cooldown of the previous event
    Cooldown,
    /// Admitted, but no location fix to attach it to
    NoFix,
    Emitted(BumpEvent),
}

/// Per-sample diagnostics, one per `process` call
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleTrace {
    pub timestamp: f64,
    pub raw: RawSample,
    pub filtered: FilteredSample,
    pub spike: f64,
    pub threshold: f64,
    pub speed_mph: Option<f64>,
    pub braking: bool,
    pub pattern: PatternScan,
    pub verdict: Verdict,
}

impl SampleTrace {
    fn new(raw: &RawSample, verdict: Verdict) -> Self {
        Self {
            timestamp: raw.timestamp,
            raw: *raw,
            filtered: FilteredSample::default(),
            spike: 0.0,
            threshold: 0.0,
            speed_mph: None,
            braking: false,
            pattern: PatternScan::default(),
            verdict,
        }
    }

    pub fn event(&self) -> Option<&BumpEvent> {
        match &self.verdict {
            Verdict::Emitted(event) => Some(event),
            _ => None,
        }
    }
}

/// Running counters for one session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub samples_seen: u64,
    pub samples_rejected: u64,
    pub warm_up_samples: u64,
    pub candidates: u64,
    pub braking_rejections: u64,
    pub speed_rejections: u64,
    pub cooldown_suppressions: u64,
    pub dropped_no_fix: u64,
    pub events_emitted: u64,
    pub last_event_ms: Option<f64>,
}

/// The whole per-sample pipeline for one session.
///
/// filter → history → threshold/braking/speed → cooldown → pattern →
/// severity → location. Exclusively owned; nothing here is shared between
/// sessions.
#[derive(Clone, Debug)]
pub struct BumpDetector {
    config: DetectionConfig,
    filter: BandPassFilter,
    history: HistoryBuffer,
    matcher: PatternMatcher,
    policy: ThresholdPolicy,
    gate: EventGate,
    scorer: SeverityScorer,
    stats: DetectorStats,
}

impl BumpDetector {
    /// Validates the configuration; a detector never exists half-configured
    pub fn new(config: DetectionConfig) -> BResult<Self> {
        config.validate()?;
        Ok(Self {
            filter: BandPassFilter::new(config.hp_alpha, config.lp_beta),
            history: HistoryBuffer::new(config.history_len),
            matcher: PatternMatcher::from_config(&config),
            policy: ThresholdPolicy::from_config(&config),
            gate: EventGate::new(config.cooldown_ms),
            scorer: SeverityScorer::from_config(&config),
            stats: DetectorStats::default(),
            config,
        })
    }

    /// Run one raw sample through the pipeline.
    ///
    /// `fix` is the latest cached location; `None` means no fix yet. Without
    /// a fix the speed-dependent parts fall back to the base threshold and
    /// no cutoff, and an admitted candidate is dropped (cooldown still
    /// advances).
    pub fn process(&mut self, raw: &RawSample, fix: Option<LocationFix>) -> SampleTrace {
        self.stats.samples_seen += 1;

        if !raw.is_finite() {
            return self.reject(raw, "non-finite");
        }
        if raw.magnitude() > self.config.max_accel_g {
            return self.reject(raw, "out-of-range");
        }

        let (filtered, warm_up) = match self.filter.update(raw) {
            Some(output) => output,
            None => return self.reject(raw, "overflowing"),
        };
        let mut trace = SampleTrace::new(raw, Verdict::WarmUp);
        trace.filtered = filtered;

        if warm_up {
            self.stats.warm_up_samples += 1;
            return trace;
        }

        self.history.push(filtered);

        let fix = fix.filter(LocationFix::is_usable);
        let speed_mph = fix.map(|f| f.speed_mph());
        trace.speed_mph = speed_mph;
        trace.spike = filtered.z.abs();
        trace.threshold = self.policy.effective_threshold(speed_mph);
        trace.braking = self.policy.is_braking(&filtered);

        if trace.spike <= trace.threshold {
            trace.verdict = Verdict::BelowThreshold;
            return trace;
        }
        self.stats.candidates += 1;

        if trace.braking {
            self.stats.braking_rejections += 1;
            trace.verdict = Verdict::Braking;
            return trace;
        }
        if self.policy.below_min_speed(speed_mph) {
            self.stats.speed_rejections += 1;
            trace.verdict = Verdict::BelowMinSpeed;
            return trace;
        }
        if !self.gate.admit(raw.timestamp) {
            self.stats.cooldown_suppressions += 1;
            trace.verdict = Verdict::Cooldown;
            return trace;
        }
        self.stats.last_event_ms = self.gate.last_event_ms();

        if self.config.pattern_matching {
            trace.pattern = self.history.scan(&self.matcher);
        }
        let severity = self
            .scorer
            .score(filtered.z, trace.pattern.score, speed_mph);

        match fix {
            Some(fix) => {
                let event = BumpEvent {
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                    severity,
                    speed_mps: fix.speed_mps,
                    timestamp: raw.timestamp,
                };
                self.stats.events_emitted += 1;
                debug!(
                    "Bump at t={:.0}ms severity {:.1} (spike {:.2}g > {:.2}g, pattern {:.2})",
                    raw.timestamp, severity, trace.spike, trace.threshold, trace.pattern.score
                );
                trace.verdict = Verdict::Emitted(event);
            }
            None => {
                self.stats.dropped_no_fix += 1;
                debug!(
                    "Dropping bump candidate at t={:.0}ms: no location fix",
                    raw.timestamp
                );
                trace.verdict = Verdict::NoFix;
            }
        }

        trace
    }

    /// Discard a sample at ingestion; filter, history and gate stay as they were
    fn reject(&mut self, raw: &RawSample, why: &str) -> SampleTrace {
        self.stats.samples_rejected += 1;
        if self.stats.samples_rejected == 1 {
            warn!("Discarding {} accelerometer sample at t={}", why, raw.timestamp);
        } else {
            debug!(
                "Discarding {} sample ({} rejected so far)",
                why, self.stats.samples_rejected
            );
        }
        SampleTrace::new(raw, Verdict::Rejected)
    }

    /// Back to the state of a freshly started session
    pub fn reset(&mut self) {
        self.filter.reset();
        self.history.clear();
        self.gate.reset();
        self.stats = DetectorStats::default();
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &DetectorStats {
        &self.stats
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }
}
