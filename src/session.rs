use crate::config::DetectionConfig;
use crate::detection::{BumpDetector, DetectorStats, SampleTrace};
use crate::error::{BResult, BumpDetectorError};
use crate::event::BumpEvent;
use crate::location::LocationProvider;
use crate::sensor_source::{SampleListener, SensorSource, Subscription};
use chrono::Utc;
use crossbeam::channel::{Sender, TrySendError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Receives every admitted detection, synchronously and in order
pub trait EventSink: Send {
    fn on_bump(&mut self, event: BumpEvent);
}

impl<F> EventSink for F
where
    F: FnMut(BumpEvent) + Send,
{
    fn on_bump(&mut self, event: BumpEvent) {
        self(event)
    }
}

/// Queued delivery; never blocks the sample path
impl EventSink for Sender<BumpEvent> {
    fn on_bump(&mut self, event: BumpEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event queue full, dropping bump at t={:.0}ms", event.timestamp)
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Event queue closed, dropping bump at t={:.0}ms", event.timestamp)
            }
        }
    }
}

/// Optional per-sample diagnostics callback
pub type TraceSink = Box<dyn FnMut(&SampleTrace) + Send>;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No subscription, nothing processed
    Idle,
    /// Subscribed and processing samples
    Running,
}

struct Pipeline {
    detector: BumpDetector,
    location: Arc<dyn LocationProvider>,
    sink: Box<dyn EventSink>,
    trace: Option<TraceSink>,
}

struct Control<S> {
    source: S,
    subscription: Option<Box<dyn Subscription>>,
    halt: Option<Arc<AtomicBool>>,
    session_id: Option<String>,
    last_stats: DetectorStats,
}

thread_local! {
    // Set while a session's sinks run on this thread: (session key, halt flag)
    static ACTIVE_SINK: RefCell<Option<(usize, Arc<AtomicBool>)>> = const { RefCell::new(None) };
}

fn with_sink_scope<R>(key: usize, halt: &Arc<AtomicBool>, f: impl FnOnce() -> R) -> R {
    let previous = ACTIVE_SINK.with(|slot| slot.replace(Some((key, Arc::clone(halt)))));
    let result = f();
    ACTIVE_SINK.with(|slot| *slot.borrow_mut() = previous);
    result
}

fn sink_scope_halt(key: usize) -> Option<Arc<AtomicBool>> {
    ACTIVE_SINK.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|(active, _)| *active == key)
            .map(|(_, halt)| Arc::clone(halt))
    })
}

/// One detection session over a sensor source.
///
/// `Idle → Running → Idle`. All methods take `&self`, so the session can be
/// shared (e.g. in an `Arc`) and stopped from any thread, including from
/// inside its own event sink.
pub struct DetectionSession<S: SensorSource> {
    control: Mutex<Control<S>>,
    pipeline: Arc<Mutex<Option<Pipeline>>>,
    running: AtomicBool,
}

impl<S: SensorSource> DetectionSession<S> {
    /// Create new session in Idle state
    pub fn new(source: S) -> Self {
        DetectionSession {
            control: Mutex::new(Control {
                source,
                subscription: None,
                halt: None,
                session_id: None,
                last_stats: DetectorStats::default(),
            }),
            pipeline: Arc::new(Mutex::new(None)),
            running: AtomicBool::new(false),
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.pipeline) as usize
    }

    /// Idle → Running. A no-op when already running.
    pub fn start<E>(
        &self,
        config: DetectionConfig,
        location: Arc<dyn LocationProvider>,
        sink: E,
    ) -> BResult<()>
    where
        E: EventSink + 'static,
    {
        self.start_traced(config, location, sink, None)
    }

    /// `start` with a callback receiving the trace of every sample
    pub fn start_traced<E>(
        &self,
        config: DetectionConfig,
        location: Arc<dyn LocationProvider>,
        sink: E,
        trace: Option<TraceSink>,
    ) -> BResult<()>
    where
        E: EventSink + 'static,
    {
        if sink_scope_halt(self.key()).is_some() {
            return Err(BumpDetectorError::InvalidState(
                "start called from inside the session's own sink".to_string(),
            ));
        }

        let mut control = self
            .control
            .lock()
            .map_err(|_| BumpDetectorError::lock_poisoned("session control"))?;

        if self.running.load(Ordering::Acquire) {
            debug!("start ignored: session already running");
            return Ok(());
        }

        // Leftovers of a stop issued from inside the sink
        if let Some(subscription) = control.subscription.take() {
            subscription.remove();
        }

        let detector = BumpDetector::new(config)?;
        let interval = Duration::from_millis(detector.config().sample_interval_ms);
        control.source.set_update_interval(interval)?;

        let halt = Arc::new(AtomicBool::new(false));
        {
            let mut pipeline = self
                .pipeline
                .lock()
                .map_err(|_| BumpDetectorError::lock_poisoned("pipeline"))?;
            *pipeline = Some(Pipeline {
                detector,
                location,
                sink: Box::new(sink),
                trace,
            });
        }

        let listener = make_listener(Arc::clone(&self.pipeline), Arc::clone(&halt));
        let subscription = match control.source.subscribe(listener) {
            Ok(subscription) => subscription,
            Err(e) => {
                halt.store(true, Ordering::Release);
                if let Ok(mut pipeline) = self.pipeline.lock() {
                    *pipeline = None;
                }
                warn!("Detection session failed to start: {}", e);
                return Err(e);
            }
        };

        let session_id = format!("bumps_{}", Utc::now().timestamp_millis());
        info!(
            "Detection session {} started ({} ms interval)",
            session_id,
            interval.as_millis()
        );
        control.subscription = Some(subscription);
        control.halt = Some(halt);
        control.session_id = Some(session_id);
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Running → Idle. Idempotent. After it returns no further sample is
    /// processed and no further event fires.
    pub fn stop(&self) -> BResult<()> {
        if let Some(halt) = sink_scope_halt(self.key()) {
            return self.stop_from_sink(halt);
        }

        let mut control = self
            .control
            .lock()
            .map_err(|_| BumpDetectorError::lock_poisoned("session control"))?;

        if let Some(halt) = control.halt.take() {
            halt.store(true, Ordering::Release);
        }
        if let Some(subscription) = control.subscription.take() {
            subscription.remove();
        }

        // Waits out a callback still running on another thread
        let finished = self
            .pipeline
            .lock()
            .map_err(|_| BumpDetectorError::lock_poisoned("pipeline"))?
            .take();
        if let Some(pipeline) = finished {
            control.last_stats = pipeline.detector.stats().clone();
        }

        if self.running.swap(false, Ordering::AcqRel) {
            info!(
                "Detection session {} stopped: {} samples, {} events",
                control.session_id.as_deref().unwrap_or("?"),
                control.last_stats.samples_seen,
                control.last_stats.events_emitted
            );
        }
        Ok(())
    }

    /// Stop requested by the sink on the delivering thread. The pipeline lock
    /// is held further up this stack, so only flag and unsubscribe here; the
    /// detector is released by the next `stop` or `start`.
    fn stop_from_sink(&self, halt: Arc<AtomicBool>) -> BResult<()> {
        halt.store(true, Ordering::Release);
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Ok(mut control) = self.control.try_lock() {
            if let Some(subscription) = control.subscription.take() {
                subscription.remove();
            }
        }
        info!("Detection session stopped from its event sink");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        if self.running.load(Ordering::Acquire) {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Counters of the running session, or of the last one once stopped
    pub fn stats(&self) -> BResult<DetectorStats> {
        if sink_scope_halt(self.key()).is_some() {
            return Err(BumpDetectorError::InvalidState(
                "stats are not available from inside the session's own sink".to_string(),
            ));
        }

        let live = self
            .pipeline
            .lock()
            .map_err(|_| BumpDetectorError::lock_poisoned("pipeline"))?
            .as_ref()
            .map(|pipeline| pipeline.detector.stats().clone());

        match live {
            Some(stats) => Ok(stats),
            None => Ok(self
                .control
                .lock()
                .map_err(|_| BumpDetectorError::lock_poisoned("session control"))?
                .last_stats
                .clone()),
        }
    }
}

impl<S: SensorSource> Drop for DetectionSession<S> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn make_listener(pipeline: Arc<Mutex<Option<Pipeline>>>, halt: Arc<AtomicBool>) -> SampleListener {
    let key = Arc::as_ptr(&pipeline) as usize;
    Box::new(move |sample| {
        if halt.load(Ordering::Acquire) {
            return;
        }
        let mut guard = match pipeline.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        // stop() may have won the race for the lock
        if halt.load(Ordering::Acquire) {
            return;
        }
        let Some(active) = guard.as_mut() else {
            return;
        };

        let fix = active.location.latest_fix();
        let trace = active.detector.process(&sample, fix);

        with_sink_scope(key, &halt, || {
            if let Some(trace_sink) = active.trace.as_mut() {
                trace_sink(&trace);
            }
            if let Some(event) = trace.event() {
                if !halt.load(Ordering::Acquire) {
                    active.sink.on_bump(*event);
                }
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SharedLocation;
    use crate::sensor_receiver::{LocationFix, RawSample};
    use crate::sensor_source::{ChannelSensorSource, ManualFeed, ManualSensorSource};
    use approx::assert_relative_eq;
    use crossbeam::channel;

    const DT: f64 = 16.0;

    fn scenario_config() -> DetectionConfig {
        DetectionConfig {
            hp_alpha: 0.8,
            base_threshold_g: 1.2,
            cooldown_ms: 800.0,
            ..DetectionConfig::default()
        }
    }

    fn location_at(speed_mph: f64) -> SharedLocation {
        let location = SharedLocation::new();
        location.update(LocationFix::with_speed_mph(51.5074, -0.1278, speed_mph));
        location
    }

    fn collector() -> (Arc<Mutex<Vec<BumpEvent>>>, impl FnMut(BumpEvent) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);
        (events, move |event| sink_events.lock().unwrap().push(event))
    }

    fn push_z(feed: &ManualFeed, t: f64, z: f64) -> bool {
        feed.push(RawSample::new(0.0, 0.0, z, t))
    }

    fn manual_session() -> (DetectionSession<ManualSensorSource>, ManualFeed) {
        let source = ManualSensorSource::new();
        let feed = source.feed();
        (DetectionSession::new(source), feed)
    }

    #[test]
    fn test_session_state_transitions() {
        let (session, feed) = manual_session();
        let (_events, sink) = collector();
        assert_eq!(session.state(), SessionState::Idle);

        session
            .start(scenario_config(), Arc::new(location_at(20.0)), sink)
            .unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(feed.is_subscribed());

        // Second start is a no-op: the single-listener source would reject a
        // second subscription
        let (_other, other_sink) = collector();
        session
            .start(scenario_config(), Arc::new(location_at(20.0)), other_sink)
            .unwrap();
        assert!(session.is_running());

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!feed.is_subscribed());

        // Idempotent
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_scenario_through_session() {
        let (session, feed) = manual_session();
        let (events, sink) = collector();
        session
            .start(scenario_config(), Arc::new(location_at(20.0)), sink)
            .unwrap();

        for (i, z) in [0.0, 0.0, 2.0, -0.2].iter().enumerate() {
            assert!(push_z(&feed, i as f64 * DT, *z));
        }
        // Spike 100 ms after the last sample, inside the cooldown
        push_z(&feed, 3.0 * DT + 100.0, 4.0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].timestamp, 32.0);
        assert_relative_eq!(events[0].severity, 1.6);
        assert_relative_eq!(events[0].latitude, 51.5074);

        let stats = session.stats().unwrap();
        assert_eq!(stats.samples_seen, 5);
        assert_eq!(stats.cooldown_suppressions, 1);
    }

    #[test]
    fn test_invalid_config_leaves_session_idle() {
        let (session, feed) = manual_session();
        let (_events, sink) = collector();
        let config = DetectionConfig {
            cooldown_ms: 0.0,
            ..DetectionConfig::default()
        };

        let err = session
            .start(config, Arc::new(location_at(20.0)), sink)
            .unwrap_err();
        assert!(matches!(err, BumpDetectorError::InvalidConfig(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!feed.is_subscribed());
    }

    #[test]
    fn test_sensor_failure_leaves_session_idle() {
        let mut source = ManualSensorSource::new();
        source.fail_subscriptions("accelerometer unavailable");
        let session = DetectionSession::new(source);
        let (_events, sink) = collector();

        let err = session
            .start(scenario_config(), Arc::new(location_at(20.0)), sink)
            .unwrap_err();
        assert!(matches!(err, BumpDetectorError::SensorFailed(_)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_no_event_after_stop() {
        let (session, feed) = manual_session();
        let (events, sink) = collector();
        session
            .start(scenario_config(), Arc::new(location_at(20.0)), sink)
            .unwrap();
        push_z(&feed, 0.0, 0.0);
        push_z(&feed, DT, 0.0);

        session.stop().unwrap();
        session.stop().unwrap();

        assert!(!push_z(&feed, 2.0 * DT, 2.0));
        assert!(!push_z(&feed, 5000.0, 8.0));
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(session.stats().unwrap().samples_seen, 2);
    }

    #[test]
    fn test_restart_resets_state() {
        let (session, feed) = manual_session();
        let events = Arc::new(Mutex::new(Vec::new()));
        let location: Arc<dyn LocationProvider> = Arc::new(location_at(20.0));

        for round in 0..2 {
            let sink_events = Arc::clone(&events);
            session
                .start(scenario_config(), Arc::clone(&location), move |event: BumpEvent| {
                    sink_events.lock().unwrap().push(event)
                })
                .unwrap();
            // Fresh warm-up and cooldown: the same shape fires again right away
            let offset = round as f64 * 100.0;
            for (i, z) in [0.0, 0.0, 2.0].iter().enumerate() {
                push_z(&feed, offset + i as f64 * DT, *z);
            }
            session.stop().unwrap();
        }

        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_fix_drops_event() {
        let (session, feed) = manual_session();
        let (events, sink) = collector();
        let location = SharedLocation::new();
        session
            .start(scenario_config(), Arc::new(location.clone()), sink)
            .unwrap();

        for (i, z) in [0.0, 0.0, 2.0].iter().enumerate() {
            push_z(&feed, i as f64 * DT, *z);
        }
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(session.stats().unwrap().dropped_no_fix, 1);

        // Fix arrives, but the dropped candidate still holds the cooldown
        location.update(LocationFix::with_speed_mph(51.5, -0.12, 20.0));
        push_z(&feed, 3.0 * DT, 6.0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stop_from_inside_sink() {
        let source = ManualSensorSource::new();
        let feed = source.feed();
        let session = Arc::new(DetectionSession::new(source));
        let weak = Arc::downgrade(&session);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = Arc::clone(&events);

        session
            .start(
                DetectionConfig {
                    cooldown_ms: 100.0,
                    ..scenario_config()
                },
                Arc::new(location_at(20.0)),
                move |event: BumpEvent| {
                    sink_events.lock().unwrap().push(event);
                    if let Some(session) = weak.upgrade() {
                        session.stop().unwrap();
                        assert!(session.stats().is_err());
                    }
                },
            )
            .unwrap();

        let mut t = 0.0;
        for _ in 0..5 {
            for z in [0.0, 0.0, 0.0, 3.0] {
                push_z(&feed, t, z);
                t += 200.0;
            }
        }

        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!feed.is_subscribed());
        assert_eq!(session.stats().unwrap().events_emitted, 1);

        // The session can be started again afterwards
        let (_events, sink) = collector();
        session
            .start(scenario_config(), Arc::new(location_at(20.0)), sink)
            .unwrap();
        assert!(session.is_running());
        session.stop().unwrap();
    }

    #[test]
    fn test_trace_sink_sees_every_sample() {
        let (session, feed) = manual_session();
        let traces = Arc::new(Mutex::new(Vec::new()));
        let trace_store = Arc::clone(&traces);
        let (_events, sink) = collector();

        session
            .start_traced(
                scenario_config(),
                Arc::new(location_at(20.0)),
                sink,
                Some(Box::new(move |trace: &SampleTrace| {
                    trace_store.lock().unwrap().push(*trace)
                }) as TraceSink),
            )
            .unwrap();

        feed.push(RawSample::new(0.0, 0.0, 0.0, 0.0));
        feed.push(RawSample::new(f64::NAN, 0.0, 0.0, DT));
        feed.push(RawSample::new(0.0, 0.0, 2.0, 2.0 * DT));

        let traces = traces.lock().unwrap();
        assert_eq!(traces.len(), 3);
        assert!(traces[2].event().is_some());
    }

    #[test]
    fn test_independent_sessions() {
        let (slow_session, slow_feed) = manual_session();
        let (fast_session, fast_feed) = manual_session();
        let (slow_events, slow_sink) = collector();
        let (fast_events, fast_sink) = collector();

        slow_session
            .start(scenario_config(), Arc::new(location_at(2.0)), slow_sink)
            .unwrap();
        fast_session
            .start(scenario_config(), Arc::new(location_at(25.0)), fast_sink)
            .unwrap();

        for (i, z) in [0.0, 0.0, 2.0].iter().enumerate() {
            push_z(&slow_feed, i as f64 * DT, *z);
            push_z(&fast_feed, i as f64 * DT, *z);
        }

        assert!(slow_events.lock().unwrap().is_empty());
        assert_eq!(fast_events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_channel_source_end_to_end() {
        let (sample_tx, source) = ChannelSensorSource::bounded(256);
        let session = DetectionSession::new(source);
        let (event_tx, event_rx) = channel::bounded::<BumpEvent>(16);

        session
            .start(scenario_config(), Arc::new(location_at(20.0)), event_tx)
            .unwrap();
        for (i, z) in [0.0, 0.0, 2.0, -0.2].iter().enumerate() {
            sample_tx
                .send(RawSample::new(0.0, 0.0, *z, i as f64 * DT))
                .unwrap();
        }

        let event = event_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_relative_eq!(event.severity, 1.6);

        session.stop().unwrap();
        // Well past the cooldown, but the subscription is gone
        for (i, z) in [0.0, 5.0, 0.0, 5.0].iter().enumerate() {
            let _ = sample_tx.try_send(RawSample::new(0.0, 0.0, *z, 5000.0 + i as f64 * DT));
        }
        assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(session.stats().unwrap().events_emitted, 1);
    }
}
