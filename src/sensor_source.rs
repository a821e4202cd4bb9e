use crate::error::{BResult, BumpDetectorError};
use crate::sensor_receiver::RawSample;
use crossbeam::channel::{self, Receiver, Sender};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback receiving every accelerometer sample of a subscription
pub type SampleListener = Box<dyn FnMut(RawSample) + Send + 'static>;

/// Live subscription handle.
///
/// After `remove` returns the listener is never invoked again, except when
/// `remove` is called from inside the listener itself: then the current
/// invocation finishes and nothing follows it.
pub trait Subscription: Send {
    fn remove(self: Box<Self>);
}

/// Accelerometer provider the session subscribes to
pub trait SensorSource: Send {
    fn set_update_interval(&mut self, interval: Duration) -> BResult<()>;
    fn subscribe(&mut self, listener: SampleListener) -> BResult<Box<dyn Subscription>>;
}

// ---------------------------------------------------------------------------
// Manual source: samples pushed by the caller on its own thread
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FeedSlot {
    generation: u64,
    active: Option<u64>,
    listener: Option<SampleListener>,
}

/// Push-driven source for replays and tests. Deterministic: each
/// `ManualFeed::push` runs the listener to completion before returning.
#[derive(Default)]
pub struct ManualSensorSource {
    slot: Arc<Mutex<FeedSlot>>,
    interval: Option<Duration>,
    failure: Option<String>,
}

impl ManualSensorSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer handle; cheap to clone
    pub fn feed(&self) -> ManualFeed {
        ManualFeed {
            slot: Arc::clone(&self.slot),
        }
    }

    /// Make every following `subscribe` fail, as a broken sensor would
    pub fn fail_subscriptions(&mut self, reason: &str) {
        self.failure = Some(reason.to_string());
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl SensorSource for ManualSensorSource {
    fn set_update_interval(&mut self, interval: Duration) -> BResult<()> {
        self.interval = Some(interval);
        Ok(())
    }

    fn subscribe(&mut self, listener: SampleListener) -> BResult<Box<dyn Subscription>> {
        if let Some(reason) = &self.failure {
            return Err(BumpDetectorError::SensorFailed(reason.clone()));
        }

        let mut slot = self
            .slot
            .lock()
            .map_err(|_| BumpDetectorError::lock_poisoned("sensor feed"))?;
        if slot.active.is_some() {
            return Err(BumpDetectorError::SensorFailed(
                "Accelerometer already has a listener".to_string(),
            ));
        }

        slot.generation += 1;
        let generation = slot.generation;
        slot.active = Some(generation);
        slot.listener = Some(listener);

        Ok(Box::new(ManualSubscription {
            slot: Arc::clone(&self.slot),
            generation,
        }))
    }
}

struct ManualSubscription {
    slot: Arc<Mutex<FeedSlot>>,
    generation: u64,
}

impl Subscription for ManualSubscription {
    fn remove(self: Box<Self>) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.active == Some(self.generation) {
                slot.active = None;
                slot.listener = None;
            }
        }
    }
}

/// Producer side of a `ManualSensorSource`. Meant for a single producer thread.
#[derive(Clone)]
pub struct ManualFeed {
    slot: Arc<Mutex<FeedSlot>>,
}

impl ManualFeed {
    /// Deliver one sample. Returns false when nobody is subscribed.
    pub fn push(&self, sample: RawSample) -> bool {
        // The listener runs outside the lock so it may remove its own subscription
        let (generation, mut listener) = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(_) => return false,
            };
            match (slot.active, slot.listener.take()) {
                (Some(generation), Some(listener)) => (generation, listener),
                (_, listener) => {
                    slot.listener = listener;
                    return false;
                }
            }
        };

        listener(sample);

        if let Ok(mut slot) = self.slot.lock() {
            if slot.active == Some(generation) && slot.listener.is_none() {
                slot.listener = Some(listener);
            }
        }
        true
    }

    pub fn is_subscribed(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.active.is_some())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Channel source: samples arrive on a crossbeam channel, delivered on a worker
// ---------------------------------------------------------------------------

/// Delivers samples from a channel on a dedicated worker thread
pub struct ChannelSensorSource {
    receiver: Receiver<RawSample>,
    interval: Option<Duration>,
}

impl ChannelSensorSource {
    pub fn new(receiver: Receiver<RawSample>) -> Self {
        Self {
            receiver,
            interval: None,
        }
    }

    /// Bounded channel plus the source reading from it
    pub fn bounded(capacity: usize) -> (Sender<RawSample>, Self) {
        let (tx, rx) = channel::bounded(capacity);
        (tx, Self::new(rx))
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl SensorSource for ChannelSensorSource {
    fn set_update_interval(&mut self, interval: Duration) -> BResult<()> {
        self.interval = Some(interval);
        Ok(())
    }

    fn subscribe(&mut self, mut listener: SampleListener) -> BResult<Box<dyn Subscription>> {
        let receiver = self.receiver.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let worker_stopped = Arc::clone(&stopped);
        let (wake_tx, wake_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("bump-sensor".to_string())
            .spawn(move || {
                let mut delivered = 0u64;
                loop {
                    channel::select! {
                        recv(wake_rx) -> _ => break,
                        recv(receiver) -> msg => match msg {
                            Ok(sample) => {
                                if worker_stopped.load(Ordering::Acquire) {
                                    break;
                                }
                                listener(sample);
                                delivered += 1;
                            }
                            Err(_) => break,
                        },
                    }
                }
                debug!("[sensor] worker exiting after {} samples", delivered);
            })
            .map_err(|e| BumpDetectorError::SensorFailed(format!("spawn failed: {}", e)))?;

        Ok(Box::new(ChannelSubscription {
            stopped,
            wake: Some(wake_tx),
            handle: Some(handle),
        }))
    }
}

struct ChannelSubscription {
    stopped: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelSubscription {
    fn signal(&mut self) {
        self.stopped.store(true, Ordering::Release);
        // Dropping the sender also wakes the worker
        self.wake.take();
    }
}

impl Subscription for ChannelSubscription {
    fn remove(mut self: Box<Self>) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            // Removing from inside the listener: the worker exits on its own
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        self.signal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn counter_listener(count: Arc<AtomicU64>) -> SampleListener {
        Box::new(move |_sample| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_manual_feed_delivers_until_removed() {
        let mut source = ManualSensorSource::new();
        let feed = source.feed();
        let count = Arc::new(AtomicU64::new(0));

        assert!(!feed.push(RawSample::new(0.0, 0.0, 1.0, 0.0)));

        let sub = source.subscribe(counter_listener(Arc::clone(&count))).unwrap();
        assert!(feed.is_subscribed());
        assert!(feed.push(RawSample::new(0.0, 0.0, 1.0, 16.0)));
        assert!(feed.push(RawSample::new(0.0, 0.0, 1.0, 32.0)));

        sub.remove();
        assert!(!feed.push(RawSample::new(0.0, 0.0, 1.0, 48.0)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_single_listener_and_failures() {
        let mut source = ManualSensorSource::new();
        let count = Arc::new(AtomicU64::new(0));
        let _sub = source.subscribe(counter_listener(Arc::clone(&count))).unwrap();
        assert!(source.subscribe(counter_listener(Arc::clone(&count))).is_err());

        let mut broken = ManualSensorSource::new();
        broken.fail_subscriptions("sensor unavailable");
        let err = broken.subscribe(counter_listener(count)).err().unwrap();
        assert_eq!(
            err,
            BumpDetectorError::SensorFailed("sensor unavailable".to_string())
        );
    }

    #[test]
    fn test_manual_stale_subscription_cannot_remove_new_one() {
        let mut source = ManualSensorSource::new();
        let feed = source.feed();
        let count = Arc::new(AtomicU64::new(0));

        let first = source.subscribe(counter_listener(Arc::clone(&count))).unwrap();
        first.remove();
        let _second = source.subscribe(counter_listener(Arc::clone(&count))).unwrap();
        assert!(feed.push(RawSample::new(0.0, 0.0, 1.0, 0.0)));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_update_interval_recorded() {
        let mut source = ManualSensorSource::new();
        source.set_update_interval(Duration::from_millis(16)).unwrap();
        assert_eq!(source.update_interval(), Some(Duration::from_millis(16)));
    }

    #[test]
    fn test_channel_source_stops_delivery_on_remove() {
        let (tx, mut source) = ChannelSensorSource::bounded(64);
        let (seen_tx, seen_rx) = channel::unbounded::<RawSample>();
        let sub = source
            .subscribe(Box::new(move |sample| {
                let _ = seen_tx.send(sample);
            }))
            .unwrap();

        tx.send(RawSample::new(0.0, 0.0, 1.0, 0.0)).unwrap();
        let first = seen_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.timestamp, 0.0);

        sub.remove();
        tx.send(RawSample::new(0.0, 0.0, 1.0, 16.0)).unwrap();
        // The worker has been joined, so the sample above is never delivered
        assert!(seen_rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
