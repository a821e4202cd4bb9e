use crate::sensor_receiver::LocationFix;
use std::sync::{Arc, RwLock};

/// Pull-based access to the most recent cached fix.
///
/// Must not block: the engine calls this from the sample path.
pub trait LocationProvider: Send + Sync {
    fn latest_fix(&self) -> Option<LocationFix>;
}

impl<F> LocationProvider for F
where
    F: Fn() -> Option<LocationFix> + Send + Sync,
{
    fn latest_fix(&self) -> Option<LocationFix> {
        self()
    }
}

/// Fix cache written by the location tracker and read by sessions.
/// Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct SharedLocation {
    slot: Arc<RwLock<Option<LocationFix>>>,
}

impl SharedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, fix: LocationFix) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = Some(fix);
        }
    }

    /// Forget the fix (tracker lost signal)
    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.write() {
            *slot = None;
        }
    }
}

impl LocationProvider for SharedLocation {
    fn latest_fix(&self) -> Option<LocationFix> {
        self.slot.read().ok().and_then(|slot| *slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_location_updates_visible_to_clones() {
        let tracker = SharedLocation::new();
        let reader = tracker.clone();
        assert_eq!(reader.latest_fix(), None);

        tracker.update(LocationFix::new(51.5, -0.12, 8.0));
        assert_eq!(reader.latest_fix(), Some(LocationFix::new(51.5, -0.12, 8.0)));

        tracker.clear();
        assert_eq!(reader.latest_fix(), None);
    }

    #[test]
    fn test_closure_provider() {
        let provider = || Some(LocationFix::new(1.0, 2.0, 3.0));
        assert_eq!(provider.latest_fix().map(|f| f.speed_mps), Some(3.0));
    }
}
