/// Cooldown gate: one physical impact produces several over-threshold
/// samples in a row, only the first of them is admitted.
#[derive(Clone, Debug)]
pub struct EventGate {
    cooldown_ms: f64,
    last_event_ms: Option<f64>,
}

impl EventGate {
    pub fn new(cooldown_ms: f64) -> Self {
        Self {
            cooldown_ms,
            last_event_ms: None,
        }
    }

    /// Admit the candidate if the cooldown has elapsed, recording its time
    pub fn admit(&mut self, candidate_ms: f64) -> bool {
        let open = match self.last_event_ms {
            None => true,
            Some(last) => candidate_ms - last >= self.cooldown_ms,
        };
        if open {
            self.last_event_ms = Some(candidate_ms);
        }
        open
    }

    pub fn last_event_ms(&self) -> Option<f64> {
        self.last_event_ms
    }

    pub fn reset(&mut self) {
        self.last_event_ms = None;
    }
}
