use crate::detection::pattern::PatternMatcher;
use crate::sensor_receiver::FilteredSample;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Outcome of scanning the history for a pothole signature
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternScan {
    pub matched: bool,
    pub score: f64,
}

/// Fixed-capacity FIFO of recent filtered samples, oldest first
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<FilteredSample>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        HistoryBuffer {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry once over capacity
    pub fn push(&mut self, entry: FilteredSample) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Read-only search for a drop-then-bounce signature
    pub fn scan(&self, matcher: &PatternMatcher) -> PatternScan {
        let score = matcher.find_pothole_signature(self);
        PatternScan {
            matched: score > 0.0,
            score,
        }
    }

    pub fn get(&self, index: usize) -> Option<&FilteredSample> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FilteredSample> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&FilteredSample> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
