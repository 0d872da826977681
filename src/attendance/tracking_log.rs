use std::collections::VecDeque;

use crate::model::tracking::TrackingEntry;

pub const TRACKING_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of tracking entries, oldest first.
#[derive(Debug, Clone)]
pub struct TrackingLog {
    entries: VecDeque<TrackingEntry>,
    capacity: usize,
}

impl TrackingLog {
    pub fn new() -> Self {
        Self::with_capacity(TRACKING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `entry`, evicting the oldest one when the log is full.
    pub fn append(&mut self, entry: TrackingEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<TrackingEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TrackingLog {
    fn default() -> Self {
        Self::new()
    }
}
