use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use crate::ActivityEntry;

/// Bounded, thread-safe log of the most recent pipeline activity.
///
/// Cloning is cheap; all clones share the same buffer. Oldest entries are
/// evicted first once `capacity` is reached.
#[derive(Clone)]
pub struct ActivityLog {
    entries: Arc<RwLock<VecDeque<ActivityEntry>>>,
    capacity: usize,
}

impl ActivityLog {
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn push(&self, entry: ActivityEntry) {
        // Every critical section leaves the deque consistent, so poisoning is ignored.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The latest `limit` entries, oldest first and most recent last.
    pub fn latest(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
