// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_RECENT_CAPACITY: usize = 200;

/// Fixed-capacity FIFO of the most recently delivered serialized events.
///
/// `record` and `snapshot` each take the lock once, so readers always see a whole number of
/// records and never a live view.
#[derive(Debug)]
pub struct RecentEventBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
}

impl Default for RecentEventBuffer {
    fn default() -> Self {
        RecentEventBuffer::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl RecentEventBuffer {
    pub fn new(capacity: usize) -> Self {
        RecentEventBuffer {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends an entry, evicting the oldest one first when the buffer is full.
    pub fn record(&self, serialized: String) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(serialized);
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    // a panic while holding the lock cannot leave the deque half-written
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_default_capacity() {
        let buffer = RecentEventBuffer::default();
        assert_eq!(buffer.capacity, 200);
        assert!(buffer.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_keeps_insertion_order() {
        let buffer = RecentEventBuffer::new(3);
        buffer.record("a".to_string());
        buffer.record("b".to_string());
        assert_eq!(buffer.snapshot(), vec!["a", "b"]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let buffer = RecentEventBuffer::new(200);
        for i in 1..=250 {
            buffer.record(i.to_string());
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 200);
        let expected: Vec<String> = (51..=250).map(|i| i.to_string()).collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let buffer = RecentEventBuffer::new(2);
        buffer.record("a".to_string());
        let before = buffer.snapshot();
        buffer.record("b".to_string());
        buffer.record("c".to_string());
        assert_eq!(before, vec!["a"]);
        assert_eq!(buffer.snapshot(), vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let buffer = RecentEventBuffer::new(0);
        buffer.record("a".to_string());
        assert!(buffer.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let buffer = Arc::new(RecentEventBuffer::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        buffer.record(format!("{t}-{i}"));
                        let _ = buffer.snapshot();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 800);
        // each producer's own records stay in order
        for t in 0..8 {
            let prefix = format!("{t}-");
            let mine: Vec<usize> = snapshot
                .iter()
                .filter_map(|entry| entry.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(mine, (0..100).collect::<Vec<_>>());
        }
    }

    proptest! {
        #[test]
        fn prop_snapshot_is_the_tail_of_the_records(
            capacity in 1usize..64,
            records in prop::collection::vec("[a-z0-9]{0,6}", 0..200),
        ) {
            let buffer = RecentEventBuffer::new(capacity);
            for record in &records {
                buffer.record(record.clone());
            }
            let snapshot = buffer.snapshot();
            prop_assert!(snapshot.len() <= capacity);
            let tail = &records[records.len().saturating_sub(capacity)..];
            prop_assert_eq!(snapshot.as_slice(), tail);
        }
    }
}
