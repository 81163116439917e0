//! Bounded in-memory record store
//!
//! Holds the most recent records for same-process consumers. Capacity is the
//! only backpressure: appending to a full store evicts the oldest record, it
//! never blocks the producer.

use omapi_scope_common::MAX_RECORDS;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::record::CallRecord;
use crate::telemetry::RecordSink;

/// Thread-safe FIFO ring of [`CallRecord`]s.
///
/// Every operation takes the same lock, so snapshots are always consistent
/// and `clear` is atomic with respect to concurrent appends.
#[derive(Debug)]
pub struct RecordStore {
    records: Mutex<VecDeque<CallRecord>>,
    capacity: usize,
}

impl RecordStore {
    /// Store holding up to [`MAX_RECORDS`] records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_RECORDS)
    }

    /// Store holding up to `capacity` records (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CallRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record, evicting the oldest ones beyond capacity.
    pub fn append(&self, record: CallRecord) {
        let mut records = self.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Point-in-time copy of all records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for RecordStore {
    fn accept(&self, record: &CallRecord) {
        self.append(record.clone());
    }
}
