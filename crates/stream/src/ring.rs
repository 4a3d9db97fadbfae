//! Fixed-capacity history of recently processed records.
//!
//! Slots are written sequentially and overwrite the oldest entry once the
//! buffer has wrapped, so the occupied slots never contain gaps.

use dpe_core::DataRecord;
use std::sync::Arc;
use std::time::Instant;

/// A processed record and the instant it was published, if it was.
#[derive(Debug, Clone)]
pub struct RingEntry {
    /// The record as it entered the dedup engine
    pub record: Arc<DataRecord>,
    /// `None` when the record was suppressed
    pub published_at: Option<Instant>,
}

impl RingEntry {
    /// Entry for a record published at `at`
    pub fn published(record: Arc<DataRecord>, at: Instant) -> Self {
        Self {
            record,
            published_at: Some(at),
        }
    }

    /// Entry for a suppressed record
    pub fn suppressed(record: Arc<DataRecord>) -> Self {
        Self {
            record,
            published_at: None,
        }
    }
}

/// Circular buffer of [`RingEntry`] values.
#[derive(Debug)]
pub struct RingBuffer {
    slots: Vec<Option<RingEntry>>,
    /// Index of the most recently written slot
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` entries (minimum one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: capacity - 1,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `entry` into the next slot, evicting the oldest entry when full.
    pub fn push(&mut self, entry: RingEntry) {
        self.head = (self.head + 1) % self.capacity();
        self.slots[self.head] = Some(entry);
        self.len = (self.len + 1).min(self.capacity());
    }

    /// Entries from newest to oldest, at most one revolution.
    pub fn iter_recent(&self) -> impl Iterator<Item = &RingEntry> + '_ {
        let capacity = self.capacity();
        (0..capacity)
            .map(move |step| (self.head + capacity - step) % capacity)
            .map_while(move |ix| self.slots[ix].as_ref())
    }

    /// Most recent entry written by an HA partner of `record`'s device for the
    /// same reading.
    ///
    /// A partner entry shares `record_id`, comes from a different device, and
    /// that device is listed in `record.ha_partners`.
    pub fn find_partner(&self, record: &DataRecord) -> Option<&RingEntry> {
        self.iter_recent().find(|entry| {
            entry.record.record_id == record.record_id
                && entry.record.device_id != record.device_id
                && record.has_partner(&entry.record.device_id)
        })
    }
}
