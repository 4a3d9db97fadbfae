//! HA-Partner Deduplication Engine
//!
//! Devices in a high-availability pair publish the same reading under the same
//! `record_id`. The engine keeps a short ring of recently processed records and
//! suppresses a reading when a declared partner already published it within the
//! dedup window.
//!
//! The partner scan and the append of the new entry happen under one lock, so
//! two racing partners always observe each other in a consistent order. Only a
//! two-device pair is modelled: the most recent partner entry wins and multiple
//! candidates are not ranked.

use crate::ring::{RingBuffer, RingEntry};
use dpe_core::DataRecord;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of processing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward the record to subscribers
    Publish,
    /// A partner already published this reading inside the window
    Suppress {
        /// Partner whose publication caused the suppression
        partner_device_id: String,
        /// Time since the partner's publication
        elapsed: Duration,
    },
}

impl Decision {
    pub fn is_publish(&self) -> bool {
        matches!(self, Decision::Publish)
    }
}

/// Counters kept alongside the ring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupMetrics {
    /// Total records processed
    pub processed: u64,
    /// Records forwarded
    pub published: u64,
    /// Records dropped as partner duplicates
    pub suppressed: u64,
}

impl DedupMetrics {
    fn record(&mut self, decision: &Decision) {
        self.processed += 1;
        match decision {
            Decision::Publish => self.published += 1,
            Decision::Suppress { .. } => self.suppressed += 1,
        }
    }
}

#[derive(Debug)]
struct DedupState {
    ring: RingBuffer,
    metrics: DedupMetrics,
}

/// Time-windowed deduplicator for HA device pairs.
#[derive(Debug)]
pub struct DedupEngine {
    state: Mutex<DedupState>,
    window: Duration,
}

impl DedupEngine {
    /// Create an engine remembering `capacity` records and suppressing partner
    /// duplicates younger than `window`.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            state: Mutex::new(DedupState {
                ring: RingBuffer::with_capacity(capacity),
                metrics: DedupMetrics::default(),
            }),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether `record` should be published, and remember it.
    pub fn process(&self, record: Arc<DataRecord>) -> Decision {
        self.process_at(record, Instant::now())
    }

    /// [`process`](Self::process) against an explicit clock reading.
    pub fn process_at(&self, record: Arc<DataRecord>, now: Instant) -> Decision {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let decision = match state.ring.find_partner(&record) {
            None => Decision::Publish,
            Some(partner) => match partner.published_at {
                None => Decision::Publish,
                Some(published_at) => {
                    let elapsed = now.saturating_duration_since(published_at);
                    if elapsed > self.window {
                        Decision::Publish
                    } else {
                        Decision::Suppress {
                            partner_device_id: partner.record.device_id.clone(),
                            elapsed,
                        }
                    }
                }
            },
        };

        match &decision {
            Decision::Publish => {
                debug!(
                    record_id = %record.record_id,
                    device_id = %record.device_id,
                    "No recent partner publication, publishing"
                );
                state.ring.push(RingEntry::published(record, now));
            }
            Decision::Suppress {
                partner_device_id,
                elapsed,
            } => {
                debug!(
                    record_id = %record.record_id,
                    device_id = %record.device_id,
                    partner = %partner_device_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Dropping duplicate already published by partner"
                );
                state.ring.push(RingEntry::suppressed(record));
            }
        }
        state.metrics.record(&decision);

        decision
    }

    pub fn metrics(&self) -> DedupMetrics {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics
            .clone()
    }

    /// Number of records currently remembered.
    pub fn history_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ring
            .len()
    }
}
