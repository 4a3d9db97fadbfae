//! Agreement ledger keyed by location.
//!
//! Every admitted record upserts the contract for its agreement at its
//! location. Entries are never removed.

use dpe_core::time::unix_seconds;
use dpe_core::{Contract, DataRecord, LedgerEntry, LocationKey};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// What an upsert did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First sighting of the location
    Created,
    /// New agreement at a known location
    Appended,
    /// Known agreement, timestamp refreshed
    Refreshed,
}

/// Concurrent map from location key to the contracts observed there.
#[derive(Debug, Default)]
pub struct AgreementLedger {
    entries: RwLock<HashMap<LocationKey, LedgerEntry>>,
}

impl AgreementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `record`'s agreement at its location, stamped with the current
    /// server time.
    pub fn upsert(&self, record: &DataRecord) -> UpsertOutcome {
        self.upsert_at(record, unix_seconds())
    }

    /// [`upsert`](Self::upsert) with an explicit server timestamp.
    pub fn upsert_at(&self, record: &DataRecord, server_timestamp: i64) -> UpsertOutcome {
        let key = record.location.key();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let outcome = match entries.get_mut(&key) {
            Some(entry) => {
                match entry
                    .contracts
                    .iter_mut()
                    .find(|c| c.id == record.agreement_id)
                {
                    Some(existing) => {
                        existing.server_timestamp = server_timestamp;
                        UpsertOutcome::Refreshed
                    }
                    None => {
                        entry
                            .contracts
                            .push(Contract::from_record(record, server_timestamp));
                        UpsertOutcome::Appended
                    }
                }
            }
            None => {
                entries.insert(
                    key.clone(),
                    LedgerEntry {
                        lat: record.location.lat,
                        lon: record.location.lon,
                        contracts: vec![Contract::from_record(record, server_timestamp)],
                    },
                );
                UpsertOutcome::Created
            }
        };
        drop(entries);

        debug!(
            location = %key,
            agreement_id = %record.agreement_id,
            outcome = ?outcome,
            "Ledger upserted"
        );
        outcome
    }

    /// Point-in-time copy of every entry, in no particular order.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &LocationKey) -> Option<LedgerEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of distinct locations
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
