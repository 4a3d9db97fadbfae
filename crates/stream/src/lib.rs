//! DPE Stream
//!
//! HA-partner deduplication, the agreement ledger, the subscriber broadcast
//! hub and the ingest pipeline tying them together.

pub mod dedup;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod pipeline;
pub mod ring;

#[cfg(test)]
mod testing;

pub use dedup::{Decision, DedupEngine, DedupMetrics};
pub use error::{StreamError, StreamResult};
pub use hub::{
    run_writer, BroadcastHub, Frame, HubError, HubHandle, HubMetricsSnapshot, SubscriberId,
    Subscription,
};
pub use ledger::{AgreementLedger, UpsertOutcome};
pub use pipeline::{
    validate, AdmissionError, IngestHandle, Pipeline, PipelineError, PipelineMetricsSnapshot,
    PipelineSettings,
};
pub use ring::{RingBuffer, RingEntry};
