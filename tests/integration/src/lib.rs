//! End-to-end tests for the DPE node
//!
//! This test suite validates:
//! - gRPC publisher sessions feeding the pipeline
//! - HA duplicate suppression as seen by WebSocket subscribers
//! - The agreements and status HTTP endpoints
//! - Graceful shutdown of servers and subscribers

pub mod test_utils;

#[cfg(test)]
mod ingest_stream_tests;

#[cfg(test)]
mod query_tests;
