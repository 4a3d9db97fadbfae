//! Core functionality for the synchrophasor data processing engine (DPE).
//!
//! This crate provides the record and ledger types shared by the pipeline and
//! its API surfaces, together with configuration loading and logging setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;
pub mod types;

pub use config::Config;
pub use error::{CoreError, Result};
pub use types::{
    Contract, DataRecord, LedgerEntry, Location, LocationKey, HORIZON_CONTRACT_TYPE,
};
