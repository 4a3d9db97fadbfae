//! Server clock helpers.

/// Current unix time in whole seconds, as stamped on ledger contracts.
pub fn unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
