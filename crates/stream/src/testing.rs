//! Record fixtures shared by unit tests.

use bytes::Bytes;
use dpe_core::{DataRecord, Location};

pub(crate) fn record(record_id: &str, device_id: &str, partners: &[&str]) -> DataRecord {
    DataRecord {
        record_id: record_id.to_string(),
        device_id: device_id.to_string(),
        agreement_id: "agreement-1".to_string(),
        location: Location::new(45.52, -122.68),
        ha_partners: partners.iter().map(|p| p.to_string()).collect(),
        device_timestamp: 0.0,
        payload: Bytes::from_static(b"{}"),
    }
}

pub(crate) fn located(lat: f32, lon: f32, agreement_id: &str) -> DataRecord {
    DataRecord {
        agreement_id: agreement_id.to_string(),
        location: Location::new(lat, lon),
        ..record("r", "device", &[])
    }
}
