//! Core types
//!
//! Data records as pushed by edge publishers, and the contract ledger shapes
//! served back out over the query API.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Contract type assigned to every agreement observed on the stream.
pub const HORIZON_CONTRACT_TYPE: u32 = 19;

/// Geographic position of a publishing device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub lat: f32,
    /// Longitude in degrees
    pub lon: f32,
}

impl Location {
    /// Create a new location
    pub fn new(lat: f32, lon: f32) -> Self {
        Self { lat, lon }
    }

    /// True when either coordinate carries the protobuf zero value.
    pub fn is_unset(&self) -> bool {
        self.lat == 0.0 || self.lon == 0.0
    }

    /// True when both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Deterministic ledger key for this location.
    pub fn key(&self) -> LocationKey {
        LocationKey(format!("{},{}", self.lat, self.lon))
    }
}

/// String rendering of a `(lat, lon)` pair.
///
/// Keys compare by exact string equality. Two coordinates that differ only in
/// the last representable digit produce different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    /// Borrow the rendered key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single telemetry reading pushed by an edge publisher.
///
/// `(record_id, device_id)` identifies one publish event. Devices in an HA
/// pair emit the same `record_id` when standing in for each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRecord {
    /// Reading identifier, shared across HA partners
    pub record_id: String,
    /// Publishing device
    pub device_id: String,
    /// Agreement the reading was produced under
    pub agreement_id: String,
    /// Device position
    #[serde(flatten)]
    pub location: Location,
    /// Devices that may publish this reading on this device's behalf
    pub ha_partners: BTreeSet<String>,
    /// Device-reported timestamp, never used for ordering
    #[serde(rename = "deviceTs")]
    pub device_timestamp: f64,
    /// Opaque measurement payload
    #[serde(with = "payload_base64")]
    pub payload: Bytes,
}

impl DataRecord {
    /// Whether `device_id` is declared as an HA partner of this record's device.
    pub fn has_partner(&self, device_id: &str) -> bool {
        self.ha_partners.contains(device_id)
    }
}

/// An agreement observed at a location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    /// Contract type, always [`HORIZON_CONTRACT_TYPE`]
    #[serde(rename = "type")]
    pub contract_type: u32,
    /// Agreement identifier
    pub id: String,
    /// Server-assigned unix timestamp (seconds) of the latest sighting
    #[serde(rename = "ts")]
    pub server_timestamp: i64,
    /// Device timestamp from the first sighting
    #[serde(skip)]
    pub device_timestamp: f64,
    /// Device that first reported the agreement here
    #[serde(skip)]
    pub device_id: String,
}

impl Contract {
    /// Build a contract from a record, stamping it with the server's clock.
    pub fn from_record(record: &DataRecord, server_timestamp: i64) -> Self {
        Self {
            contract_type: HORIZON_CONTRACT_TYPE,
            id: record.agreement_id.clone(),
            server_timestamp,
            device_timestamp: record.device_timestamp,
            device_id: record.device_id.clone(),
        }
    }
}

/// All contracts seen at one location, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    /// Latitude
    pub lat: f32,
    /// Longitude
    pub lon: f32,
    /// Contracts in first-seen order
    pub contracts: Vec<Contract>,
}

mod payload_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
