//! # SAR DB - ScyllaDB Integration
//!
//! Persistence adapter for the search-and-rescue drone server. Three record
//! kinds are stored: person detections, drone-status snapshots, and hazard
//! reports.
//!
//! Writes from the session loop are fire-and-forget: every insert is a single
//! CQL statement (no multi-statement transactions spanning a yield point), so
//! concurrent sessions can append without interleaving corruption.

pub mod error;
pub mod memory;
pub mod migrations;
pub mod scylla_store;

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use scylla_store::{DbConfig, ScyllaStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sar_core::{DroneStatusSnapshot, Hazard, HazardKind, PixelBox};
use uuid::Uuid;

/// One persisted person detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRecord {
    pub id: Uuid,
    pub confidence: f64,
    pub bbox: PixelBox,
    /// Reference to the encoded frame the detection came from.
    pub image_ref: String,
    pub detected_at: DateTime<Utc>,
}

impl PersonRecord {
    pub fn new(confidence: f64, bbox: PixelBox, image_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            confidence,
            bbox,
            image_ref: image_ref.into(),
            detected_at: Utc::now(),
        }
    }
}

/// Persistence adapter contract.
///
/// All writes are best-effort from the session loop's perspective: failures
/// are logged by the caller and never surfaced to the socket client.
#[async_trait]
pub trait RescueStore: Send + Sync {
    async fn insert_person(&self, record: &PersonRecord) -> DbResult<()>;

    async fn insert_drone_status(&self, status: &DroneStatusSnapshot) -> DbResult<()>;

    async fn insert_hazard(&self, hazard: &Hazard) -> DbResult<()>;

    /// Most recent person detections, newest first.
    async fn recent_persons(&self, limit: usize) -> DbResult<Vec<PersonRecord>>;

    /// Most recent drone-status snapshot, if any.
    async fn latest_drone_status(&self) -> DbResult<Option<DroneStatusSnapshot>>;

    /// Hazards, optionally filtered to the given kinds.
    async fn list_hazards(&self, kinds: Option<&[HazardKind]>) -> DbResult<Vec<Hazard>>;

    /// Run an arbitrary read-only query on behalf of the agent bridge.
    /// Anything other than a SELECT is rejected.
    async fn execute_read_only(&self, query: &str) -> DbResult<Vec<serde_json::Value>>;
}

/// Reject anything that is not a plain SELECT statement.
pub(crate) fn ensure_read_only(query: &str) -> DbResult<()> {
    let head = query.trim_start();
    if head.len() >= 6 && head[..6].eq_ignore_ascii_case("select") {
        Ok(())
    } else {
        Err(DbError::rejected("only SELECT statements are allowed"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_guard() {
        assert!(ensure_read_only("SELECT * FROM hazards").is_ok());
        assert!(ensure_read_only("  select name from drone_status").is_ok());
        assert!(ensure_read_only("DROP TABLE hazards").is_err());
        assert!(ensure_read_only("INSERT INTO persons (id) VALUES (now())").is_err());
        assert!(ensure_read_only("").is_err());
    }

    #[test]
    fn test_person_record_serialization() {
        let record = PersonRecord::new(0.91, PixelBox::new(10, 20, 110, 220), "frame-42");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["confidence"], 0.91);
        assert_eq!(json["imageRef"], "frame-42");
        assert!(json["detectedAt"].is_string());
    }
}
