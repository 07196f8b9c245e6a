//! In-memory implementation of [`RescueStore`].
//!
//! Used in simulation mode and when the database is unreachable at startup
//! (degraded mode), so the rest of the pipeline keeps its persistence side
//! effects observable. Also the store of choice in tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use sar_core::{DroneStatusSnapshot, Hazard, HazardKind};

use crate::{DbError, DbResult, PersonRecord, RescueStore, ensure_read_only};

/// Retained history per record kind.
const MAX_RECORDS: usize = 1000;

/// Append-only in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    persons: RwLock<Vec<PersonRecord>>,
    statuses: RwLock<Vec<DroneStatusSnapshot>>,
    hazards: RwLock<Vec<Hazard>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn person_count(&self) -> usize {
        self.persons.read().len()
    }

    pub fn status_count(&self) -> usize {
        self.statuses.read().len()
    }
}

fn push_capped<T>(store: &RwLock<Vec<T>>, value: T) {
    let mut records = store.write();
    records.push(value);
    if records.len() > MAX_RECORDS {
        records.remove(0);
    }
}

#[async_trait]
impl RescueStore for MemoryStore {
    async fn insert_person(&self, record: &PersonRecord) -> DbResult<()> {
        push_capped(&self.persons, record.clone());
        Ok(())
    }

    async fn insert_drone_status(&self, status: &DroneStatusSnapshot) -> DbResult<()> {
        push_capped(&self.statuses, status.clone());
        Ok(())
    }

    async fn insert_hazard(&self, hazard: &Hazard) -> DbResult<()> {
        push_capped(&self.hazards, hazard.clone());
        Ok(())
    }

    async fn recent_persons(&self, limit: usize) -> DbResult<Vec<PersonRecord>> {
        let persons = self.persons.read();
        Ok(persons.iter().rev().take(limit).cloned().collect())
    }

    async fn latest_drone_status(&self) -> DbResult<Option<DroneStatusSnapshot>> {
        Ok(self.statuses.read().last().cloned())
    }

    async fn list_hazards(&self, kinds: Option<&[HazardKind]>) -> DbResult<Vec<Hazard>> {
        let hazards = self.hazards.read();
        Ok(hazards
            .iter()
            .filter(|h| kinds.is_none_or(|wanted| wanted.contains(&h.kind)))
            .cloned()
            .collect())
    }

    async fn execute_read_only(&self, query: &str) -> DbResult<Vec<serde_json::Value>> {
        ensure_read_only(query)?;
        Err(DbError::unsupported(
            "ad-hoc queries require the ScyllaDB store",
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::{HazardSeverity, LatLng, PixelBox};

    #[tokio::test]
    async fn test_recent_persons_newest_first() {
        let store = MemoryStore::new();
        for i in 0..15 {
            let record = PersonRecord::new(
                0.5 + i as f64 / 100.0,
                PixelBox::new(0, 0, 10, 10),
                format!("frame-{}", i),
            );
            store.insert_person(&record).await.unwrap();
        }

        let recent = store.recent_persons(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].image_ref, "frame-14");
    }

    #[tokio::test]
    async fn test_latest_drone_status() {
        let store = MemoryStore::new();
        assert!(store.latest_drone_status().await.unwrap().is_none());

        store
            .insert_drone_status(&DroneStatusSnapshot::new("Drone 1", true, 90))
            .await
            .unwrap();
        store
            .insert_drone_status(&DroneStatusSnapshot::new("Drone 1", true, 89))
            .await
            .unwrap();

        let latest = store.latest_drone_status().await.unwrap().unwrap();
        assert_eq!(latest.battery_level, 89);
    }

    #[tokio::test]
    async fn test_hazard_kind_filter() {
        let store = MemoryStore::new();
        let location = LatLng::new(37.0, -122.0);
        store
            .insert_hazard(&Hazard::new(
                HazardKind::Fire,
                location,
                HazardSeverity::High,
                "active fire",
                "agent",
            ))
            .await
            .unwrap();
        store
            .insert_hazard(&Hazard::new(
                HazardKind::Flood,
                location,
                HazardSeverity::Moderate,
                "street flooding",
                "operator",
            ))
            .await
            .unwrap();

        let fires = store
            .list_hazards(Some(&[HazardKind::Fire]))
            .await
            .unwrap();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].kind, HazardKind::Fire);

        let all = store.list_hazards(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_read_only_queries_rejected_or_unsupported() {
        let store = MemoryStore::new();

        let write = store.execute_read_only("DROP TABLE hazards").await;
        assert!(matches!(write, Err(DbError::Rejected(_))));

        let read = store.execute_read_only("SELECT * FROM hazards").await;
        assert!(matches!(read, Err(DbError::Unsupported(_))));
    }
}
