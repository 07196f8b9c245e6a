//! ScyllaDB-backed implementation of [`RescueStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sar_core::{DroneStatusSnapshot, Hazard, HazardKind, HazardSeverity, LatLng, PixelBox};
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{Session, SessionBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::migrations::{self, SHARD};
use crate::{DbError, DbResult, PersonRecord, RescueStore, ensure_read_only};

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    #[serde(skip)]
    pub connection_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "sar_drone".to_string(),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let hosts = std::env::var("SCYLLA_HOSTS")
            .unwrap_or_else(|_| "127.0.0.1:9042".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let keyspace =
            std::env::var("SCYLLA_KEYSPACE").unwrap_or_else(|_| "sar_drone".to_string());

        Self {
            hosts,
            keyspace,
            ..Default::default()
        }
    }
}

/// Persistence adapter over a ScyllaDB cluster.
pub struct ScyllaStore {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaStore {
    /// Connect, bootstrap the schema, and switch to the configured keyspace.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!("Connecting to ScyllaDB cluster: {:?}", config.hosts);

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .connection_timeout(config.connection_timeout)
            .build()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let session = Arc::new(session);
        info!("Connected to ScyllaDB");

        migrations::run_all(&session, &config.keyspace).await?;
        session
            .use_keyspace(&config.keyspace, false)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self {
            session,
            keyspace: config.keyspace,
        })
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub async fn health_check(&self) -> bool {
        match self
            .session
            .query_unpaged("SELECT now() FROM system.local", ())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl RescueStore for ScyllaStore {
    async fn insert_person(&self, record: &PersonRecord) -> DbResult<()> {
        let query = r#"
            INSERT INTO persons (
                shard, detected_at, id, confidence, x1, y1, x2, y2, image_ref
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        self.session
            .query_unpaged(
                query,
                (
                    SHARD,
                    record.detected_at.timestamp_millis(),
                    record.id,
                    record.confidence,
                    record.bbox.x1,
                    record.bbox.y1,
                    record.bbox.x2,
                    record.bbox.y2,
                    record.image_ref.as_str(),
                ),
            )
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn insert_drone_status(&self, status: &DroneStatusSnapshot) -> DbResult<()> {
        let query = r#"
            INSERT INTO drone_status (
                shard, recorded_at, name, connected, battery, lat, lng
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

        self.session
            .query_unpaged(
                query,
                (
                    SHARD,
                    status.timestamp.timestamp_millis(),
                    status.name.as_str(),
                    status.is_connected,
                    status.battery_level as i32,
                    status.location.map(|l| l.lat),
                    status.location.map(|l| l.lng),
                ),
            )
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn insert_hazard(&self, hazard: &Hazard) -> DbResult<()> {
        let query = r#"
            INSERT INTO hazards (
                id, kind, lat, lng, severity, details, created_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        self.session
            .query_unpaged(
                query,
                (
                    hazard.id,
                    hazard.kind.as_str(),
                    hazard.location.lat,
                    hazard.location.lng,
                    hazard.severity.as_str(),
                    hazard.details.as_str(),
                    hazard.created_by.as_str(),
                    hazard.created_at.timestamp_millis(),
                ),
            )
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(())
    }

    async fn recent_persons(&self, limit: usize) -> DbResult<Vec<PersonRecord>> {
        let query = r#"
            SELECT detected_at, id, confidence, x1, y1, x2, y2, image_ref
            FROM persons WHERE shard = ? LIMIT ?
        "#;

        let result = self
            .session
            .query_unpaged(query, (SHARD, limit as i32))
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows_result
            .rows::<(i64, Uuid, f64, i32, i32, i32, i32, String)>()
            .map_err(|e| DbError::Serialization(e.to_string()))?
        {
            let (detected_at, id, confidence, x1, y1, x2, y2, image_ref) =
                row.map_err(|e| DbError::Serialization(e.to_string()))?;

            records.push(PersonRecord {
                id,
                confidence,
                bbox: PixelBox::new(x1, y1, x2, y2),
                image_ref,
                detected_at: millis_to_datetime(detected_at),
            });
        }

        Ok(records)
    }

    async fn latest_drone_status(&self) -> DbResult<Option<DroneStatusSnapshot>> {
        let query = r#"
            SELECT recorded_at, name, connected, battery, lat, lng
            FROM drone_status WHERE shard = ? LIMIT 1
        "#;

        let result = self
            .session
            .query_unpaged(query, (SHARD,))
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let mut rows = rows_result
            .rows::<(i64, String, bool, i32, Option<f64>, Option<f64>)>()
            .map_err(|e| DbError::Serialization(e.to_string()))?;

        match rows.next() {
            Some(row) => {
                let (recorded_at, name, connected, battery, lat, lng) =
                    row.map_err(|e| DbError::Serialization(e.to_string()))?;

                let location = match (lat, lng) {
                    (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
                    _ => None,
                };

                Ok(Some(DroneStatusSnapshot {
                    name,
                    is_connected: connected,
                    battery_level: battery.clamp(0, 100) as u8,
                    location,
                    timestamp: millis_to_datetime(recorded_at),
                }))
            }
            None => Ok(None),
        }
    }

    async fn list_hazards(&self, kinds: Option<&[HazardKind]>) -> DbResult<Vec<Hazard>> {
        let query = r#"
            SELECT id, kind, lat, lng, severity, details, created_by, created_at
            FROM hazards
        "#;

        let result = self
            .session
            .query_unpaged(query, ())
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let mut hazards = Vec::new();
        for row in rows_result
            .rows::<(Uuid, String, f64, f64, String, String, String, i64)>()
            .map_err(|e| DbError::Serialization(e.to_string()))?
        {
            let (id, kind, lat, lng, severity, details, created_by, created_at) =
                row.map_err(|e| DbError::Serialization(e.to_string()))?;

            let Ok(kind) = kind.parse::<HazardKind>() else {
                warn!("Skipping hazard {} with unknown kind {:?}", id, kind);
                continue;
            };
            let severity = severity.parse().unwrap_or(HazardSeverity::Low);

            if let Some(wanted) = kinds {
                if !wanted.contains(&kind) {
                    continue;
                }
            }

            hazards.push(Hazard {
                id,
                kind,
                location: LatLng::new(lat, lng),
                severity,
                details,
                created_by,
                created_at: millis_to_datetime(created_at),
            });
        }

        Ok(hazards)
    }

    async fn execute_read_only(&self, query: &str) -> DbResult<Vec<serde_json::Value>> {
        ensure_read_only(query)?;

        let result = self
            .session
            .query_unpaged(query, ())
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows_result = result
            .into_rows_result()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let names: Vec<String> = rows_result
            .column_specs()
            .iter()
            .map(|spec| spec.name().to_string())
            .collect();

        let mut out = Vec::new();
        for row in rows_result
            .rows::<Row>()
            .map_err(|e| DbError::Serialization(e.to_string()))?
        {
            let row = row.map_err(|e| DbError::Serialization(e.to_string()))?;
            let mut object = serde_json::Map::new();
            for (name, value) in names.iter().zip(row.columns.iter()) {
                object.insert(name.clone(), cql_to_json(value));
            }
            out.push(serde_json::Value::Object(object));
        }

        Ok(out)
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// Best-effort conversion of a CQL value into JSON for the agent bridge.
fn cql_to_json(value: &Option<CqlValue>) -> serde_json::Value {
    use serde_json::Value;

    let Some(value) = value else {
        return Value::Null;
    };

    match value {
        CqlValue::Ascii(s) | CqlValue::Text(s) => Value::String(s.clone()),
        CqlValue::Boolean(b) => Value::Bool(*b),
        CqlValue::TinyInt(n) => Value::from(*n),
        CqlValue::SmallInt(n) => Value::from(*n),
        CqlValue::Int(n) => Value::from(*n),
        CqlValue::BigInt(n) => Value::from(*n),
        CqlValue::Float(n) => {
            serde_json::Number::from_f64(*n as f64).map_or(Value::Null, Value::Number)
        }
        CqlValue::Double(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        CqlValue::Uuid(u) => Value::String(u.to_string()),
        CqlValue::Timeuuid(u) => Value::String(u.to_string()),
        CqlValue::Timestamp(ts) => Value::from(ts.0),
        CqlValue::List(items) | CqlValue::Set(items) => Value::Array(
            items
                .iter()
                .map(|item| cql_to_json(&Some(item.clone())))
                .collect(),
        ),
        other => Value::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.hosts.len(), 1);
        assert_eq!(config.keyspace, "sar_drone");
    }

    #[test]
    fn test_cql_to_json_scalars() {
        assert_eq!(cql_to_json(&None), serde_json::Value::Null);
        assert_eq!(
            cql_to_json(&Some(CqlValue::Text("fire".into()))),
            serde_json::json!("fire")
        );
        assert_eq!(cql_to_json(&Some(CqlValue::Int(42))), serde_json::json!(42));
        assert_eq!(
            cql_to_json(&Some(CqlValue::Boolean(true))),
            serde_json::json!(true)
        );
    }

    #[test]
    fn test_cql_to_json_collections() {
        let list = CqlValue::List(vec![CqlValue::Int(1), CqlValue::Int(2)]);
        assert_eq!(cql_to_json(&Some(list)), serde_json::json!([1, 2]));
    }
}
