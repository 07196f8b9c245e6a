//! Schema bootstrap.
//!
//! Creates the keyspace and the three tables on startup when they do not
//! exist. There is deliberately no versioned migration machinery here.

use crate::DbResult;
use crate::error::DbError;
use scylla::Session;
use std::sync::Arc;
use tracing::info;

/// Single-partition shard value used by the append-only tables.
pub const SHARD: i8 = 0;

/// Create keyspace and tables if missing.
pub async fn run_all(session: &Arc<Session>, keyspace: &str) -> DbResult<()> {
    info!("Bootstrapping schema in keyspace {:?}...", keyspace);

    let statements = [
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
             {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.persons (
                shard tinyint,
                detected_at bigint,
                id uuid,
                confidence double,
                x1 int, y1 int, x2 int, y2 int,
                image_ref text,
                PRIMARY KEY (shard, detected_at, id)
            ) WITH CLUSTERING ORDER BY (detected_at DESC, id ASC)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.drone_status (
                shard tinyint,
                recorded_at bigint,
                name text,
                connected boolean,
                battery int,
                lat double,
                lng double,
                PRIMARY KEY (shard, recorded_at)
            ) WITH CLUSTERING ORDER BY (recorded_at DESC)",
            keyspace
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {}.hazards (
                id uuid PRIMARY KEY,
                kind text,
                lat double,
                lng double,
                severity text,
                details text,
                created_by text,
                created_at bigint
            )",
            keyspace
        ),
    ];

    for statement in &statements {
        session
            .query_unpaged(statement.as_str(), ())
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
    }

    info!("Schema bootstrap complete");
    Ok(())
}
