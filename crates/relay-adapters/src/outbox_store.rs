//! Postgres-backed outbox store.
//!
//! Rows are written by business-transaction code outside this crate, inside
//! the same transaction as the change they describe; this adapter only
//! reads pending rows and flips their status. Every query here uses plain
//! `sqlx::query`/`query_as` with bound parameters rather than the
//! compile-time-checked `query!` macros, since there is no live database
//! available at build time to check them against.

use std::collections::BTreeMap;
use std::sync::Arc;

use relay_domain::{OutboxEvent, OutboxStatus};
use relay_ports::{Clock, OutboxStoreError, SystemClock};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Postgres-backed implementation of [`relay_ports::OutboxStore`].
pub struct PgOutboxStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        PgOutboxStore {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Construct with an explicit [`Clock`], so `published_at` timestamps
    /// can be made deterministic in tests that exercise this store against
    /// a real database.
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        PgOutboxStore { pool, clock }
    }

    /// Idempotently create the `relay.outbox_event` table. Called once at
    /// node startup; the bootstrapper's never-auto-modify invariant applies
    /// to substrate streams, not to this table, so `IF NOT EXISTS` is fine
    /// here even though it would not be for a JetStream stream.
    pub async fn ensure_schema(&self) -> Result<(), OutboxStoreError> {
        for statement in [
            "CREATE SCHEMA IF NOT EXISTS relay",
            r#"CREATE TABLE IF NOT EXISTS relay.outbox_event (
                id UUID PRIMARY KEY,
                subject TEXT NOT NULL,
                payload JSONB NOT NULL,
                headers JSONB,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL,
                published_at TIMESTAMPTZ
            )"#,
            r#"CREATE INDEX IF NOT EXISTS outbox_event_pending_idx
                ON relay.outbox_event (created_at)
                WHERE status = 'pending'"#,
            "CREATE INDEX IF NOT EXISTS outbox_event_subject_idx ON relay.outbox_event (subject)",
        ] {
            sqlx::query(statement).execute(&self.pool).await.map_err(|e| {
                OutboxStoreError::DatabaseError {
                    message: format!("failed to ensure outbox schema: {e}"),
                }
            })?;
        }
        Ok(())
    }

    /// Insert a new pending event. Called by business-transaction code with
    /// its own `Transaction`, not by the dispatcher.
    pub async fn insert_pending(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        event: &OutboxEvent,
    ) -> Result<(), OutboxStoreError> {
        let payload_json: JsonValue =
            serde_json::from_slice(&event.payload).map_err(|e| OutboxStoreError::DatabaseError {
                message: format!("outbox payload is not valid JSON: {e}"),
            })?;
        let headers_json: Option<JsonValue> = event
            .headers
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| OutboxStoreError::DatabaseError {
                message: format!("failed to serialize outbox headers: {e}"),
            })?;

        sqlx::query(
            "INSERT INTO relay.outbox_event (id, subject, payload, headers, status, retry_count, created_at, published_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(&event.subject)
        .bind(payload_json)
        .bind(headers_json)
        .bind(event.status.as_str())
        .bind(event.retry_count as i32)
        .bind(event.created_at)
        .bind(event.published_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| OutboxStoreError::DatabaseError {
            message: format!("failed to insert outbox event: {e}"),
        })?;
        Ok(())
    }
}

impl relay_ports::OutboxStore for PgOutboxStore {
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEvent>, OutboxStoreError> {
        let rows = sqlx::query(
            "SELECT id, subject, payload, headers, status, retry_count, created_at, published_at
             FROM relay.outbox_event
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutboxStoreError::DatabaseError {
            message: format!("failed to fetch pending outbox events: {e}"),
        })?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row
                .try_get("status")
                .map_err(|e| OutboxStoreError::DatabaseError {
                    message: format!("malformed outbox row: {e}"),
                })?;
            let status = OutboxStatus::parse(&status_str).unwrap_or(OutboxStatus::Pending);
            let payload_json: JsonValue =
                row.try_get("payload")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox payload: {e}"),
                    })?;
            let payload = serde_json::to_vec(&payload_json).map_err(|e| {
                OutboxStoreError::DatabaseError {
                    message: format!("failed to re-encode outbox payload: {e}"),
                }
            })?;
            let headers_json: Option<JsonValue> =
                row.try_get("headers")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox headers: {e}"),
                    })?;
            let headers: Option<BTreeMap<String, String>> =
                headers_json.and_then(|v| serde_json::from_value(v).ok());
            events.push(OutboxEvent {
                id: row
                    .try_get("id")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox id: {e}"),
                    })?,
                subject: row
                    .try_get("subject")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox subject: {e}"),
                    })?,
                payload,
                headers,
                status,
                retry_count: row
                    .try_get::<i32, _>("retry_count")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox retry_count: {e}"),
                    })? as u32,
                created_at: row
                    .try_get("created_at")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox created_at: {e}"),
                    })?,
                published_at: row
                    .try_get("published_at")
                    .map_err(|e| OutboxStoreError::DatabaseError {
                        message: format!("malformed outbox published_at: {e}"),
                    })?,
            });
        }
        Ok(events)
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), OutboxStoreError> {
        sqlx::query(
            "UPDATE relay.outbox_event SET status = 'published', published_at = $2
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxStoreError::DatabaseError {
            message: format!("failed to mark outbox event {id} published: {e}"),
        })?;
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid) -> Result<(), OutboxStoreError> {
        sqlx::query(
            "UPDATE relay.outbox_event SET retry_count = retry_count + 1
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxStoreError::DatabaseError {
            message: format!("failed to record retry for outbox event {id}: {e}"),
        })?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), OutboxStoreError> {
        sqlx::query(
            "UPDATE relay.outbox_event SET status = 'failed'
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxStoreError::DatabaseError {
            message: format!("failed to mark outbox event {id} failed: {e}"),
        })?;
        Ok(())
    }
}
