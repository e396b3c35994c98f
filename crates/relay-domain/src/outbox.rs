//! Outbox event types and their status lifecycle.
//!
//! An [`OutboxEvent`] is a row written inside the same database transaction
//! as the business change that produced it. The dispatcher in
//! `relay-adapters` later publishes it to the substrate and flips its
//! status; the event itself never knows how it gets there.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an outbox row. Transitions are monotonic: once `Published`
/// or `Failed`, a row is never moved back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<OutboxStatus> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "published" => Some(OutboxStatus::Published),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// A pending (or already-dispatched) event awaiting delivery to the
/// substrate.
///
/// `id` doubles as the broker-side dedup key (`Nats-Msg-Id`), so a duplicate
/// publish caused by a crash between publish and status update is harmless:
/// the broker's dedup window drops the redelivered copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub subject: String,
    pub payload: Vec<u8>,
    /// Absent (`None`) is stored as SQL `NULL`, not as an empty object.
    pub headers: Option<BTreeMap<String, String>>,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Construct a fresh pending row with a new random id. A `None` payload
    /// is stored as the JSON literal `{}`; headers stay `None` until a
    /// caller sets them explicitly, and a `None` value there is stored as
    /// SQL `NULL`.
    pub fn pending(subject: impl Into<String>, payload: Option<Vec<u8>>) -> Self {
        OutboxEvent {
            id: Uuid::new_v4(),
            subject: subject.into(),
            payload: payload.unwrap_or_else(|| b"{}".to_vec()),
            headers: None,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    /// The broker dedup key derived from this event's id.
    pub fn message_id(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for s in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Failed,
        ] {
            assert_eq!(OutboxStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OutboxStatus::parse("bogus"), None);
    }

    #[test]
    fn pending_event_starts_unpublished_with_no_retries() {
        let event = OutboxEvent::pending(
            "up.leaf.snc.none.desk1.orders.order.created",
            Some(vec![1, 2, 3]),
        );
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.retry_count, 0);
        assert!(event.published_at.is_none());
        assert!(event.headers.is_none());
        assert_eq!(event.message_id(), event.id.to_string());
    }

    #[test]
    fn absent_payload_is_stored_as_the_empty_json_object() {
        let event = OutboxEvent::pending("up.leaf.snc.none.desk1.orders.order.created", None);
        assert_eq!(event.payload, b"{}");
    }
}
