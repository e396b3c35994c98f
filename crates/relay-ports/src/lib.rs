//! Relay Fabric Port Traits
//!
//! Interfaces the substrate adapter and outbox storage adapter must
//! implement, so that `relay-domain` and the orchestration code in
//! `relay-node` never depend on `async-nats` or `sqlx` directly:
//! - SubstrateAdmin (stream bootstrapping)
//! - SubstratePublisher (publish-then-ack delivery)
//! - PullConsumer / InboundMessage (durable pull consumption)
//! - OutboxStore (persistence of pending events)
//! - Clock

use std::future::Future;

use chrono::{DateTime, Utc};
use relay_domain::{EffectiveStreamSpec, OutboxEvent};

/// Administrative surface over the substrate's stream catalog.
///
/// Per the bootstrapper's never-auto-modify invariant, there is
/// deliberately no `update_stream` method on this trait: an adapter that
/// finds an existing stream whose config differs from the desired
/// [`StreamSpec`] has nothing left to call but report the drift.
pub trait SubstrateAdmin: Send + Sync {
    /// Fetch the substrate's current config for a stream, if it exists.
    fn get_stream_info(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<StreamInfo>, SubstrateError>> + Send;

    /// Create a stream exactly as specified. Must not be called when a
    /// stream by that name already exists.
    fn create_stream(
        &self,
        spec: &EffectiveStreamSpec,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send;

    /// Create the named durable pull consumer if absent, filtered to the
    /// given subject, idempotently.
    fn ensure_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
        filter_subject: &str,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send;
}

/// What the substrate reports back about an existing stream, used by the
/// bootstrapper to detect configuration drift against a [`StreamSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: String,
    pub storage: String,
    pub max_age_secs: u64,
    pub replicas: usize,
    pub placement_tags: Vec<String>,
}

/// Publish-then-ack delivery to the substrate.
pub trait SubstratePublisher: Send + Sync {
    /// Publish a payload under `subject`, tagged with `message_id` for the
    /// substrate's dedup window, and await the broker's ack that the
    /// message is durably stored.
    fn publish_with_id(
        &self,
        subject: &str,
        payload: &[u8],
        message_id: &str,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send;
}

/// A durable pull consumer bound to one stream and one filter subject.
///
/// `Message` is an associated type rather than `Box<dyn InboundMessage>`:
/// `InboundMessage`'s ack/nak/term methods return `impl Future`, which is
/// not object-safe, so callers generic over `PullConsumer` work with the
/// concrete message type directly instead of a trait object.
pub trait PullConsumer: Send + Sync {
    type Message: InboundMessage;

    /// Pull up to `batch_size` pending messages, waiting briefly for at
    /// least one if none are immediately available.
    fn fetch(
        &self,
        batch_size: usize,
    ) -> impl Future<Output = Result<Vec<Self::Message>, SubstrateError>> + Send;
}

/// A single message pulled from a [`PullConsumer`], carrying its own
/// ack/nak/term handles.
pub trait InboundMessage: Send + Sync {
    fn subject(&self) -> &str;
    fn payload(&self) -> &[u8];
    fn message_id(&self) -> Option<&str>;

    /// Acknowledge successful processing; the substrate will not redeliver.
    fn ack(&self) -> impl Future<Output = Result<(), SubstrateError>> + Send;

    /// Negative-acknowledge; the substrate redelivers after its backoff.
    fn nak(&self) -> impl Future<Output = Result<(), SubstrateError>> + Send;

    /// Terminate; the substrate will not redeliver even though it was
    /// never acked. Used for messages that fail to parse.
    fn term(&self) -> impl Future<Output = Result<(), SubstrateError>> + Send;
}

/// The full substrate surface the relay engine needs: administration
/// (bootstrapper), publishing (dispatcher and relay republish), and binding
/// a durable consumer for an already-subscribed link.
///
/// Split from [`SubstrateAdmin`]/[`SubstratePublisher`] so a fake used in
/// bootstrapper tests doesn't have to implement consumer binding it never
/// exercises.
pub trait Substrate: SubstrateAdmin + SubstratePublisher {
    type Consumer: PullConsumer;

    /// Bind to a durable consumer already created by [`SubstrateAdmin::ensure_consumer`].
    fn pull_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
    ) -> impl Future<Output = Result<Self::Consumer, SubstrateError>> + Send;
}

impl<T: SubstrateAdmin + ?Sized> SubstrateAdmin for std::sync::Arc<T> {
    fn get_stream_info(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<StreamInfo>, SubstrateError>> + Send {
        (**self).get_stream_info(name)
    }

    fn create_stream(
        &self,
        spec: &EffectiveStreamSpec,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send {
        (**self).create_stream(spec)
    }

    fn ensure_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
        filter_subject: &str,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send {
        (**self).ensure_consumer(stream_name, durable_name, filter_subject)
    }
}

impl<T: SubstratePublisher + ?Sized> SubstratePublisher for std::sync::Arc<T> {
    fn publish_with_id(
        &self,
        subject: &str,
        payload: &[u8],
        message_id: &str,
    ) -> impl Future<Output = Result<(), SubstrateError>> + Send {
        (**self).publish_with_id(subject, payload, message_id)
    }
}

impl<T: Substrate> Substrate for std::sync::Arc<T> {
    type Consumer = T::Consumer;

    fn pull_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
    ) -> impl Future<Output = Result<Self::Consumer, SubstrateError>> + Send {
        (**self).pull_consumer(stream_name, durable_name)
    }
}

/// Errors surfaced by substrate adapters.
#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error("connection error: {message}")]
    ConnectionError { message: String },

    #[error("stream not found: {stream_name}")]
    StreamNotFound { stream_name: String },

    #[error("stream '{stream_name}' already exists with a different configuration")]
    StreamConfigMismatch { stream_name: String },

    #[error("publish error: {message}")]
    PublishError { message: String },

    #[error("ack error: {message}")]
    AckError { message: String },

    #[error("fetch error: {message}")]
    FetchError { message: String },
}

/// Persistence for pending outbox events, written inside the same
/// transaction as the business change by callers outside this crate; the
/// dispatcher only ever reads, marks published, or marks failed.
pub trait OutboxStore: Send + Sync {
    /// Fetch up to `limit` pending events, oldest first.
    fn fetch_pending(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<OutboxEvent>, OutboxStoreError>> + Send;

    /// Mark an event published. Never moves a `Published`/`Failed` event
    /// back to `Pending`.
    fn mark_published(
        &self,
        id: uuid::Uuid,
    ) -> impl Future<Output = Result<(), OutboxStoreError>> + Send;

    /// Record a failed publish attempt, incrementing `retry_count`.
    fn mark_retry(
        &self,
        id: uuid::Uuid,
    ) -> impl Future<Output = Result<(), OutboxStoreError>> + Send;

    /// Mark an event permanently failed once its retry budget is spent.
    fn mark_failed(
        &self,
        id: uuid::Uuid,
    ) -> impl Future<Output = Result<(), OutboxStoreError>> + Send;
}

/// Errors surfaced by the outbox store.
#[derive(Debug, thiserror::Error)]
pub enum OutboxStoreError {
    #[error("database error: {message}")]
    DatabaseError { message: String },
}

/// Clock port for deterministic time handling in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
