//! NATS JetStream substrate adapter.
//!
//! Implements [`SubstrateAdmin`], [`SubstratePublisher`] and [`PullConsumer`]
//! on top of `async-nats`'s JetStream client.
//!
//! Unlike a naive mirror of stream-management code, [`NatsSubstrate::create_stream`]
//! never calls `update_stream`: per the bootstrapper's invariant, an adapter
//! that finds a stream already present with a different configuration has
//! nothing to do but report the drift back up through [`SubstrateError::StreamConfigMismatch`].

use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull::Config as PullConsumerConfig, AckPolicy, DeliverPolicy, ReplayPolicy},
    stream::{Config as StreamConfig, Placement, RetentionPolicy, StorageType},
    Context as JetStreamContext,
};
use async_nats::Client as NatsClient;
use relay_domain::{EffectiveStreamSpec, Retention, Storage};
use relay_ports::{
    InboundMessage, PullConsumer, StreamInfo, Substrate, SubstrateAdmin, SubstrateError,
    SubstratePublisher,
};
use tracing::{debug, info, instrument, warn};

/// NATS connection and naming configuration.
///
/// At most one of `token`, `(user, password)`, or `creds_file` is expected
/// to be set; [`NatsSubstrate::connect`] tries them in that order and falls
/// back to an unauthenticated connection when none are present.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    pub duplicate_window_secs: u64,
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub creds_file: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        NatsConfig {
            url: "nats://localhost:4222".to_string(),
            duplicate_window_secs: 120,
            token: None,
            user: None,
            password: None,
            creds_file: None,
        }
    }
}

impl NatsConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("RELAY_NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            duplicate_window_secs: std::env::var("RELAY_NATS_DUP_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(120),
            token: std::env::var("RELAY_NATS_TOKEN").ok(),
            user: std::env::var("RELAY_NATS_USER").ok(),
            password: std::env::var("RELAY_NATS_PASSWORD").ok(),
            creds_file: std::env::var("RELAY_NATS_CREDS_FILE").ok(),
        }
    }
}

fn retention_policy(r: Retention) -> RetentionPolicy {
    match r {
        Retention::WorkQueue => RetentionPolicy::WorkQueue,
        Retention::Interest => RetentionPolicy::Interest,
        Retention::Limits => RetentionPolicy::Limits,
    }
}

fn retention_name(r: RetentionPolicy) -> &'static str {
    match r {
        RetentionPolicy::WorkQueue => "work_queue",
        RetentionPolicy::Interest => "interest",
        RetentionPolicy::Limits => "limits",
    }
}

fn storage_type(s: Storage) -> StorageType {
    match s {
        Storage::File => StorageType::File,
        Storage::Memory => StorageType::Memory,
    }
}

fn storage_name(s: StorageType) -> &'static str {
    match s {
        StorageType::File => "file",
        StorageType::Memory => "memory",
    }
}

/// JetStream-backed substrate.
pub struct NatsSubstrate {
    #[allow(dead_code)]
    client: NatsClient,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsSubstrate {
    /// Connect to NATS and obtain a JetStream context. Does not create or
    /// inspect any stream; call the bootstrapper afterward for that.
    ///
    /// At most one of `token`, `(user, password)`, `creds_file` is expected
    /// to be set on `config`; the first one present wins, matching the
    /// `[broker]` table's "at most one" contract. No credentials at all
    /// falls back to an unauthenticated connection.
    pub async fn connect(config: NatsConfig) -> Result<Self, SubstrateError> {
        info!(url = %config.url, "connecting to NATS");
        let mut options = async_nats::ConnectOptions::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            options = options.token(token.to_string());
        } else if let (Some(user), Some(password)) = (
            config.user.as_deref().filter(|u| !u.is_empty()),
            config.password.as_deref(),
        ) {
            options = options.user_and_password(user.to_string(), password.to_string());
        } else if let Some(creds_file) = config.creds_file.as_deref().filter(|c| !c.is_empty()) {
            options = options.credentials_file(creds_file).await.map_err(|e| {
                SubstrateError::ConnectionError {
                    message: format!("failed to load NATS credentials file: {e}"),
                }
            })?;
        }

        let client = options
            .connect(&config.url)
            .await
            .map_err(|e| SubstrateError::ConnectionError {
                message: format!("failed to connect to NATS: {e}"),
            })?;
        let jetstream = jetstream::new(client.clone());
        Ok(NatsSubstrate {
            client,
            jetstream,
            config,
        })
    }

    /// Build a [`PullConsumer`] for an already-bootstrapped stream.
    pub async fn pull_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
    ) -> Result<NatsPullConsumer, SubstrateError> {
        let stream =
            self.jetstream
                .get_stream(stream_name)
                .await
                .map_err(|_| SubstrateError::StreamNotFound {
                    stream_name: stream_name.to_string(),
                })?;
        let consumer = stream
            .get_consumer(durable_name)
            .await
            .map_err(|e| SubstrateError::FetchError {
                message: format!("failed to bind consumer '{durable_name}': {e}"),
            })?;
        Ok(NatsPullConsumer { consumer })
    }
}

impl SubstrateAdmin for NatsSubstrate {
    #[instrument(skip(self))]
    async fn get_stream_info(&self, name: &str) -> Result<Option<StreamInfo>, SubstrateError> {
        match self.jetstream.get_stream(name).await {
            Ok(mut stream) => {
                let info = stream
                    .info()
                    .await
                    .map_err(|e| SubstrateError::ConnectionError {
                        message: format!("failed to read stream info for '{name}': {e}"),
                    })?;
                Ok(Some(StreamInfo {
                    name: info.config.name.clone(),
                    subjects: info.config.subjects.clone(),
                    retention: retention_name(info.config.retention).to_string(),
                    storage: storage_name(info.config.storage).to_string(),
                    max_age_secs: info.config.max_age.as_secs(),
                    replicas: info.config.num_replicas,
                    placement_tags: info
                        .config
                        .placement
                        .as_ref()
                        .map(|p| p.tags.clone())
                        .unwrap_or_default(),
                }))
            }
            Err(_) => Ok(None),
        }
    }

    #[instrument(skip(self, spec), fields(stream = %spec.name))]
    async fn create_stream(&self, spec: &EffectiveStreamSpec) -> Result<(), SubstrateError> {
        let placement = if spec.placement_tags.is_empty() {
            None
        } else {
            Some(Placement {
                cluster: String::new(),
                tags: spec.placement_tags.clone(),
            })
        };

        let config = StreamConfig {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
            retention: retention_policy(spec.retention),
            storage: storage_type(spec.storage),
            num_replicas: spec.replicas,
            max_age: Duration::from_secs(spec.max_age_secs),
            duplicate_window: Duration::from_secs(self.config.duplicate_window_secs),
            placement,
            ..Default::default()
        };

        info!(stream = %spec.name, "creating stream");
        self.jetstream
            .create_stream(config)
            .await
            .map_err(|e| SubstrateError::ConnectionError {
                message: format!("failed to create stream '{}': {e}", spec.name),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn ensure_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
        filter_subject: &str,
    ) -> Result<(), SubstrateError> {
        let stream =
            self.jetstream
                .get_stream(stream_name)
                .await
                .map_err(|_| SubstrateError::StreamNotFound {
                    stream_name: stream_name.to_string(),
                })?;

        let consumer_config = PullConsumerConfig {
            durable_name: Some(durable_name.to_string()),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            replay_policy: ReplayPolicy::Instant,
            filter_subject: filter_subject.to_string(),
            ..Default::default()
        };

        stream
            .get_or_create_consumer(durable_name, consumer_config)
            .await
            .map_err(|e| SubstrateError::ConnectionError {
                message: format!("failed to create consumer '{durable_name}': {e}"),
            })?;

        debug!(stream = stream_name, consumer = durable_name, "consumer ready");
        Ok(())
    }
}

impl SubstratePublisher for NatsSubstrate {
    #[instrument(skip(self, payload), fields(subject = %subject))]
    async fn publish_with_id(
        &self,
        subject: &str,
        payload: &[u8],
        message_id: &str,
    ) -> Result<(), SubstrateError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id);

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), headers, payload.to_vec().into())
            .await
            .map_err(|e| SubstrateError::PublishError {
                message: format!("failed to publish to '{subject}': {e}"),
            })?;

        ack.await.map_err(|e| SubstrateError::PublishError {
            message: format!("publish to '{subject}' was not acked: {e}"),
        })?;

        debug!(subject = %subject, message_id = %message_id, "published");
        Ok(())
    }
}

impl Substrate for NatsSubstrate {
    type Consumer = NatsPullConsumer;

    async fn pull_consumer(
        &self,
        stream_name: &str,
        durable_name: &str,
    ) -> Result<NatsPullConsumer, SubstrateError> {
        NatsSubstrate::pull_consumer(self, stream_name, durable_name).await
    }
}

/// A durable pull consumer bound to one stream.
pub struct NatsPullConsumer {
    consumer: jetstream::consumer::Consumer<jetstream::consumer::pull::Config>,
}

impl PullConsumer for NatsPullConsumer {
    type Message = NatsInboundMessage;

    async fn fetch(&self, batch_size: usize) -> Result<Vec<NatsInboundMessage>, SubstrateError> {
        use futures::StreamExt;

        let messages = self
            .consumer
            .fetch()
            .max_messages(batch_size)
            .messages()
            .await
            .map_err(|e| SubstrateError::FetchError {
                message: format!("failed to fetch messages: {e}"),
            })?;

        let collected: Vec<_> = messages.take(batch_size).collect().await;
        let mut result = Vec::with_capacity(collected.len());
        for msg_result in collected {
            match msg_result {
                Ok(msg) => result.push(NatsInboundMessage { inner: msg }),
                Err(e) => warn!(error = %e, "failed to receive message from consumer"),
            }
        }
        Ok(result)
    }
}

/// Wraps an `async_nats` JetStream message with ack/nak/term handles.
pub struct NatsInboundMessage {
    inner: jetstream::Message,
}

impl InboundMessage for NatsInboundMessage {
    fn subject(&self) -> &str {
        self.inner.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.inner.payload
    }

    fn message_id(&self) -> Option<&str> {
        self.inner
            .headers
            .as_ref()
            .and_then(|h| h.get("Nats-Msg-Id"))
            .map(|v| v.as_str())
    }

    async fn ack(&self) -> Result<(), SubstrateError> {
        self.inner
            .ack()
            .await
            .map_err(|e| SubstrateError::AckError {
                message: format!("failed to ack: {e}"),
            })
    }

    async fn nak(&self) -> Result<(), SubstrateError> {
        self.inner
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| SubstrateError::AckError {
                message: format!("failed to nak: {e}"),
            })
    }

    async fn term(&self) -> Result<(), SubstrateError> {
        self.inner
            .ack_with(jetstream::AckKind::Term)
            .await
            .map_err(|e| SubstrateError::AckError {
                message: format!("failed to term: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_points_at_localhost() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.duplicate_window_secs, 120);
    }

    #[test]
    fn retention_and_storage_map_both_ways() {
        assert_eq!(retention_name(retention_policy(Retention::WorkQueue)), "work_queue");
        assert_eq!(retention_name(retention_policy(Retention::Interest)), "interest");
        assert_eq!(storage_name(storage_type(Storage::File)), "file");
        assert_eq!(storage_name(storage_type(Storage::Memory)), "memory");
    }
}
