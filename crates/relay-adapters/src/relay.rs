//! The relay engine: one cooperative task per link, each owning a durable
//! pull consumer that rewrites and republishes messages with
//! publish-then-ack semantics.
//!
//! Runs on zone and subzone nodes only; leaf and central
//! nodes never construct a [`RelayEngine`]. Per link: a startup retry loop
//! subscribes once its in-stream exists, then a poll loop drains batches
//! until shutdown. A crash between a successful republish and the
//! corresponding ack causes redelivery and a duplicate publish, which the
//! substrate's message-id dedup window collapses — this is the central
//! correctness argument for at-least-once delivery across the hierarchy.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_domain::{links_for, CanonicalSubject, Direction, Identity, LinkKind};
use relay_ports::{InboundMessage, PullConsumer, Substrate, SubstrateError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Tuning shared by every link this node runs.
#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub zone_has_subzones: bool,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub subscribe_retry_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            zone_has_subzones: false,
            batch_size: 50,
            poll_interval_ms: 200,
            subscribe_retry_ms: 2_000,
        }
    }
}

/// Owns every link this node runs and the shared registry of durable
/// consumer names that have successfully subscribed.
///
/// The registry exists for operator visibility (the health/readiness
/// surface can report it) — correctness doesn't depend on it, since each
/// link task only ever touches its own subscription.
pub struct RelayEngine<S: Substrate> {
    substrate: Arc<S>,
    identity: Identity,
    config: RelayConfig,
    started: Arc<Mutex<HashSet<String>>>,
}

impl<S: Substrate + 'static> RelayEngine<S> {
    pub fn new(substrate: Arc<S>, identity: Identity, config: RelayConfig) -> Self {
        RelayEngine {
            substrate,
            identity,
            config,
            started: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The links this node's tier runs, per the fixed link table.
    pub fn links(&self) -> Vec<LinkKind> {
        links_for(self.identity.tier, self.config.zone_has_subzones)
    }

    /// Durable consumer names that have subscribed so far. Empty before
    /// `run` starts spawning tasks, and before each link's first successful
    /// subscription.
    pub async fn started_links(&self) -> Vec<String> {
        self.started.lock().await.iter().cloned().collect()
    }

    /// Spawn one task per link and run them concurrently until `running`
    /// clears. A `bootstrap_ready` receiver lets link startup retry more
    /// eagerly once the bootstrapper signals it's done, without depending
    /// on that signal for correctness — each link still retries on its own
    /// fixed interval regardless.
    pub async fn run(&self, running: Arc<AtomicBool>, bootstrap_ready: watch::Receiver<bool>) {
        let links = self.links();
        if links.is_empty() {
            debug!(tier = %self.identity.tier, "node tier runs no relay links");
            return;
        }

        let mut tasks = JoinSet::new();
        for link in links {
            let substrate = self.substrate.clone();
            let identity = self.identity.clone();
            let config = self.config;
            let started = self.started.clone();
            let running = running.clone();
            let bootstrap_ready = bootstrap_ready.clone();
            tasks.spawn(async move {
                run_link(link, substrate, identity, config, started, running, bootstrap_ready)
                    .await;
            });
        }
        while tasks.join_next().await.is_some() {}
    }
}

/// Subscribe a single link, retrying on recoverable errors, then drain it
/// until `running` clears.
async fn run_link<S: Substrate>(
    link: LinkKind,
    substrate: Arc<S>,
    identity: Identity,
    config: RelayConfig,
    started: Arc<Mutex<HashSet<String>>>,
    running: Arc<AtomicBool>,
    mut bootstrap_ready: watch::Receiver<bool>,
) {
    let durable_name = link.durable_name(&identity);
    let filter_subject = link.filter_subject(&identity);
    let in_stream = link.in_stream().as_str();
    let out_stream = link.out_stream().as_str();

    let mut retry_ticker = tokio::time::interval(Duration::from_millis(config.subscribe_retry_ms));
    let consumer = loop {
        if !running.load(Ordering::Relaxed) {
            return;
        }
        match subscribe(&*substrate, in_stream, &durable_name, &filter_subject).await {
            Ok(consumer) => break consumer,
            Err(SubstrateError::StreamNotFound { .. }) => {
                debug!(link = link.key(), stream = in_stream, "in-stream not bootstrapped yet, retrying");
            }
            Err(e) => {
                warn!(link = link.key(), error = %e, "link subscription failed, retrying");
            }
        }
        tokio::select! {
            _ = retry_ticker.tick() => {}
            _ = bootstrap_ready.changed() => {}
        }
    };

    started.lock().await.insert(durable_name.clone());
    info!(link = link.key(), durable = %durable_name, in_stream, out_stream, "link subscribed");

    let mut poll_ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    while running.load(Ordering::Relaxed) {
        poll_ticker.tick().await;
        match consumer.fetch(config.batch_size).await {
            Ok(messages) => {
                for message in messages {
                    handle_message(&link, &identity, &*substrate, out_stream, &message).await;
                }
            }
            Err(e) => {
                warn!(link = link.key(), error = %e, "fetch failed, will retry next poll");
            }
        }
    }
}

async fn subscribe<S: Substrate>(
    substrate: &S,
    stream_name: &str,
    durable_name: &str,
    filter_subject: &str,
) -> Result<S::Consumer, SubstrateError> {
    substrate
        .ensure_consumer(stream_name, durable_name, filter_subject)
        .await?;
    substrate.pull_consumer(stream_name, durable_name).await
}

/// Parse, rewrite, republish, then ack a single message. Per-message
/// failures are logged and swallowed — one poison message never stalls the
/// link; the substrate redelivers unacked messages after its visibility
/// timeout.
#[instrument(skip(substrate, message), fields(link = link.key()))]
async fn handle_message<S: Substrate, M: InboundMessage>(
    link: &LinkKind,
    identity: &Identity,
    substrate: &S,
    out_stream: &str,
    message: &M,
) {
    let Some(parsed) = CanonicalSubject::try_parse(message.subject()) else {
        // No ack: a permanently malformed subject dead-letters on its own
        // after the consumer's max-delivery attempts, a policy set outside
        // the core rather than by terminating it here.
        warn!(subject = message.subject(), "non-canonical subject, leaving unacked");
        return;
    };

    let (out_zone, out_subzone) = match link.out_direction() {
        // Down relays preserve the destination scope the message already
        // carries; up relays re-identify the message at this hop.
        Direction::Down => (parsed.zone.clone(), parsed.subzone.clone()),
        Direction::Up => (identity.zone.clone(), identity.subzone.clone()),
    };
    let out_subject = parsed.rewrite(
        link.out_direction(),
        link.out_tier(),
        out_zone,
        out_subzone,
        identity.node.clone(),
    );

    let message_id = message.message_id().map(|s| s.to_string());
    let publish_result = match &message_id {
        Some(id) => {
            substrate
                .publish_with_id(&out_subject.to_string(), message.payload(), id)
                .await
        }
        // No inbound message-id header: chain-wide dedup is unavailable for
        // this hop, and the substrate assigns its own id for the republish.
        None => {
            let generated = uuid::Uuid::new_v4().to_string();
            substrate
                .publish_with_id(&out_subject.to_string(), message.payload(), &generated)
                .await
        }
    };

    match publish_result {
        Ok(()) => {
            // Ack only after the republish is durably stored: a crash here
            // causes redelivery and a duplicate publish, harmless under the
            // substrate's dedup window.
            if let Err(e) = message.ack().await {
                error!(error = %e, out_stream, "republish acked but source ack failed; expect redelivery");
            }
        }
        Err(e) => {
            warn!(error = %e, out_stream, subject = %out_subject, "republish failed, leaving source message unacked");
        }
    }
}
