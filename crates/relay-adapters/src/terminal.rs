//! Terminal consumer helper: the contract surface for a node that is the
//! final recipient of a stream, not a relay link.
//!
//! Central's read of `UP_ZONE_STREAM` and a leaf's read of
//! `DOWN_SUBZONE_STREAM` never rewrite or republish — any further business
//! processing of those events is out of scope here. This type exists so
//! that contract surface is a concrete, testable thing rather than ad hoc
//! code wherever a terminal node is wired up, while deliberately doing
//! nothing more than fetch/ack/nak/term.

use relay_domain::Identity;
use relay_ports::{PullConsumer, Substrate, SubstrateError};

/// Durable name for a terminal consumer, following the same
/// `"<tier>_<zone>_<subzone>_<node>__<dir>__<remote_tier>"` convention as a
/// relay link's durable name.
pub fn terminal_durable_name(identity: &Identity, direction: &str, remote_tier: &str) -> String {
    format!(
        "{}_{}_{}_{}__{}__{}",
        identity.tier, identity.zone, identity.subzone, identity.node, direction, remote_tier,
    )
}

/// A thin wrapper around a bound [`PullConsumer`] for a terminal stream.
/// Exposes exactly `fetch` and the three ack dispositions — no rewrite, no
/// republish.
pub struct TerminalConsumer<C> {
    consumer: C,
}

impl<C: PullConsumer> TerminalConsumer<C> {
    pub fn new(consumer: C) -> Self {
        TerminalConsumer { consumer }
    }

    /// Bind a terminal consumer on `stream_name`, using the same
    /// ensure-then-bind sequence a relay link uses, via a generic
    /// [`Substrate`].
    pub async fn bind<S>(
        substrate: &S,
        stream_name: &str,
        durable_name: &str,
        filter_subject: &str,
    ) -> Result<TerminalConsumer<S::Consumer>, SubstrateError>
    where
        S: Substrate,
    {
        substrate
            .ensure_consumer(stream_name, durable_name, filter_subject)
            .await?;
        let consumer = substrate.pull_consumer(stream_name, durable_name).await?;
        Ok(TerminalConsumer::new(consumer))
    }

    pub async fn fetch(&self, batch_size: usize) -> Result<Vec<C::Message>, SubstrateError> {
        self.consumer.fetch(batch_size).await
    }
}
