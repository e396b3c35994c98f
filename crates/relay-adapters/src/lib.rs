//! Relay Fabric Adapter Implementations
//!
//! Concrete implementations of the `relay-ports` traits, plus the
//! orchestration logic that is generic over those traits rather than tied
//! to any one substrate or database:
//! - `nats`: JetStream-backed [`relay_ports::Substrate`]
//! - `outbox_store`: Postgres-backed [`relay_ports::OutboxStore`]
//! - `outbox_dispatcher`: the outbox poll loop
//! - `bootstrap`: the stream bootstrapper
//! - `relay`: the relay engine (per-link durable pull consumers)
//! - `terminal`: the terminal durable-consumer contract surface

pub mod bootstrap;
pub mod nats;
pub mod outbox_dispatcher;
pub mod outbox_store;
pub mod relay;
pub mod terminal;

pub use bootstrap::{BootstrapError, StreamBootstrapper, StreamBootstrapperConfig};
pub use nats::{NatsConfig, NatsInboundMessage, NatsPullConsumer, NatsSubstrate};
pub use outbox_dispatcher::{DispatchError, OutboxDispatcher, OutboxDispatcherConfig};
pub use outbox_store::PgOutboxStore;
pub use relay::{RelayConfig, RelayEngine};
pub use terminal::TerminalConsumer;
