//! Relay Fabric Domain Core
//!
//! Pure domain logic for the hierarchical store-and-forward relay fabric:
//! - Node identity and the token grammar shared by every identity field
//! - The canonical subject codec and rewrite algebra
//! - Outbox event types and their status lifecycle
//! - Stream specifications for the fixed six-stream set
//!
//! This crate MUST NOT import DB clients, HTTP frameworks, or broker SDKs —
//! those live in `relay-adapters` behind the `relay-ports` traits.

pub mod errors;
pub mod identity;
pub mod links;
pub mod outbox;
pub mod stream_spec;
pub mod subject;

pub use errors::DomainError;
pub use identity::{Identity, Tier, Token};
pub use links::{links_for, LinkKind};
pub use outbox::{OutboxEvent, OutboxStatus};
pub use stream_spec::{
    EffectiveStreamSpec, Retention, Storage, StreamKey, StreamOverride, StreamSpec, STREAM_SET,
};
pub use subject::{CanonicalSubject, Direction, ParsedSubject};
