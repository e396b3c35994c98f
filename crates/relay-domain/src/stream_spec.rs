//! The fixed six-stream set and the stream configuration types the
//! bootstrapper and relay engine agree on.
//!
//! Every tier boundary gets one `up` stream and one `down` stream; nothing
//! in the fabric creates a stream outside this fixed set.

use crate::errors::DomainError;

/// JetStream-style retention policy, generalized to whichever substrate the
/// `relay-ports` traits sit in front of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retention {
    /// Exactly one active consumer group drains each message; messages are
    /// removed once acked. Used by every `up` stream in the fixed set.
    WorkQueue,
    /// Messages persist as long as at least one consumer still has
    /// interest; acking by one consumer doesn't remove it for others.
    Interest,
    /// Messages persist purely on age/size limits regardless of consumers.
    Limits,
}

impl Retention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Retention::WorkQueue => "work_queue",
            Retention::Interest => "interest",
            Retention::Limits => "limits",
        }
    }

    /// Tolerant parse accepting common spellings operators actually type in
    /// config files: underscores, hyphens, or no separator at all.
    pub fn parse(s: &str) -> Result<Retention, DomainError> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "workqueue" => Ok(Retention::WorkQueue),
            "interest" => Ok(Retention::Interest),
            "limits" => Ok(Retention::Limits),
            other => Err(DomainError::UnknownEnumerant {
                field: "retention".to_owned(),
                value: other.to_owned(),
            }),
        }
    }
}

/// Storage backend for a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Storage {
    File,
    Memory,
}

impl Storage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Storage::File => "file",
            Storage::Memory => "memory",
        }
    }

    pub fn parse(s: &str) -> Result<Storage, DomainError> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Storage::File),
            "memory" => Ok(Storage::Memory),
            other => Err(DomainError::UnknownEnumerant {
                field: "storage".to_owned(),
                value: other.to_owned(),
            }),
        }
    }
}

/// Identifies one of the six fixed streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKey {
    UpLeaf,
    UpSubzone,
    UpZone,
    DownCentral,
    DownZone,
    DownSubzone,
}

impl StreamKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKey::UpLeaf => "UP_LEAF_STREAM",
            StreamKey::UpSubzone => "UP_SUBZONE_STREAM",
            StreamKey::UpZone => "UP_ZONE_STREAM",
            StreamKey::DownCentral => "DOWN_CENTRAL_STREAM",
            StreamKey::DownZone => "DOWN_ZONE_STREAM",
            StreamKey::DownSubzone => "DOWN_SUBZONE_STREAM",
        }
    }
}

/// The desired configuration of one of the six fixed streams, as the
/// bootstrapper wants it to exist on the substrate.
#[derive(Debug, Clone, Copy)]
pub struct StreamSpec {
    pub key: StreamKey,
    pub name: &'static str,
    pub subjects: &'static [&'static str],
    pub retention: Retention,
    pub storage: Storage,
    pub max_age_secs: u64,
    pub replicas: usize,
    pub placement_tags: &'static [&'static str],
}

/// The fabric's fixed six-stream set: one `up` and one `down` stream per
/// tier boundary, named and filtered exactly as the compatibility table
/// requires (downstream consumers rely on these names verbatim).
///
/// `up` streams are `WorkQueue`-retained: each message is destined for
/// exactly one relay link to drain towards the next tier, enforcing the
/// single-owner-consumer invariant. `down` streams are `Interest`-retained:
/// messages persist while any durable consumer still has outstanding
/// interest, so a broadcast to `all` isn't dropped before every interested
/// consumer group has drained it.
pub static STREAM_SET: [StreamSpec; 6] = [
    StreamSpec {
        key: StreamKey::UpLeaf,
        name: "UP_LEAF_STREAM",
        subjects: &["up.leaf.>"],
        retention: Retention::WorkQueue,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
    StreamSpec {
        key: StreamKey::UpSubzone,
        name: "UP_SUBZONE_STREAM",
        subjects: &["up.subzone.>"],
        retention: Retention::WorkQueue,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
    StreamSpec {
        key: StreamKey::UpZone,
        name: "UP_ZONE_STREAM",
        subjects: &["up.zone.>"],
        retention: Retention::WorkQueue,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
    StreamSpec {
        key: StreamKey::DownCentral,
        name: "DOWN_CENTRAL_STREAM",
        subjects: &["down.central.>"],
        retention: Retention::Interest,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
    StreamSpec {
        key: StreamKey::DownZone,
        name: "DOWN_ZONE_STREAM",
        subjects: &["down.zone.>"],
        retention: Retention::Interest,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
    StreamSpec {
        key: StreamKey::DownSubzone,
        name: "DOWN_SUBZONE_STREAM",
        subjects: &["down.subzone.>"],
        retention: Retention::Interest,
        storage: Storage::File,
        max_age_secs: 0,
        replicas: 1,
        placement_tags: &[],
    },
];

/// Look up a stream's fixed spec by name, as reported back by the
/// substrate when the bootstrapper checks an existing stream for drift.
pub fn by_name(name: &str) -> Option<&'static StreamSpec> {
    STREAM_SET.iter().find(|s| s.name == name)
}

/// An operator override for one of the six streams' tunable fields, parsed
/// and validated from config. `name` selects which compiled-in [`StreamSpec`]
/// it applies to; `subjects`/`placement_tags` left empty and the other
/// fields left `None` mean "keep the compiled-in default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOverride {
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: Option<Retention>,
    pub storage: Option<Storage>,
    pub max_age_secs: Option<u64>,
    pub replicas: Option<usize>,
    pub placement_tags: Vec<String>,
}

/// The desired configuration of one stream after merging an optional
/// [`StreamOverride`] onto its compiled-in [`StreamSpec`] default.
///
/// A distinct, owned type rather than reusing `StreamSpec` itself: the
/// latter's `subjects`/`placement_tags` are `&'static [&'static str]`, which
/// an operator-supplied override (read from a TOML file at startup, not
/// known at compile time) cannot populate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveStreamSpec {
    pub key: StreamKey,
    pub name: String,
    pub subjects: Vec<String>,
    pub retention: Retention,
    pub storage: Storage,
    pub max_age_secs: u64,
    pub replicas: usize,
    pub placement_tags: Vec<String>,
}

impl StreamSpec {
    /// Merge an optional override onto this default. `overrides` is
    /// searched by `name`; at most one is expected to match since stream
    /// names are unique.
    pub fn with_override(&self, overrides: &[StreamOverride]) -> EffectiveStreamSpec {
        let ov = overrides.iter().find(|o| o.name == self.name);
        EffectiveStreamSpec {
            key: self.key,
            name: self.name.to_string(),
            subjects: match ov {
                Some(o) if !o.subjects.is_empty() => o.subjects.clone(),
                _ => self.subjects.iter().map(|s| s.to_string()).collect(),
            },
            retention: ov.and_then(|o| o.retention).unwrap_or(self.retention),
            storage: ov.and_then(|o| o.storage).unwrap_or(self.storage),
            max_age_secs: ov
                .and_then(|o| o.max_age_secs)
                .unwrap_or(self.max_age_secs),
            replicas: ov.and_then(|o| o.replicas).unwrap_or(self.replicas),
            placement_tags: match ov {
                Some(o) if !o.placement_tags.is_empty() => o.placement_tags.clone(),
                _ => self
                    .placement_tags
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            },
        }
    }
}
