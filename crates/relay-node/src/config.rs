//! TOML configuration loading for a relay node.
//!
//! Two-step load, following rusty-timer's `RawConfig`/`ForwarderConfig`
//! split: [`RawConfig`] mirrors the `[identity]`/`[broker]`/`[bootstrap]`/
//! `[outbox]`/`[relay]`/`[health]`/`[[streams]]` TOML shape with serde
//! defaults for everything but `[identity]`; [`NodeConfig::load`] parses it
//! and then validates it into domain types, so a bad tier name or an
//! invalid identity token fails at startup with the offending field named,
//! not partway through wiring a component.

use std::path::Path;

use relay_domain::{Identity, Retention, StreamOverride, Storage, Tier};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    identity: RawIdentity,
    #[serde(default)]
    broker: RawBroker,
    #[serde(default)]
    bootstrap: RawBootstrap,
    #[serde(default)]
    outbox: RawOutbox,
    #[serde(default)]
    relay: RawRelay,
    #[serde(default)]
    health: RawHealth,
    #[serde(default)]
    streams: Vec<RawStreamOverride>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawIdentity {
    tier: String,
    zone: String,
    #[serde(default = "default_subzone")]
    subzone: String,
    node: String,
}

fn default_subzone() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawBroker {
    url: String,
    token: String,
    user: String,
    password: String,
    creds_file: String,
    tls: bool,
}

impl Default for RawBroker {
    fn default() -> Self {
        RawBroker {
            url: "nats://localhost:4222".to_string(),
            token: String::new(),
            user: String::new(),
            password: String::new(),
            creds_file: String::new(),
            tls: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawBootstrap {
    fail_on_mismatch: bool,
    stream_keys: Vec<String>,
}

impl Default for RawBootstrap {
    fn default() -> Self {
        RawBootstrap {
            fail_on_mismatch: true,
            stream_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawOutbox {
    enabled: bool,
    database_url: String,
    batch_size: usize,
    poll_interval_ms: u64,
    max_retries: u32,
}

impl Default for RawOutbox {
    fn default() -> Self {
        RawOutbox {
            enabled: true,
            database_url: "postgres://localhost/relay".to_string(),
            batch_size: 100,
            poll_interval_ms: 500,
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawRelay {
    enabled: bool,
    zone_has_subzones: bool,
    batch_size: usize,
    poll_interval_ms: u64,
    subscribe_retry_ms: u64,
}

impl Default for RawRelay {
    fn default() -> Self {
        RawRelay {
            enabled: true,
            zone_has_subzones: false,
            batch_size: 50,
            poll_interval_ms: 200,
            subscribe_retry_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawHealth {
    bind: String,
}

impl Default for RawHealth {
    fn default() -> Self {
        RawHealth {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawStreamOverride {
    name: String,
    #[serde(default)]
    subjects: Vec<String>,
    #[serde(default)]
    retention: Option<String>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    max_age_secs: Option<u64>,
    #[serde(default)]
    replicas: Option<usize>,
    #[serde(default)]
    placement_tags: Vec<String>,
}

/// Validated identity plus every component's tuning, ready to wire up.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub identity: Identity,
    pub broker: BrokerConfig,
    pub bootstrap: BootstrapConfig,
    pub outbox: OutboxConfig,
    pub relay: RelayNodeConfig,
    pub health: HealthConfig,
    pub stream_overrides: Vec<StreamOverride>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub token: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub creds_file: Option<String>,
    #[allow(dead_code)]
    pub tls: bool,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub fail_on_mismatch: bool,
    pub stream_keys: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub enabled: bool,
    pub database_url: String,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct RelayNodeConfig {
    pub enabled: bool,
    pub zone_has_subzones: bool,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub subscribe_retry_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub bind: String,
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<NodeConfig, ConfigError> {
        let tier = Tier::parse(&raw.identity.tier).ok_or_else(|| ConfigError::Invalid {
            field: "identity.tier".to_string(),
            reason: format!(
                "'{}' is not one of leaf, subzone, zone, central",
                raw.identity.tier
            ),
        })?;
        let subzone = if raw.identity.subzone == "none" {
            None
        } else {
            Some(raw.identity.subzone)
        };
        let identity = Identity::new(tier, raw.identity.zone, subzone, raw.identity.node)
            .map_err(|e| ConfigError::Invalid {
                field: "identity".to_string(),
                reason: e.to_string(),
            })?;

        let broker = BrokerConfig {
            url: raw.broker.url,
            token: non_empty(raw.broker.token),
            user: non_empty(raw.broker.user),
            password: non_empty(raw.broker.password),
            creds_file: non_empty(raw.broker.creds_file),
            tls: raw.broker.tls,
        };
        let bootstrap = BootstrapConfig {
            fail_on_mismatch: raw.bootstrap.fail_on_mismatch,
            stream_keys: raw.bootstrap.stream_keys,
        };
        let outbox = OutboxConfig {
            enabled: raw.outbox.enabled,
            database_url: raw.outbox.database_url,
            batch_size: raw.outbox.batch_size,
            poll_interval_ms: raw.outbox.poll_interval_ms,
            max_retries: raw.outbox.max_retries,
        };
        let relay = RelayNodeConfig {
            enabled: raw.relay.enabled,
            zone_has_subzones: raw.relay.zone_has_subzones,
            batch_size: raw.relay.batch_size,
            poll_interval_ms: raw.relay.poll_interval_ms,
            subscribe_retry_ms: raw.relay.subscribe_retry_ms,
        };
        let health = HealthConfig {
            bind: raw.health.bind,
        };
        let mut stream_overrides = Vec::with_capacity(raw.streams.len());
        for s in raw.streams {
            let retention = s
                .retention
                .as_deref()
                .map(Retention::parse)
                .transpose()
                .map_err(|e| ConfigError::Invalid {
                    field: format!("streams.{}.retention", s.name),
                    reason: e.to_string(),
                })?;
            let storage = s
                .storage
                .as_deref()
                .map(Storage::parse)
                .transpose()
                .map_err(|e| ConfigError::Invalid {
                    field: format!("streams.{}.storage", s.name),
                    reason: e.to_string(),
                })?;
            stream_overrides.push(StreamOverride {
                name: s.name,
                subjects: s.subjects,
                retention,
                storage,
                max_age_secs: s.max_age_secs,
                replicas: s.replicas,
                placement_tags: s.placement_tags,
            });
        }

        Ok(NodeConfig {
            identity,
            broker,
            bootstrap,
            outbox,
            relay,
            health,
            stream_overrides,
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [identity]
        tier = "zone"
        zone = "snc"
        node = "zone-a"

        [relay]
        zone_has_subzones = true
    "#;

    #[test]
    fn loads_identity_and_applies_defaults() {
        let raw: RawConfig = toml::from_str(SAMPLE).unwrap();
        let config = NodeConfig::from_raw(raw).unwrap();
        assert_eq!(config.identity.tier, Tier::Zone);
        assert_eq!(config.identity.zone.as_str(), "snc");
        assert_eq!(config.identity.subzone.as_str(), "none");
        assert_eq!(config.broker.url, "nats://localhost:4222");
        assert!(config.bootstrap.fail_on_mismatch);
        assert!(config.outbox.enabled);
        assert!(config.relay.zone_has_subzones);
        assert_eq!(config.health.bind, "0.0.0.0:8080");
    }

    #[test]
    fn rejects_unknown_tier() {
        let text = r#"
            [identity]
            tier = "planet"
            zone = "snc"
            node = "zone-a"
        "#;
        let raw: RawConfig = toml::from_str(text).unwrap();
        let err = NodeConfig::from_raw(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "identity.tier"));
    }

    #[test]
    fn empty_broker_strings_become_none() {
        let raw: RawConfig = toml::from_str(SAMPLE).unwrap();
        let config = NodeConfig::from_raw(raw).unwrap();
        assert!(config.broker.token.is_none());
        assert!(config.broker.creds_file.is_none());
    }

    #[test]
    fn stream_override_parses_retention_and_storage() {
        let text = r#"
            [identity]
            tier = "zone"
            zone = "snc"
            node = "zone-a"

            [[streams]]
            name = "UP_ZONE_STREAM"
            retention = "work-queue"
            storage = "memory"
            replicas = 3
        "#;
        let raw: RawConfig = toml::from_str(text).unwrap();
        let config = NodeConfig::from_raw(raw).unwrap();
        assert_eq!(config.stream_overrides.len(), 1);
        let ov = &config.stream_overrides[0];
        assert_eq!(ov.name, "UP_ZONE_STREAM");
        assert_eq!(ov.retention, Some(Retention::WorkQueue));
        assert_eq!(ov.storage, Some(Storage::Memory));
        assert_eq!(ov.replicas, Some(3));
    }

    #[test]
    fn stream_override_rejects_unknown_retention() {
        let text = r#"
            [identity]
            tier = "zone"
            zone = "snc"
            node = "zone-a"

            [[streams]]
            name = "UP_ZONE_STREAM"
            retention = "bogus"
        "#;
        let raw: RawConfig = toml::from_str(text).unwrap();
        let err = NodeConfig::from_raw(raw).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { field, .. } if field == "streams.UP_ZONE_STREAM.retention")
        );
    }

    #[test]
    fn load_reads_and_parses_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-node.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = NodeConfig::load(&path).unwrap();

        assert_eq!(config.identity.tier, Tier::Zone);
        assert_eq!(config.identity.node.as_str(), "zone-a");
    }

    #[test]
    fn load_surfaces_a_read_error_for_a_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");

        let err = NodeConfig::load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_surfaces_a_parse_error_for_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay-node.toml");
        std::fs::write(&path, "not = [valid toml").unwrap();

        let err = NodeConfig::load(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
