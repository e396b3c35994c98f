//! The stream bootstrapper: creates/validates the fixed six-stream set and
//! signals readiness.
//!
//! This adapter **never** calls an update/edit-stream API:
//! an existing stream whose configuration drifted from the desired
//! [`StreamSpec`] is reported as [`SubstrateError::StreamConfigMismatch`]
//! (failed in strict mode, logged in permissive mode) and left untouched.
//! Stream config drift is destructive — changing retention or subject
//! filters can invalidate in-flight replay semantics and orphan messages.

use std::collections::HashSet;

use relay_domain::{EffectiveStreamSpec, StreamOverride, STREAM_SET};
use relay_ports::{StreamInfo, SubstrateAdmin, SubstrateError};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// Which of the six streams this node owns, how strictly drift is treated,
/// and any per-stream tuning an operator has overridden away from the
/// compiled-in defaults.
#[derive(Debug, Clone)]
pub struct StreamBootstrapperConfig {
    /// Empty means "all six streams in `STREAM_SET`".
    pub stream_keys: Vec<String>,
    pub fail_on_mismatch: bool,
    pub overrides: Vec<StreamOverride>,
}

impl Default for StreamBootstrapperConfig {
    fn default() -> Self {
        StreamBootstrapperConfig {
            stream_keys: Vec::new(),
            fail_on_mismatch: true,
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("stream '{stream_name}' exists with a different configuration: {detail}")]
    ConfigMismatch { stream_name: String, detail: String },

    #[error("substrate error bootstrapping '{stream_name}': {source}")]
    Substrate {
        stream_name: String,
        #[source]
        source: SubstrateError,
    },
}

/// Creates or validates the streams this node owns, then flips a
/// [`watch::Sender`] to signal [`StreamBootstrapper::run`]'s completion.
///
/// The signal is a best-effort optimization, not a correctness requirement:
/// the relay engine tolerates its absence and independently retries
/// subscription until the streams it needs exist (the bootstrapper and the
/// relay links it gates would otherwise form a startup-order cycle).
/// Callers that don't care about the signal can drop the receiver.
pub struct StreamBootstrapper<A> {
    admin: A,
    config: StreamBootstrapperConfig,
}

impl<A: SubstrateAdmin> StreamBootstrapper<A> {
    pub fn new(admin: A, config: StreamBootstrapperConfig) -> Self {
        StreamBootstrapper { admin, config }
    }

    fn owned_streams(&self) -> Vec<EffectiveStreamSpec> {
        let specs: Vec<&'static relay_domain::StreamSpec> = if self.config.stream_keys.is_empty() {
            STREAM_SET.iter().collect()
        } else {
            STREAM_SET
                .iter()
                .filter(|s| self.config.stream_keys.iter().any(|k| k == s.name))
                .collect()
        };
        specs
            .into_iter()
            .map(|s| s.with_override(&self.config.overrides))
            .collect()
    }

    /// Bootstrap every owned stream, then broadcast readiness on `tx`.
    /// Returns the first mismatch/error encountered in strict mode; in
    /// permissive mode, mismatches are logged and bootstrapping continues.
    pub async fn run(&self, tx: &watch::Sender<bool>) -> Result<(), BootstrapError> {
        for spec in self.owned_streams() {
            self.ensure_stream(&spec).await?;
        }
        info!("bootstrap complete, all owned streams verified");
        let _ = tx.send(true);
        Ok(())
    }

    #[instrument(skip(self, spec), fields(stream = %spec.name))]
    async fn ensure_stream(&self, spec: &EffectiveStreamSpec) -> Result<(), BootstrapError> {
        let existing =
            self.admin
                .get_stream_info(&spec.name)
                .await
                .map_err(|e| BootstrapError::Substrate {
                    stream_name: spec.name.clone(),
                    source: e,
                })?;

        match existing {
            None => {
                info!(stream = %spec.name, "stream absent, creating");
                self.admin
                    .create_stream(spec)
                    .await
                    .map_err(|e| BootstrapError::Substrate {
                        stream_name: spec.name.clone(),
                        source: e,
                    })?;
                Ok(())
            }
            Some(info) => {
                if let Some(detail) = drift(spec, &info) {
                    if self.config.fail_on_mismatch {
                        Err(BootstrapError::ConfigMismatch {
                            stream_name: spec.name.clone(),
                            detail,
                        })
                    } else {
                        warn!(stream = %spec.name, detail = %detail, "stream config drift (permissive mode, not auto-repaired)");
                        Ok(())
                    }
                } else {
                    info!(stream = %spec.name, "stream verified, no drift");
                    Ok(())
                }
            }
        }
    }
}

/// Compares a desired [`EffectiveStreamSpec`] against the substrate's
/// reported [`StreamInfo`], returning a human-readable description of the
/// first dimension that differs, or `None` if they agree.
///
/// Subject filters and placement tags are compared as sets: the operator
/// may configure them in a different order than the compiled-in default.
fn drift(spec: &EffectiveStreamSpec, info: &StreamInfo) -> Option<String> {
    if info.retention != spec.retention.as_str() {
        return Some(format!(
            "retention: want '{}', got '{}'",
            spec.retention.as_str(),
            info.retention
        ));
    }
    if info.storage != spec.storage.as_str() {
        return Some(format!(
            "storage: want '{}', got '{}'",
            spec.storage.as_str(),
            info.storage
        ));
    }
    if info.max_age_secs != spec.max_age_secs {
        return Some(format!(
            "max_age_secs: want {}, got {}",
            spec.max_age_secs, info.max_age_secs
        ));
    }
    if info.replicas != spec.replicas {
        return Some(format!(
            "replicas: want {}, got {}",
            spec.replicas, info.replicas
        ));
    }
    let want_subjects: HashSet<&str> = spec.subjects.iter().map(|s| s.as_str()).collect();
    let got_subjects: HashSet<&str> = info.subjects.iter().map(|s| s.as_str()).collect();
    if want_subjects != got_subjects {
        return Some(format!(
            "subjects: want {:?}, got {:?}",
            spec.subjects, info.subjects
        ));
    }
    let want_tags: HashSet<&str> = spec.placement_tags.iter().map(|s| s.as_str()).collect();
    let got_tags: HashSet<&str> = info.placement_tags.iter().map(|s| s.as_str()).collect();
    if want_tags != got_tags {
        return Some(format!(
            "placement_tags: want {:?}, got {:?}",
            spec.placement_tags, info.placement_tags
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::{Retention, Storage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory fake substrate admin, so the comparison logic and the
    /// create-vs-compare branch can be exercised without a live broker.
    #[derive(Default)]
    struct FakeAdmin {
        streams: Mutex<HashMap<String, StreamInfo>>,
        created: Mutex<Vec<String>>,
    }

    impl FakeAdmin {
        fn with(name: &str, info: StreamInfo) -> Self {
            let mut streams = HashMap::new();
            streams.insert(name.to_string(), info);
            FakeAdmin {
                streams: Mutex::new(streams),
                created: Mutex::new(Vec::new()),
            }
        }
    }

    impl SubstrateAdmin for FakeAdmin {
        async fn get_stream_info(&self, name: &str) -> Result<Option<StreamInfo>, SubstrateError> {
            Ok(self.streams.lock().unwrap().get(name).cloned())
        }

        async fn create_stream(&self, spec: &EffectiveStreamSpec) -> Result<(), SubstrateError> {
            self.created.lock().unwrap().push(spec.name.clone());
            Ok(())
        }

        async fn ensure_consumer(
            &self,
            _stream_name: &str,
            _durable_name: &str,
            _filter_subject: &str,
        ) -> Result<(), SubstrateError> {
            Ok(())
        }
    }

    fn matching_info(spec: &EffectiveStreamSpec) -> StreamInfo {
        StreamInfo {
            name: spec.name.clone(),
            subjects: spec.subjects.clone(),
            retention: spec.retention.as_str().to_string(),
            storage: spec.storage.as_str().to_string(),
            max_age_secs: spec.max_age_secs,
            replicas: spec.replicas,
            placement_tags: spec.placement_tags.clone(),
        }
    }

    fn effective(key_index: usize) -> EffectiveStreamSpec {
        STREAM_SET[key_index].with_override(&[])
    }

    #[test]
    fn drift_detects_retention_mismatch() {
        let spec = effective(0);
        let mut info = matching_info(&spec);
        info.retention = Retention::Interest.as_str().to_string();
        assert!(drift(&spec, &info).unwrap().contains("retention"));
    }

    #[test]
    fn drift_detects_storage_mismatch() {
        let spec = effective(0);
        let mut info = matching_info(&spec);
        info.storage = Storage::Memory.as_str().to_string();
        assert!(drift(&spec, &info).unwrap().contains("storage"));
    }

    #[test]
    fn drift_is_order_insensitive_for_subjects_and_tags() {
        let spec = effective(0);
        let mut info = matching_info(&spec);
        info.subjects.reverse();
        assert!(drift(&spec, &info).is_none());
    }

    #[test]
    fn drift_none_when_everything_matches() {
        let spec = effective(0);
        let info = matching_info(&spec);
        assert!(drift(&spec, &info).is_none());
    }

    #[tokio::test]
    async fn creates_absent_streams() {
        let admin = FakeAdmin::default();
        let bootstrapper = StreamBootstrapper::new(admin, StreamBootstrapperConfig::default());
        let (tx, mut rx) = watch::channel(false);
        bootstrapper.run(&tx).await.unwrap();
        assert_eq!(bootstrapper.admin.created.lock().unwrap().len(), 6);
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn strict_mode_fails_on_mismatch() {
        let spec = &STREAM_SET[0];
        let mut info = matching_info(&effective(0));
        info.replicas = 99;
        let admin = FakeAdmin::with(spec.name, info);
        let bootstrapper = StreamBootstrapper::new(
            admin,
            StreamBootstrapperConfig {
                stream_keys: vec![spec.name.to_string()],
                fail_on_mismatch: true,
                overrides: Vec::new(),
            },
        );
        let (tx, _rx) = watch::channel(false);
        assert!(bootstrapper.run(&tx).await.is_err());
    }

    #[tokio::test]
    async fn permissive_mode_warns_and_continues() {
        let spec = &STREAM_SET[0];
        let mut info = matching_info(&effective(0));
        info.replicas = 99;
        let admin = FakeAdmin::with(spec.name, info);
        let bootstrapper = StreamBootstrapper::new(
            admin,
            StreamBootstrapperConfig {
                stream_keys: vec![spec.name.to_string()],
                fail_on_mismatch: false,
                overrides: Vec::new(),
            },
        );
        let (tx, mut rx) = watch::channel(false);
        bootstrapper.run(&tx).await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn stream_keys_allowlist_restricts_owned_streams() {
        let admin = FakeAdmin::default();
        let bootstrapper = StreamBootstrapper::new(
            admin,
            StreamBootstrapperConfig {
                stream_keys: vec!["UP_LEAF_STREAM".to_string()],
                fail_on_mismatch: true,
                overrides: Vec::new(),
            },
        );
        let (tx, _rx) = watch::channel(false);
        bootstrapper.run(&tx).await.unwrap();
        assert_eq!(bootstrapper.admin.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn override_widens_replicas_on_an_absent_stream_before_creation() {
        let admin = FakeAdmin::default();
        let bootstrapper = StreamBootstrapper::new(
            admin,
            StreamBootstrapperConfig {
                stream_keys: vec!["UP_LEAF_STREAM".to_string()],
                fail_on_mismatch: true,
                overrides: vec![StreamOverride {
                    name: "UP_LEAF_STREAM".to_string(),
                    replicas: Some(3),
                    ..Default::default()
                }],
            },
        );
        let (tx, _rx) = watch::channel(false);
        bootstrapper.run(&tx).await.unwrap();
        let owned = bootstrapper.owned_streams();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].replicas, 3);
    }

    #[tokio::test]
    async fn override_matching_existing_stream_avoids_false_drift() {
        let spec = &STREAM_SET[0];
        let overrides = vec![StreamOverride {
            name: spec.name.to_string(),
            replicas: Some(5),
            ..Default::default()
        }];
        let info = matching_info(&spec.with_override(&overrides));
        let admin = FakeAdmin::with(spec.name, info);
        let bootstrapper = StreamBootstrapper::new(
            admin,
            StreamBootstrapperConfig {
                stream_keys: vec![spec.name.to_string()],
                fail_on_mismatch: true,
                overrides,
            },
        );
        let (tx, mut rx) = watch::channel(false);
        bootstrapper.run(&tx).await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
