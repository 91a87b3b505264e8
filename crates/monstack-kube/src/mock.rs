//! In-memory cluster for testing
//!
//! Records every operation in order, with a start and a finish event, so
//! tests can assert that one resource finished before another started.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use monstack_core::{ManifestDocument, ReleaseState, ReleaseStatus, ResolvedRelease, Values};

use crate::error::{KubeError, Result};
use crate::provider::{ApplySummary, ClusterConnector, ClusterSession};

/// An operation observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterEvent {
    Connected { kubeconfig: Option<String> },
    NamespaceEnsured { name: String },
    SecretRead { namespace: String, name: String },
    ReleaseStarted { name: String },
    ReleaseFinished { name: String },
    ManifestsStarted { count: usize },
    ManifestsFinished { count: usize },
}

#[derive(Default)]
struct MockState {
    events: Vec<ClusterEvent>,
    secrets: HashMap<(String, String), BTreeMap<String, String>>,
    /// Values each release was installed with, secrets included
    installed: HashMap<String, Values>,
    revisions: HashMap<String, u32>,
    failing_releases: HashSet<String>,
    release_delay: Duration,
}

/// Mock cluster that records operations
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<MockState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a Secret; values are given base64-encoded, as stored by Kubernetes
    pub fn with_secret(
        self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Self {
        self.write(|s| {
            s.secrets
                .insert((namespace.to_string(), name.to_string()), data);
        });
        self
    }

    /// Make installs of `release` fail
    pub fn with_failing_release(self, release: &str) -> Self {
        self.write(|s| {
            s.failing_releases.insert(release.to_string());
        });
        self
    }

    /// Make every release install take `delay`
    pub fn with_release_delay(self, delay: Duration) -> Self {
        self.write(|s| s.release_delay = delay);
        self
    }

    /// Every recorded operation, in order
    pub fn events(&self) -> Vec<ClusterEvent> {
        self.read(|s| s.events.clone())
    }

    /// Position of the first event matching `event`
    pub fn position(&self, event: &ClusterEvent) -> Option<usize> {
        self.read(|s| s.events.iter().position(|e| e == event))
    }

    /// Values a release was installed with
    pub fn installed_values(&self, release: &str) -> Option<Values> {
        self.read(|s| s.installed.get(release).cloned())
    }

    fn record(&self, event: ClusterEvent) {
        self.write(|s| s.events.push(event));
    }

    fn read<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        match self.state.read() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        match self.state.write() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[async_trait]
impl ClusterConnector for MockCluster {
    async fn connect(&self, kubeconfig: Option<&str>) -> Result<Arc<dyn ClusterSession>> {
        self.record(ClusterEvent::Connected {
            kubeconfig: kubeconfig.map(str::to_string),
        });
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl ClusterSession for MockCluster {
    async fn ensure_namespace(&self, name: &str) -> Result<String> {
        self.record(ClusterEvent::NamespaceEnsured {
            name: name.to_string(),
        });
        Ok(name.to_string())
    }

    async fn read_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        self.record(ClusterEvent::SecretRead {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self.read(|s| {
            s.secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
        })
        .ok_or_else(|| KubeError::SecretNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn install_release(&self, release: &ResolvedRelease) -> Result<ReleaseStatus> {
        self.record(ClusterEvent::ReleaseStarted {
            name: release.name.clone(),
        });

        let delay = self.read(|s| s.release_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.read(|s| s.failing_releases.contains(&release.name)) {
            return Err(KubeError::Helm {
                command: "upgrade".to_string(),
                stderr: format!("release {} failed", release.name),
            });
        }

        let revision = self.write(|s| {
            s.installed
                .insert(release.name.clone(), release.values.values().clone());
            let revision = s.revisions.entry(release.name.clone()).or_insert(0);
            *revision += 1;
            *revision
        });

        self.record(ClusterEvent::ReleaseFinished {
            name: release.name.clone(),
        });

        Ok(ReleaseStatus {
            name: release.name.clone(),
            namespace: release.namespace.clone(),
            revision,
            status: ReleaseState::Deployed,
            chart: release.chart.clone(),
            version: release.version.clone(),
            app_version: None,
        })
    }

    async fn apply_manifests(&self, documents: &[ManifestDocument]) -> Result<ApplySummary> {
        self.record(ClusterEvent::ManifestsStarted {
            count: documents.len(),
        });
        let summary = ApplySummary {
            applied: documents
                .iter()
                .map(|d| format!("{} (created)", d.display_name()))
                .collect(),
            failed: Vec::new(),
        };
        self.record(ClusterEvent::ManifestsFinished {
            count: documents.len(),
        });
        Ok(summary)
    }
}
