//! Cluster access seams
//!
//! The engine never talks to a cluster directly. A [`ClusterConnector`] turns
//! a provider's kubeconfig into a [`ClusterSession`], and every resource is
//! realized through the session of its provider. [`crate::KubeConnector`]
//! is the real implementation, [`crate::MockCluster`] the in-memory one.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use monstack_core::{ManifestDocument, ResolvedRelease, ReleaseStatus};

use crate::error::Result;

/// Opens sessions against a cluster
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect with an explicit kubeconfig document, or the ambient
    /// configuration when `None`
    async fn connect(&self, kubeconfig: Option<&str>) -> Result<Arc<dyn ClusterSession>>;
}

/// Operations the engine performs against one cluster
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Create the namespace if missing; returns its `metadata.name`
    async fn ensure_namespace(&self, name: &str) -> Result<String>;

    /// Read the data of an existing Secret, values base64-encoded
    async fn read_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;

    /// Install or upgrade a release and report its status
    async fn install_release(&self, release: &ResolvedRelease) -> Result<ReleaseStatus>;

    /// Apply every document as an independent object
    async fn apply_manifests(&self, documents: &[ManifestDocument]) -> Result<ApplySummary>;
}

/// Summary of a manifest apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Applied objects, `name (created|configured)`
    pub applied: Vec<String>,
    /// Objects that failed, with their errors
    pub failed: Vec<(String, String)>,
}

impl ApplySummary {
    /// Check if every object was applied
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Get total count
    pub fn total(&self) -> usize {
        self.applied.len() + self.failed.len()
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.applied.is_empty() {
            parts.push(format!("{} applied", self.applied.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", self.failed.len()));
        }
        if parts.is_empty() {
            "No objects applied".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Split a Secret identifier of the form `<namespace>/<name>`
pub fn parse_secret_id(id: &str) -> Option<(&str, &str)> {
    match id.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
            Some((ns, name))
        }
        _ => None,
    }
}
