//! Cluster sessions backed by the Kubernetes API and the helm binary

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use monstack_core::{ManifestDocument, ReleaseState, ReleaseStatus, ResolvedRelease};
use tokio::sync::Mutex;

use crate::error::{KubeError, Result};
use crate::helm::HelmCli;
use crate::provider::{ApplySummary, ClusterConnector, ClusterSession};
use crate::resources::{DEFAULT_DISCOVERY_TIMEOUT, FIELD_MANAGER, ResourceManager};

/// Connects to real clusters
#[derive(Debug, Clone)]
pub struct KubeConnector {
    helm: HelmCli,
    discovery_timeout: Duration,
}

impl KubeConnector {
    pub fn new(helm: HelmCli) -> Self {
        Self {
            helm,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Bound the wait for manifest kinds to be served
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, kubeconfig: Option<&str>) -> Result<Arc<dyn ClusterSession>> {
        let config = match kubeconfig {
            Some(document) => {
                let parsed = Kubeconfig::from_yaml(document)?;
                Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default()).await?
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::InvalidConfig(e.to_string()))?,
        };
        tracing::debug!(cluster = %config.cluster_url, "connecting to cluster");

        let client = Client::try_from(config)?;
        Ok(Arc::new(KubeSession {
            client,
            kubeconfig: kubeconfig.map(str::to_string),
            helm: self.helm.clone(),
            discovery_timeout: self.discovery_timeout,
            resources: Mutex::new(None),
        }))
    }
}

/// A connected cluster
pub struct KubeSession {
    client: Client,
    kubeconfig: Option<String>,
    helm: HelmCli,
    discovery_timeout: Duration,
    // Discovery runs on first manifest apply
    resources: Mutex<Option<ResourceManager>>,
}

impl KubeSession {
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ClusterSession for KubeSession {
    async fn ensure_namespace(&self, name: &str) -> Result<String> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        let applied = api.patch(name, &params, &Patch::Apply(&namespace)).await?;

        let applied_name = applied.metadata.name.unwrap_or_else(|| name.to_string());
        tracing::info!(namespace = %applied_name, "namespace ready");
        Ok(applied_name)
    }

    async fn read_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api
            .get_opt(name)
            .await?
            .ok_or_else(|| KubeError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let data = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, bytes)| (key, STANDARD.encode(bytes.0)))
            .collect();
        tracing::info!(secret = %format!("{}/{}", namespace, name), "read secret");
        Ok(data)
    }

    async fn install_release(&self, release: &ResolvedRelease) -> Result<ReleaseStatus> {
        let status = self
            .helm
            .install(release, self.kubeconfig.as_deref())
            .await?;

        if status.status != ReleaseState::Deployed {
            return Err(KubeError::ReleaseFailed {
                name: status.name,
                status: status.status.to_string(),
            });
        }
        tracing::info!(release = %status.name, revision = status.revision, "release deployed");
        Ok(status)
    }

    async fn apply_manifests(&self, documents: &[ManifestDocument]) -> Result<ApplySummary> {
        let mut guard = self.resources.lock().await;
        let manager = match guard.take() {
            Some(manager) => manager,
            None => ResourceManager::new(self.client.clone())
                .await?
                .with_retry_timeout(self.discovery_timeout),
        };
        guard.insert(manager).apply_documents(documents).await
    }
}
