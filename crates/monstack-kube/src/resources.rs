//! Server-side apply of raw manifests
//!
//! Objects are resolved to API resources through discovery. Kinds that are
//! not served yet, typically custom resources whose CRD is still being
//! installed by a chart, are retried after refreshing discovery until the
//! retry window closes.

use std::time::Duration;

use kube::{
    Client,
    api::{Api, DynamicObject, Patch, PatchParams},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use monstack_core::ManifestDocument;
use tokio::time::{Instant, sleep};

use crate::error::{KubeError, Result};
use crate::provider::ApplySummary;

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "monstack";

/// Namespace given to namespaced objects that name none
pub const DEFAULT_NAMESPACE: &str = "default";

/// How long unserved kinds are retried
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Object resolved against discovery, ready to apply
#[derive(Debug, Clone)]
struct ParsedResource {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ParsedResource {
    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        match &self.obj.metadata.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, name),
            None => format!("{}/{}", self.gvk.kind, name),
        }
    }
}

/// Applies manifest documents with Server-Side Apply
pub struct ResourceManager {
    client: Client,
    discovery: Discovery,
    retry_timeout: Duration,
    poll_interval: Duration,
}

impl ResourceManager {
    /// Create a manager, running discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self {
            client,
            discovery,
            retry_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            poll_interval: DISCOVERY_POLL_INTERVAL,
        })
    }

    /// Bound the retries for kinds that are not served yet
    pub fn with_retry_timeout(mut self, timeout: Duration) -> Self {
        self.retry_timeout = timeout;
        self
    }

    /// Refresh discovery cache (call after CRD changes)
    pub async fn refresh_discovery(&mut self) -> Result<()> {
        self.discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;
        Ok(())
    }

    /// Apply every document, retrying those whose kind is not served yet
    pub async fn apply_documents(&mut self, documents: &[ManifestDocument]) -> Result<ApplySummary> {
        let deadline = Instant::now() + self.retry_timeout;
        let mut summary = ApplySummary::default();
        let mut pending: Vec<&ManifestDocument> = documents.iter().collect();

        loop {
            let mut unserved = Vec::new();

            for doc in pending {
                let resource = match self.parse_document(doc) {
                    Ok(resource) => resource,
                    Err(KubeError::UnknownResourceType { .. }) => {
                        unserved.push(doc);
                        continue;
                    }
                    Err(e) => {
                        summary.failed.push((doc.display_name(), e.to_string()));
                        continue;
                    }
                };

                let name = resource.display_name();
                match self.apply_single_resource(&resource).await {
                    Ok(created) => {
                        let action = if created { "created" } else { "configured" };
                        tracing::info!(object = %name, action, "applied");
                        summary.applied.push(format!("{} ({})", name, action));
                    }
                    Err(e) => summary.failed.push((name, e.to_string())),
                }
            }

            if unserved.is_empty() {
                return Ok(summary);
            }

            if Instant::now() >= deadline {
                for doc in unserved {
                    summary.failed.push((
                        doc.display_name(),
                        format!(
                            "kind {}/{} not served after {:?}",
                            doc.api_version().unwrap_or_default(),
                            doc.kind().unwrap_or_default(),
                            self.retry_timeout
                        ),
                    ));
                }
                return Ok(summary);
            }

            tracing::warn!(
                pending = unserved.len(),
                "waiting for resource kinds to be served"
            );
            sleep(self.poll_interval).await;
            self.refresh_discovery().await?;
            pending = unserved;
        }
    }

    fn parse_document(&self, doc: &ManifestDocument) -> Result<ParsedResource> {
        let mut obj: DynamicObject = serde_json::from_value(doc.object.clone())?;

        let type_meta = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidConfig(format!(
                "{} is missing apiVersion or kind",
                doc.display_name()
            ))
        })?;

        let gvk = gvk_from_type_meta(type_meta);

        let (api_resource, capabilities) =
            self.discovery
                .resolve_gvk(&gvk)
                .ok_or_else(|| KubeError::UnknownResourceType {
                    api_version: type_meta.api_version.clone(),
                    kind: type_meta.kind.clone(),
                })?;

        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }

        Ok(ParsedResource {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    /// Apply one object; returns whether it was created
    async fn apply_single_resource(&self, resource: &ParsedResource) -> Result<bool> {
        let name = resource.obj.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidConfig("Resource missing metadata.name".to_string())
        })?;

        let api = self.api_for_resource(resource);
        let exists = api.get_opt(name).await.map_err(KubeError::Api)?.is_some();

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        api.patch(name, &params, &Patch::Apply(&resource.obj))
            .await
            .map_err(KubeError::Api)?;

        Ok(!exists)
    }

    fn api_for_resource(&self, resource: &ParsedResource) -> Api<DynamicObject> {
        if resource.capabilities.scope == Scope::Namespaced {
            let ns = resource
                .obj
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_NAMESPACE);
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "monitoring.coreos.com/v1" -> group="monitoring.coreos.com", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
