//! Plan execution
//!
//! The [`Engine`] walks a [`Plan`] wave by wave. Resources of one wave run
//! concurrently; a wave only starts once every resource of the previous one
//! has finished. When a wave has failures the run stops after it and the
//! failures are reported together.
//!
//! Each resource publishes its outputs as soon as it finishes, so deferred
//! inputs of later resources (and the stack exports) resolve from them. A
//! failed resource fails its outputs instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use monstack_core::{
    CoreError, ManifestDocument, ReleaseStatus, Resource, ResourceId, ResourceKind,
    ResourceOutputs, Plan,
};
use tokio::sync::OnceCell;

use crate::error::{KubeError, ResourceFailure, Result};
use crate::provider::{ApplySummary, ClusterConnector, ClusterSession, parse_secret_id};

/// What a finished resource produced
enum Produced {
    Session(Arc<dyn ClusterSession>),
    Namespace(String),
    SecretData(BTreeMap<String, String>),
    Release(ReleaseStatus),
    Manifests(ApplySummary),
}

impl Produced {
    fn describe(&self) -> String {
        match self {
            Produced::Session(_) => "connected".to_string(),
            Produced::Namespace(name) => format!("namespace {}", name),
            Produced::SecretData(data) => format!("{} key(s) read", data.len()),
            Produced::Release(status) => {
                format!("{} revision {}", status.status, status.revision)
            }
            Produced::Manifests(summary) => summary.summary(),
        }
    }
}

/// Outcome of one resource in a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub wave: usize,
    pub elapsed: Duration,
    pub detail: String,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub records: Vec<ResourceRecord>,
    pub waves: usize,
}

impl RunSummary {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.records.iter().find(|r| &r.id == id)
    }
}

/// Realizes plans against clusters
pub struct Engine {
    connector: Arc<dyn ClusterConnector>,
    sessions: HashMap<ResourceId, Arc<dyn ClusterSession>>,
    // Resources without a provider use the ambient configuration
    default_session: OnceCell<Arc<dyn ClusterSession>>,
}

impl Engine {
    pub fn new(connector: Arc<dyn ClusterConnector>) -> Self {
        Self {
            connector,
            sessions: HashMap::new(),
            default_session: OnceCell::new(),
        }
    }

    /// Execute every resource of `plan`
    pub async fn run(&mut self, plan: Plan) -> Result<RunSummary> {
        let waves = plan.into_waves();
        let mut summary = RunSummary {
            records: Vec::new(),
            waves: waves.len(),
        };

        for (wave, resources) in waves.into_iter().enumerate() {
            tracing::info!(wave, resources = resources.len(), "starting wave");

            let outcomes = {
                let this = &*self;
                join_all(resources.into_iter().map(|r| this.realize(r))).await
            };

            let mut failures = Vec::new();
            for (id, elapsed, outcome) in outcomes {
                match outcome {
                    Ok(produced) => {
                        let detail = produced.describe();
                        if let Produced::Session(session) = produced {
                            self.sessions.insert(id.clone(), session);
                        }
                        summary.records.push(ResourceRecord {
                            id,
                            wave,
                            elapsed,
                            detail,
                        });
                    }
                    Err(error) => failures.push(ResourceFailure {
                        resource: id.to_string(),
                        error,
                    }),
                }
            }

            if !failures.is_empty() {
                tracing::error!(wave, failed = failures.len(), "wave failed");
                return Err(KubeError::Deployment { failures });
            }
        }

        tracing::info!(
            resources = summary.len(),
            waves = summary.waves,
            "run complete"
        );
        Ok(summary)
    }

    /// Run one resource and publish its outputs
    async fn realize(&self, resource: Resource) -> (ResourceId, Duration, Result<Produced>) {
        let Resource {
            id,
            kind,
            options,
            outputs,
            ..
        } = resource;
        let started = Instant::now();
        tracing::info!(resource = %id, "creating");

        let work = self.produce(&id, kind, options.provider.as_ref());
        let result = match options.custom_timeouts.create {
            Some(after) => match tokio::time::timeout(after, work).await {
                Ok(result) => result,
                Err(_) => Err(KubeError::Timeout {
                    resource: id.to_string(),
                    after,
                }),
            },
            None => work.await,
        };

        let elapsed = started.elapsed();
        match &result {
            Ok(produced) => {
                tracing::info!(resource = %id, ?elapsed, detail = %produced.describe(), "created")
            }
            Err(e) => tracing::error!(resource = %id, ?elapsed, error = %e, "failed"),
        }

        publish(&id, outputs, &result);
        (id, elapsed, result)
    }

    async fn produce(
        &self,
        id: &ResourceId,
        kind: ResourceKind,
        provider: Option<&ResourceId>,
    ) -> Result<Produced> {
        match kind {
            ResourceKind::Provider(spec) => {
                let kubeconfig = spec.kubeconfig.value().await?;
                let session = self.connector.connect(Some(&kubeconfig)).await?;
                Ok(Produced::Session(session))
            }
            ResourceKind::Namespace(spec) => {
                let session = self.session_for(id, provider).await?;
                let name = session.ensure_namespace(&spec.name).await?;
                Ok(Produced::Namespace(name))
            }
            ResourceKind::Secret(spec) => {
                let secret_id = spec.id.value().await?;
                let (namespace, name) =
                    parse_secret_id(&secret_id).ok_or_else(|| KubeError::InvalidSecretId {
                        id: secret_id.clone(),
                    })?;
                let session = self.session_for(id, provider).await?;
                let data = session.read_secret(namespace, name).await?;
                Ok(Produced::SecretData(data))
            }
            ResourceKind::Release(spec) => {
                let release = spec.resolve().await?;
                let session = self.session_for(id, provider).await?;
                let status = session.install_release(&release).await?;
                Ok(Produced::Release(status))
            }
            ResourceKind::ConfigGroup(spec) => {
                let documents: Vec<ManifestDocument> = spec.load_documents()?;
                let session = self.session_for(id, provider).await?;
                let summary = session.apply_manifests(&documents).await?;
                if !summary.is_success() {
                    return Err(KubeError::ApplyFailed {
                        failed: summary.failed.len(),
                        total: summary.total(),
                        details: summary
                            .failed
                            .iter()
                            .map(|(object, error)| format!("{}: {}", object, error))
                            .collect::<Vec<_>>()
                            .join("; "),
                    });
                }
                Ok(Produced::Manifests(summary))
            }
        }
    }

    async fn session_for(
        &self,
        id: &ResourceId,
        provider: Option<&ResourceId>,
    ) -> Result<Arc<dyn ClusterSession>> {
        match provider {
            Some(provider) => {
                self.sessions
                    .get(provider)
                    .cloned()
                    .ok_or_else(|| KubeError::NoSession {
                        resource: id.to_string(),
                    })
            }
            None => {
                let session = self
                    .default_session
                    .get_or_try_init(|| self.connector.connect(None))
                    .await?;
                Ok(session.clone())
            }
        }
    }
}

/// Hand the result of a resource to whoever waits on its outputs
fn publish(id: &ResourceId, outputs: ResourceOutputs, result: &Result<Produced>) {
    let failure = |e: &KubeError| CoreError::ResourceFailed {
        resource: id.to_string(),
        message: e.to_string(),
    };

    match (outputs, result) {
        (ResourceOutputs::None, _) => {}
        (ResourceOutputs::Namespace { name }, Ok(Produced::Namespace(value))) => {
            name.resolve(value.clone())
        }
        (ResourceOutputs::Secret { data }, Ok(Produced::SecretData(value))) => {
            data.resolve_secret(value.clone())
        }
        (ResourceOutputs::Release { status }, Ok(Produced::Release(value))) => {
            status.resolve(value.clone())
        }
        (ResourceOutputs::Namespace { name }, Err(e)) => name.fail(failure(e)),
        (ResourceOutputs::Secret { data }, Err(e)) => data.fail(failure(e)),
        (ResourceOutputs::Release { status }, Err(e)) => status.fail(failure(e)),
        // Dropping a resolver leaves its output unresolved
        (_, Ok(_)) => {}
    }
}
