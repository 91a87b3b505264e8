//! Declared resource graph
//!
//! A [`Plan`] is the desired state of one run: resources in declaration
//! order, each with the edges it depends on. Edges come from three places:
//! - the explicit `depends_on` list of its [`ResourceOptions`]
//! - its provider
//! - the resources behind any [`Output`] used as one of its inputs
//!
//! A resource may only depend on resources declared before it, so the graph
//! is acyclic by construction. The engine executes it wave by wave: a
//! resource's wave is one past the deepest of its dependencies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::manifests::ConfigGroupSpec;
use crate::output::{Output, Resolver};
use crate::release::{ReleaseHandle, ReleaseSpec, ReleaseStatus};

/// Kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Provider,
    Namespace,
    Secret,
    Release,
    ConfigGroup,
}

impl ResourceType {
    /// Type token used in resource identifiers
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Provider => "pulumi:providers:kubernetes",
            Self::Namespace => "kubernetes:core/v1:Namespace",
            Self::Secret => "kubernetes:core/v1:Secret",
            Self::Release => "kubernetes:helm.sh/v3:Release",
            Self::ConfigGroup => "kubernetes:yaml:ConfigGroup",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Unique identity of a declared resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceType,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.kind, self.name)
    }
}

/// Per-operation timeouts enforced by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CustomTimeouts {
    pub create: Option<Duration>,
}

impl CustomTimeouts {
    pub fn create(timeout: Duration) -> Self {
        Self {
            create: Some(timeout),
        }
    }
}

/// Options shared by every resource declaration
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
    pub provider: Option<ResourceId>,
    pub depends_on: Vec<ResourceId>,
    pub custom_timeouts: CustomTimeouts,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(mut self, provider: &ProviderHandle) -> Self {
        self.provider = Some(provider.id.clone());
        self
    }

    pub fn depends_on(mut self, resource: &ResourceId) -> Self {
        self.depends_on.push(resource.clone());
        self
    }

    pub fn custom_timeouts(mut self, timeouts: CustomTimeouts) -> Self {
        self.custom_timeouts = timeouts;
        self
    }
}

/// Cluster connection built from a kubeconfig
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub kubeconfig: Output<String>,
}

/// A namespace to ensure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
    pub name: String,
}

/// Read of an existing Secret identified by `<namespace>/<name>`
#[derive(Debug, Clone)]
pub struct SecretReadSpec {
    pub id: Output<String>,
}

/// What a resource is
#[derive(Debug, Clone)]
pub enum ResourceKind {
    Provider(ProviderSpec),
    Namespace(NamespaceSpec),
    Secret(SecretReadSpec),
    Release(Box<ReleaseSpec>),
    ConfigGroup(ConfigGroupSpec),
}

impl ResourceKind {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Provider(_) => ResourceType::Provider,
            Self::Namespace(_) => ResourceType::Namespace,
            Self::Secret(_) => ResourceType::Secret,
            Self::Release(_) => ResourceType::Release,
            Self::ConfigGroup(_) => ResourceType::ConfigGroup,
        }
    }

    fn input_dependencies(&self) -> BTreeSet<ResourceId> {
        match self {
            Self::Provider(spec) => spec.kubeconfig.dependencies().clone(),
            Self::Secret(spec) => spec.id.dependencies().clone(),
            Self::Release(spec) => spec.input_dependencies(),
            Self::Namespace(_) | Self::ConfigGroup(_) => BTreeSet::new(),
        }
    }
}

/// Write halves of the outputs a resource publishes
#[derive(Debug)]
pub enum ResourceOutputs {
    None,
    Namespace { name: Resolver<String> },
    Secret { data: Resolver<BTreeMap<String, String>> },
    Release { status: Resolver<ReleaseStatus> },
}

/// A declared resource
#[derive(Debug)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub options: ResourceOptions,
    /// Every resource this one waits for
    pub dependencies: BTreeSet<ResourceId>,
    pub outputs: ResourceOutputs,
}

#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub id: ResourceId,
}

#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    pub id: ResourceId,
    /// `metadata.name`, known once the namespace exists
    pub name: Output<String>,
}

#[derive(Debug, Clone)]
pub struct SecretHandle {
    pub id: ResourceId,
    /// Base64-encoded Secret data, secret-flagged
    pub data: Output<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct ConfigGroupHandle {
    pub id: ResourceId,
}

/// The declared graph of one run
#[derive(Debug, Default)]
pub struct Plan {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a cluster provider
    pub fn provider(&mut self, name: &str, kubeconfig: Output<String>) -> Result<ProviderHandle> {
        let id = ResourceId::new(ResourceType::Provider, name);
        self.register(
            id.clone(),
            ResourceKind::Provider(ProviderSpec { kubeconfig }),
            ResourceOptions::default(),
            ResourceOutputs::None,
        )?;
        Ok(ProviderHandle { id })
    }

    /// Declare a namespace
    pub fn namespace(
        &mut self,
        name: &str,
        spec: NamespaceSpec,
        options: ResourceOptions,
    ) -> Result<NamespaceHandle> {
        let id = ResourceId::new(ResourceType::Namespace, name);
        let (output, resolver) = Output::pending(id.clone());
        self.register(
            id.clone(),
            ResourceKind::Namespace(spec),
            options,
            ResourceOutputs::Namespace { name: resolver },
        )?;
        Ok(NamespaceHandle { id, name: output })
    }

    /// Declare a read of an existing Secret
    pub fn get_secret(
        &mut self,
        name: &str,
        secret_id: Output<String>,
        options: ResourceOptions,
    ) -> Result<SecretHandle> {
        let id = ResourceId::new(ResourceType::Secret, name);
        let (output, resolver) = Output::pending(id.clone());
        self.register(
            id.clone(),
            ResourceKind::Secret(SecretReadSpec { id: secret_id }),
            options,
            ResourceOutputs::Secret { data: resolver },
        )?;
        Ok(SecretHandle { id, data: output })
    }

    /// Submit a release
    pub fn release(&mut self, spec: ReleaseSpec, options: ResourceOptions) -> Result<ReleaseHandle> {
        let id = ResourceId::new(ResourceType::Release, spec.name());
        let (output, resolver) = Output::pending(id.clone());
        self.register(
            id.clone(),
            ResourceKind::Release(Box::new(spec)),
            options,
            ResourceOutputs::Release { status: resolver },
        )?;
        Ok(ReleaseHandle { id, status: output })
    }

    /// Declare a group of manifests applied as independent objects
    pub fn config_group(
        &mut self,
        name: &str,
        spec: ConfigGroupSpec,
        options: ResourceOptions,
    ) -> Result<ConfigGroupHandle> {
        let id = ResourceId::new(ResourceType::ConfigGroup, name);
        self.register(id.clone(), ResourceKind::ConfigGroup(spec), options, ResourceOutputs::None)?;
        Ok(ConfigGroupHandle { id })
    }

    fn register(
        &mut self,
        id: ResourceId,
        kind: ResourceKind,
        options: ResourceOptions,
        outputs: ResourceOutputs,
    ) -> Result<()> {
        if self.index.contains_key(&id) {
            return Err(CoreError::DuplicateResource {
                resource: id.to_string(),
            });
        }

        let mut dependencies = kind.input_dependencies();
        dependencies.extend(options.depends_on.iter().cloned());
        dependencies.extend(options.provider.iter().cloned());

        if let Some(unknown) = dependencies.iter().find(|d| !self.index.contains_key(*d)) {
            return Err(CoreError::UnknownDependency {
                resource: id.to_string(),
                dependency: unknown.to_string(),
            });
        }

        tracing::debug!(
            resource = %id,
            dependencies = dependencies.len(),
            "declared resource"
        );

        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(Resource {
            id,
            kind,
            options,
            dependencies,
            outputs,
        });
        Ok(())
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether `resource` directly depends on `dependency`
    pub fn depends_on(&self, resource: &ResourceId, dependency: &ResourceId) -> bool {
        self.get(resource)
            .is_some_and(|r| r.dependencies.contains(dependency))
    }

    /// Execution wave of every resource, in declaration order
    pub fn wave_numbers(&self) -> Vec<usize> {
        let mut waves: Vec<usize> = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let wave = resource
                .dependencies
                .iter()
                .filter_map(|d| self.index.get(d))
                .map(|&i| waves[i] + 1)
                .max()
                .unwrap_or(0);
            waves.push(wave);
        }
        waves
    }

    /// Identifiers grouped by execution wave
    pub fn waves(&self) -> Vec<Vec<ResourceId>> {
        let mut grouped: BTreeMap<usize, Vec<ResourceId>> = BTreeMap::new();
        for (resource, wave) in self.resources.iter().zip(self.wave_numbers()) {
            grouped.entry(wave).or_default().push(resource.id.clone());
        }
        grouped.into_values().collect()
    }

    /// Consume the plan into its execution waves
    pub fn into_waves(self) -> Vec<Vec<Resource>> {
        let numbers = self.wave_numbers();
        let mut grouped: BTreeMap<usize, Vec<Resource>> = BTreeMap::new();
        for (resource, wave) in self.resources.into_iter().zip(numbers) {
            grouped.entry(wave).or_default().push(resource);
        }
        grouped.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_namespace() -> (Plan, ProviderHandle, NamespaceHandle) {
        let mut plan = Plan::new();
        let provider = plan
            .provider("cluster", Output::known("apiVersion: v1".to_string()))
            .unwrap();
        let ns = plan
            .namespace(
                "prometheus",
                NamespaceSpec {
                    name: "prometheus".to_string(),
                },
                ResourceOptions::new().provider(&provider),
            )
            .unwrap();
        (plan, provider, ns)
    }

    #[test]
    fn test_resource_id_display() {
        let id = ResourceId::new(ResourceType::Release, "statsd");
        assert_eq!(id.to_string(), "kubernetes:helm.sh/v3:Release::statsd");
    }

    #[test]
    fn test_duplicate_rejected() {
        let (mut plan, provider, _) = plan_with_namespace();
        let err = plan
            .namespace(
                "prometheus",
                NamespaceSpec {
                    name: "other".to_string(),
                },
                ResourceOptions::new().provider(&provider),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateResource { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut plan = Plan::new();
        let ghost = ResourceId::new(ResourceType::Namespace, "ghost");
        let err = plan
            .config_group(
                "servicemon",
                ConfigGroupSpec::new(vec!["*.yaml".to_string()]),
                ResourceOptions::new().depends_on(&ghost),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownDependency { .. }));
    }

    #[test]
    fn test_output_inputs_become_edges() {
        let (mut plan, provider, ns) = plan_with_namespace();
        let spec = ReleaseSpec::builder("prometheus", "kube-prometheus-stack")
            .namespace(ns.name.clone())
            .build()
            .unwrap();
        // No explicit depends_on: the namespace edge comes from the output.
        let release = plan
            .release(spec, ResourceOptions::new().provider(&provider))
            .unwrap();

        assert!(plan.depends_on(&release.id, &ns.id));
        assert!(plan.depends_on(&release.id, &provider.id));
    }

    #[test]
    fn test_waves_follow_dependencies() {
        let (mut plan, provider, ns) = plan_with_namespace();
        let spec = ReleaseSpec::builder("prometheus", "kube-prometheus-stack")
            .namespace(ns.name.clone())
            .build()
            .unwrap();
        let release = plan
            .release(spec, ResourceOptions::new().provider(&provider).depends_on(&ns.id))
            .unwrap();
        let group = plan
            .config_group(
                "servicemon",
                ConfigGroupSpec::new(vec!["manifests/*.yaml".to_string()]),
                ResourceOptions::new()
                    .provider(&provider)
                    .depends_on(&ns.id)
                    .depends_on(&release.id),
            )
            .unwrap();

        let waves = plan.waves();
        assert_eq!(waves.len(), 4);
        assert_eq!(waves[0], vec![provider.id.clone()]);
        assert_eq!(waves[1], vec![ns.id.clone()]);
        assert_eq!(waves[2], vec![release.id.clone()]);
        assert_eq!(waves[3], vec![group.id.clone()]);

        let executed = plan.into_waves();
        assert_eq!(executed.iter().map(Vec::len).sum::<usize>(), 4);
    }

    #[test]
    fn test_independent_resources_share_a_wave() {
        let (mut plan, provider, ns) = plan_with_namespace();
        let secret = plan
            .get_secret(
                "pulumi-secret-prometheus",
                Output::known("prometheus/grafana".to_string()),
                ResourceOptions::new().provider(&provider),
            )
            .unwrap();

        let numbers = plan.wave_numbers();
        let ns_index = plan.resources().iter().position(|r| r.id == ns.id).unwrap();
        let secret_index = plan.resources().iter().position(|r| r.id == secret.id).unwrap();
        assert_eq!(numbers[ns_index], numbers[secret_index]);
    }
}
