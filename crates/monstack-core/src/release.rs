//! Release declarations and status
//!
//! A [`ReleaseSpec`] is an immutable request to install or upgrade a chart.
//! Its namespace and parts of its values tree may be deferred; the engine
//! resolves them into a [`ResolvedRelease`] right before submitting it.

use std::collections::BTreeSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::output::Output;
use crate::plan::ResourceId;
use crate::values::{DeferredValues, ResolvedValues};

/// Default timeout handed to Helm (10 minutes)
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(600);

/// Helm rejects release names longer than this
pub const MAX_RELEASE_NAME_LEN: usize = 53;

static RELEASE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

/// Chart repository options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOpts {
    /// Local alias for the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Repository URL
    pub url: String,
}

impl RepositoryOpts {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: None,
            url: url.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Behaviour requested of the engine when submitting a release
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseFlags {
    /// Don't wait for resources to become ready
    pub skip_await: bool,
    /// Delete newly created resources if the release fails
    pub cleanup_on_fail: bool,
    /// Lint the chart before installing
    pub lint: bool,
    /// Force resource updates through replacement
    pub force_update: bool,
}

/// An immutable release request
#[derive(Debug, Clone)]
pub struct ReleaseSpec {
    name: String,
    chart: String,
    version: String,
    repository: Option<RepositoryOpts>,
    namespace: Output<String>,
    values: DeferredValues,
    timeout: Duration,
    flags: ReleaseFlags,
}

impl ReleaseSpec {
    /// Start building a release of `chart` named `name`
    pub fn builder(name: impl Into<String>, chart: impl Into<String>) -> ReleaseSpecBuilder {
        ReleaseSpecBuilder {
            name: name.into(),
            chart: chart.into(),
            version: None,
            repository: None,
            namespace: None,
            values: DeferredValues::default(),
            timeout: DEFAULT_RELEASE_TIMEOUT,
            flags: ReleaseFlags::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chart(&self) -> &str {
        &self.chart
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn repository(&self) -> Option<&RepositoryOpts> {
        self.repository.as_ref()
    }

    pub fn namespace(&self) -> &Output<String> {
        &self.namespace
    }

    pub fn values(&self) -> &DeferredValues {
        &self.values
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn flags(&self) -> ReleaseFlags {
        self.flags
    }

    /// Resources that deferred inputs of this release come from
    pub fn input_dependencies(&self) -> BTreeSet<ResourceId> {
        let mut deps = self.namespace.dependencies().clone();
        deps.extend(self.values.dependencies());
        deps
    }

    /// Force every deferred input
    pub async fn resolve(&self) -> Result<ResolvedRelease> {
        let namespace = self.namespace.clone().value().await?;
        let values = self.values.resolve().await?;
        Ok(ResolvedRelease {
            name: self.name.clone(),
            chart: self.chart.clone(),
            version: self.version.clone(),
            repository: self.repository.clone(),
            namespace,
            values,
            timeout: self.timeout,
            flags: self.flags,
        })
    }
}

/// Builder for [`ReleaseSpec`]
pub struct ReleaseSpecBuilder {
    name: String,
    chart: String,
    version: Option<String>,
    repository: Option<RepositoryOpts>,
    namespace: Option<Output<String>>,
    values: DeferredValues,
    timeout: Duration,
    flags: ReleaseFlags,
}

impl ReleaseSpecBuilder {
    /// Chart version; a semver version or version requirement
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn repository(mut self, repository: RepositoryOpts) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Target namespace; usually the name output of a declared namespace
    pub fn namespace(mut self, namespace: impl Into<Output<String>>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn values(mut self, values: impl Into<DeferredValues>) -> Self {
        self.values = values.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn flags(mut self, flags: ReleaseFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn skip_await(mut self, skip: bool) -> Self {
        self.flags.skip_await = skip;
        self
    }

    pub fn cleanup_on_fail(mut self, cleanup: bool) -> Self {
        self.flags.cleanup_on_fail = cleanup;
        self
    }

    pub fn lint(mut self, lint: bool) -> Self {
        self.flags.lint = lint;
        self
    }

    pub fn force_update(mut self, force: bool) -> Self {
        self.flags.force_update = force;
        self
    }

    /// Validate and freeze the release
    pub fn build(self) -> Result<ReleaseSpec> {
        validate_release_name(&self.name)?;

        if self.chart.trim().is_empty() {
            return Err(CoreError::InvalidRelease {
                message: format!("release '{}' has no chart", self.name),
            });
        }

        let version = self.version.unwrap_or_default();
        if !version.is_empty() {
            validate_chart_version(&version)?;
        }

        let namespace = self.namespace.ok_or_else(|| CoreError::InvalidRelease {
            message: format!("release '{}' has no namespace", self.name),
        })?;

        if self.timeout.is_zero() {
            return Err(CoreError::InvalidRelease {
                message: format!("release '{}' has a zero timeout", self.name),
            });
        }

        Ok(ReleaseSpec {
            name: self.name,
            chart: self.chart,
            version,
            repository: self.repository,
            namespace,
            values: self.values,
            timeout: self.timeout,
            flags: self.flags,
        })
    }
}

/// Check a release name against Helm's naming rules
pub fn validate_release_name(name: &str) -> Result<()> {
    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(CoreError::InvalidRelease {
            message: format!(
                "release name '{}' is longer than {} characters",
                name, MAX_RELEASE_NAME_LEN
            ),
        });
    }
    if !RELEASE_NAME.is_match(name) {
        return Err(CoreError::InvalidRelease {
            message: format!(
                "release name '{}' must consist of lowercase alphanumerics or '-', \
                 and start and end with an alphanumeric",
                name
            ),
        });
    }
    Ok(())
}

/// Accept exact versions (`39.2.1`) and constraints (`^39.0`, `>=0.5, <1`)
pub fn validate_chart_version(version: &str) -> Result<()> {
    let trimmed = version.trim_start_matches('v');
    if semver::Version::parse(trimmed).is_ok() || semver::VersionReq::parse(version).is_ok() {
        Ok(())
    } else {
        Err(CoreError::InvalidChartVersion {
            version: version.to_string(),
        })
    }
}

/// A release with every input concrete
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelease {
    pub name: String,
    pub chart: String,
    pub version: String,
    pub repository: Option<RepositoryOpts>,
    pub namespace: String,
    pub values: ResolvedValues,
    pub timeout: Duration,
    pub flags: ReleaseFlags,
}

/// Helm release state
///
/// Note: This enum is non-exhaustive - new variants may be added in future versions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseState {
    #[default]
    Unknown,
    Deployed,
    Uninstalled,
    Superseded,
    Failed,
    Uninstalling,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl ReleaseState {
    /// Parse Helm's status string; unrecognised values map to `Unknown`
    pub fn parse(status: &str) -> Self {
        match status {
            "deployed" => Self::Deployed,
            "uninstalled" => Self::Uninstalled,
            "superseded" => Self::Superseded,
            "failed" => Self::Failed,
            "uninstalling" => Self::Uninstalling,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "pending-rollback" => Self::PendingRollback,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Deployed => "deployed",
            Self::Uninstalled => "uninstalled",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
            Self::Uninstalling => "uninstalling",
            Self::PendingInstall => "pending-install",
            Self::PendingUpgrade => "pending-upgrade",
            Self::PendingRollback => "pending-rollback",
        };
        write!(f, "{}", s)
    }
}

/// Status of a realized release, as exported to other stacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseStatus {
    /// Release name
    pub name: String,
    /// Namespace the release lives in
    pub namespace: String,
    /// Revision number
    pub revision: u32,
    /// Helm state
    pub status: ReleaseState,
    /// Chart name
    pub chart: String,
    /// Chart version
    pub version: String,
    /// Application version reported by the chart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Handle to a submitted release
#[derive(Debug, Clone)]
pub struct ReleaseHandle {
    pub id: ResourceId,
    pub status: Output<ReleaseStatus>,
}

impl ReleaseHandle {
    /// Name of the release once realized
    pub fn name(&self) -> Output<String> {
        self.status.clone().apply(|status| status.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Values;
    use serde_json::json;

    fn namespace() -> Output<String> {
        Output::known("prometheus".to_string())
    }

    #[test]
    fn test_builder_defaults() {
        let spec = ReleaseSpec::builder("prometheus", "kube-prometheus-stack")
            .version("39.2.1")
            .namespace(namespace())
            .build()
            .unwrap();

        assert_eq!(spec.name(), "prometheus");
        assert_eq!(spec.timeout(), DEFAULT_RELEASE_TIMEOUT);
        assert_eq!(spec.flags(), ReleaseFlags::default());
        assert!(spec.repository().is_none());
    }

    #[test]
    fn test_builder_flags() {
        let spec = ReleaseSpec::builder("statsd", "prometheus-statsd-exporter")
            .namespace(namespace())
            .skip_await(false)
            .cleanup_on_fail(true)
            .lint(true)
            .force_update(true)
            .timeout(Duration::from_secs(900))
            .build()
            .unwrap();

        let flags = spec.flags();
        assert!(!flags.skip_await);
        assert!(flags.cleanup_on_fail && flags.lint && flags.force_update);
        assert_eq!(spec.timeout(), Duration::from_secs(900));
    }

    #[test]
    fn test_builder_requires_namespace() {
        let err = ReleaseSpec::builder("prometheus", "chart").build().unwrap_err();
        assert!(err.to_string().contains("no namespace"));
    }

    #[test]
    fn test_builder_rejects_bad_names() {
        let long = "a".repeat(54);
        for name in ["", "Prometheus", "-prom", "prom_", long.as_str()] {
            let result = ReleaseSpec::builder(name, "chart")
                .namespace(namespace())
                .build();
            assert!(result.is_err(), "expected '{}' to be rejected", name);
        }
    }

    #[test]
    fn test_builder_rejects_empty_chart_and_zero_timeout() {
        assert!(ReleaseSpec::builder("prom", " ").namespace(namespace()).build().is_err());
        assert!(
            ReleaseSpec::builder("prom", "chart")
                .namespace(namespace())
                .timeout(Duration::ZERO)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_chart_version_validation() {
        assert!(validate_chart_version("39.2.1").is_ok());
        assert!(validate_chart_version("v0.5.0").is_ok());
        assert!(validate_chart_version("^39.0").is_ok());
        assert!(validate_chart_version(">=0.5, <1").is_ok());
        assert!(validate_chart_version("latest-ish").is_err());
    }

    #[tokio::test]
    async fn test_resolve_concrete_release() {
        let spec = ReleaseSpec::builder("statsd", "prometheus-statsd-exporter")
            .version("0.5.0")
            .repository(RepositoryOpts::new("https://charts.example.com").with_name("example"))
            .namespace(namespace())
            .values(Values(json!({"serviceMonitor": {"enabled": true}})))
            .build()
            .unwrap();

        let resolved = spec.resolve().await.unwrap();
        assert_eq!(resolved.namespace, "prometheus");
        assert_eq!(resolved.version, "0.5.0");
        assert_eq!(
            resolved.values.values().get("serviceMonitor.enabled").unwrap(),
            true
        );
        assert_eq!(resolved.repository.unwrap().name.as_deref(), Some("example"));
    }

    #[test]
    fn test_release_state_parse_and_display() {
        assert_eq!(ReleaseState::parse("deployed"), ReleaseState::Deployed);
        assert_eq!(ReleaseState::parse("pending-upgrade").to_string(), "pending-upgrade");
        assert_eq!(ReleaseState::parse("bogus"), ReleaseState::Unknown);
    }

    #[test]
    fn test_release_status_serializes_camel_case() {
        let status = ReleaseStatus {
            name: "prometheus".to_string(),
            namespace: "prometheus".to_string(),
            revision: 2,
            status: ReleaseState::Deployed,
            chart: "kube-prometheus-stack".to_string(),
            version: "39.2.1".to_string(),
            app_version: Some("0.58.0".to_string()),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["appVersion"], "0.58.0");
        assert_eq!(json["status"], "deployed");
    }
}
