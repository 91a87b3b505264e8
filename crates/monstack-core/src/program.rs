//! The monitoring stack program
//!
//! [`declare`] builds the whole desired state without touching the cluster:
//!
//! 1. cross-stack references to the kubeconfig and secrets stacks
//! 2. a cluster provider and the `prometheus` namespace
//! 3. a read of the Secret holding the Grafana admin password
//! 4. the Prometheus stack release, then the ServiceMonitor manifests and the
//!    statsd exporter release, both after it
//! 5. the exported outputs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::charts::{self, NAMESPACE};
use crate::config::{CONFIG_NAMESPACE, MonitoringConfig, StackConfig};
use crate::error::{CoreError, Result};
use crate::exports::{self, Exports};
use crate::manifests::ConfigGroupSpec;
use crate::output::Output;
use crate::plan::{CustomTimeouts, NamespaceSpec, Plan, ResourceOptions};
use crate::secret::{Secret, extract_admin_password};
use crate::stack::{StackBackend, StackRef, StackReference, project_name_from_dir};

pub const PROVIDER_NAME: &str = "ingress-controller";
pub const SECRET_RESOURCE_NAME: &str = "pulumi-secret-prometheus";
pub const SERVICE_MONITOR_GROUP: &str = "servicemon";

/// Glob of the ServiceMonitor manifests, relative to the project directory
pub const SERVICE_MONITOR_MANIFESTS: &str = "manifests/*.yaml";

/// Output of the kubeconfig stack holding the cluster credentials
pub const KUBECONFIG_OUTPUT: &str = "kubeconfig";
/// Output of the secrets stack mapping workloads to Secret identifiers
pub const SECRETS_OUTPUT: &str = "pulumi_secrets";
/// Entry of [`SECRETS_OUTPUT`] for this workload
pub const SECRETS_WORKLOAD: &str = "prometheus";

/// Create timeout of resources that wait on the Prometheus stack
pub const DEPENDENT_CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Everything a run needs to know about where it is
#[derive(Clone)]
pub struct ProgramContext {
    pub project_dir: PathBuf,
    pub owner: String,
    pub stack: String,
    pub config: StackConfig,
    pub backend: Arc<dyn StackBackend>,
}

impl ProgramContext {
    /// Descriptor directory of the kubeconfig project
    pub fn kubeconfig_project_dir(&self) -> PathBuf {
        self.project_dir
            .join("..")
            .join("..")
            .join("infrastructure")
            .join("kubeconfig")
    }

    /// Descriptor directory of the secrets project
    pub fn secrets_project_dir(&self) -> PathBuf {
        self.project_dir.join("..").join("secrets")
    }

    fn stack_ref(&self, project_dir: &Path) -> Result<StackRef> {
        let project = project_name_from_dir(project_dir)?;
        Ok(StackRef::new(&self.owner, project, &self.stack))
    }
}

/// A declared program
#[derive(Debug)]
pub struct Program {
    pub plan: Plan,
    pub exports: Exports,
    pub config: MonitoringConfig,
}

/// Declare the monitoring stack
pub fn declare(ctx: &ProgramContext) -> Result<Program> {
    let config = MonitoringConfig::resolve(&ctx.config.namespace(CONFIG_NAMESPACE))?;

    let kube_stack = StackReference::new(
        ctx.stack_ref(&ctx.kubeconfig_project_dir())?,
        ctx.backend.clone(),
    );
    let secrets_stack = StackReference::new(
        ctx.stack_ref(&ctx.secrets_project_dir())?,
        ctx.backend.clone(),
    );

    let kubeconfig = kube_stack.require_string_output(KUBECONFIG_OUTPUT);
    let secret_id = workload_secret_id(&secrets_stack, SECRETS_WORKLOAD);

    let mut plan = Plan::new();

    let provider = plan.provider(PROVIDER_NAME, kubeconfig)?;
    let namespace = plan.namespace(
        NAMESPACE,
        NamespaceSpec {
            name: NAMESPACE.to_string(),
        },
        ResourceOptions::new().provider(&provider),
    )?;

    let secret = plan.get_secret(
        SECRET_RESOURCE_NAME,
        secret_id,
        ResourceOptions::new().provider(&provider),
    )?;
    let admin_password: Output<Secret<String>> = secret
        .data
        .clone()
        .unsecret()
        .try_apply(|data| extract_admin_password(&data));

    let prometheus = plan.release(
        charts::prometheus_release(&config, namespace.name.clone(), admin_password)?,
        ResourceOptions::new()
            .provider(&provider)
            .depends_on(&namespace.id),
    )?;

    let after_prometheus = ResourceOptions::new()
        .provider(&provider)
        .depends_on(&namespace.id)
        .depends_on(&prometheus.id)
        .custom_timeouts(CustomTimeouts::create(DEPENDENT_CREATE_TIMEOUT));

    plan.config_group(
        SERVICE_MONITOR_GROUP,
        ConfigGroupSpec::new(vec![SERVICE_MONITOR_MANIFESTS.to_string()])
            .with_base_dir(&ctx.project_dir),
        after_prometheus.clone(),
    )?;

    let statsd = plan.release(
        charts::statsd_release(&config, namespace.name.clone())?,
        after_prometheus,
    )?;

    let mut exports = Exports::new();
    exports.export(exports::PROM_STATUS, prometheus.status.clone());
    exports.export(exports::STATSD_STATUS, statsd.status.clone());
    exports.export(
        exports::PROM_HOSTNAME,
        exports::service_hostname(prometheus.name(), NAMESPACE),
    );

    tracing::debug!(resources = plan.len(), exports = exports.len(), "declared program");

    Ok(Program {
        plan,
        exports,
        config,
    })
}

/// Secret identifier of `workload` out of the secrets stack
fn workload_secret_id(secrets: &StackReference, workload: &str) -> Output<String> {
    let stack = secrets.stack().to_string();
    let workload = workload.to_string();
    secrets
        .require_output(SECRETS_OUTPUT)
        .try_apply(move |value| match value.get(&workload) {
            Some(JsonValue::String(id)) => Ok(id.clone()),
            Some(_) => Err(CoreError::OutputShape {
                stack,
                key: format!("{}.{}", SECRETS_OUTPUT, workload),
                message: "expected a Secret identifier string".to_string(),
            }),
            None => Err(CoreError::MissingOutput {
                stack,
                key: format!("{}.{}", SECRETS_OUTPUT, workload),
            }),
        })
}
