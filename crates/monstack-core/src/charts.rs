//! Chart values and release declarations for the monitoring workloads

use std::time::Duration;

use serde_json::json;

use crate::config::{ChartSettings, MonitoringConfig};
use crate::error::Result;
use crate::output::Output;
use crate::release::{ReleaseFlags, ReleaseSpec, RepositoryOpts};
use crate::secret::Secret;
use crate::values::{DeferredValues, Values};

/// Namespace every workload is installed into
pub const NAMESPACE: &str = "prometheus";

/// Release name of the Prometheus stack
pub const PROMETHEUS_RELEASE: &str = "prometheus";

/// Release name of the statsd exporter
pub const STATSD_RELEASE: &str = "statsd";

/// Service account shared by the stack's components
pub const SERVICE_ACCOUNT: &str = "prometheus";

/// Path of the Grafana admin password in the stack's values
pub const GRAFANA_ADMIN_PASSWORD: &str = "grafana.adminPassword";

const STORAGE_SIZE: &str = "5Gi";

/// Flags shared by both releases
pub const RELEASE_FLAGS: ReleaseFlags = ReleaseFlags {
    skip_await: false,
    cleanup_on_fail: true,
    lint: true,
    force_update: true,
};

fn volume_claim_template() -> serde_json::Value {
    json!({
        "spec": {
            "accessModes": ["ReadWriteOnce"],
            "resources": {"requests": {"storage": STORAGE_SIZE}}
        }
    })
}

fn service_account(create: bool) -> serde_json::Value {
    json!({"create": create, "name": SERVICE_ACCOUNT, "annotations": {}})
}

/// Values of the `kube-prometheus-stack` release
///
/// Everything is static except the Grafana admin password, which stays
/// deferred and secret until the release is submitted.
pub fn prometheus_stack_values(admin_password: Output<Secret<String>>) -> DeferredValues {
    let base = json!({
        "prometheus": {
            "serviceAccount": service_account(true),
            "prometheusSpec": {
                "podMonitorSelectorNilUsesHelmValues": false,
                "serviceMonitorSelectorNilUsesHelmValues": false,
                "serviceMonitorSelector": {},
                // Trailing space is part of the deployed key.
                "serviceMonitorNamespaceSelector ": {"matchLabels": {"prometheus": true}},
                "storageSpec": {"volumeClaimTemplate": volume_claim_template()}
            }
        },
        "grafana": {
            "serviceAccount": service_account(false),
            "persistence": {
                "enabled": true,
                "accessModes": ["ReadWriteOnce"],
                "size": STORAGE_SIZE
            }
        },
        "alertmanager": {
            "serviceAccount": service_account(false),
            "alertmanagerSpec": {
                "storage": {"volumeClaimTemplate": volume_claim_template()}
            }
        },
        "prometheusOperator": {
            "tls": {"enabled": false}
        }
    });

    DeferredValues::new(Values(base)).set_secret(GRAFANA_ADMIN_PASSWORD, admin_password)
}

/// Values of the statsd exporter release
///
/// The ServiceMonitor is always enabled and always lands in [`NAMESPACE`],
/// where the Prometheus stack selects it.
pub fn statsd_values() -> Values {
    Values(json!({
        "serviceMonitor": {
            "enabled": true,
            "namespace": NAMESPACE
        },
        "serviceAccount": {
            "create": true,
            "annotations": {},
            "name": ""
        }
    }))
}

fn release(
    name: &str,
    chart: &ChartSettings,
    repository: &RepositoryOpts,
    namespace: Output<String>,
    values: DeferredValues,
    timeout: Duration,
) -> Result<ReleaseSpec> {
    ReleaseSpec::builder(name, &chart.chart_name)
        .version(&chart.chart_version)
        .repository(repository.clone())
        .namespace(namespace)
        .values(values)
        .timeout(timeout)
        .flags(RELEASE_FLAGS)
        .build()
}

/// The Prometheus stack release
pub fn prometheus_release(
    config: &MonitoringConfig,
    namespace: Output<String>,
    admin_password: Output<Secret<String>>,
) -> Result<ReleaseSpec> {
    release(
        PROMETHEUS_RELEASE,
        &config.prometheus,
        &config.repository,
        namespace,
        prometheus_stack_values(admin_password),
        config.helm_timeout,
    )
}

/// The statsd exporter release
pub fn statsd_release(
    config: &MonitoringConfig,
    namespace: Output<String>,
) -> Result<ReleaseSpec> {
    release(
        STATSD_RELEASE,
        &config.statsd,
        &config.repository,
        namespace,
        statsd_values().into(),
        config.helm_timeout,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CONFIG_NAMESPACE, StackConfig};
    use crate::secret::REDACTED;

    fn config() -> MonitoringConfig {
        let config = StackConfig::new();
        MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap()
    }

    fn password() -> Output<Secret<String>> {
        Output::known(Secret::new("s3cret".to_string()))
    }

    #[test]
    fn test_statsd_values_enable_service_monitor() {
        let values = statsd_values();
        assert_eq!(values.get("serviceMonitor.enabled").unwrap(), true);
        assert_eq!(values.get("serviceMonitor.namespace").unwrap(), "prometheus");
        assert_eq!(values.get("serviceAccount.create").unwrap(), true);
        assert_eq!(values.get("serviceAccount.name").unwrap(), "");
    }

    #[test]
    fn test_prometheus_values_tree() {
        let values = prometheus_stack_values(password());
        let base = values.base();

        assert_eq!(
            base.get("prometheus.prometheusSpec.serviceMonitorSelectorNilUsesHelmValues")
                .unwrap(),
            false
        );
        let selector = &base.inner()["prometheus"]["prometheusSpec"]["serviceMonitorNamespaceSelector "];
        assert_eq!(selector["matchLabels"]["prometheus"], true);
        assert_eq!(base.get("grafana.serviceAccount.create").unwrap(), false);
        assert_eq!(base.get("grafana.persistence.size").unwrap(), "5Gi");
        assert_eq!(
            base.get("alertmanager.alertmanagerSpec.storage.volumeClaimTemplate.spec.resources.requests.storage")
                .unwrap(),
            "5Gi"
        );
        assert_eq!(base.get("prometheusOperator.tls.enabled").unwrap(), false);
        // The password is never part of the static tree
        assert!(base.get(GRAFANA_ADMIN_PASSWORD).is_none());
        assert_eq!(values.preview().get(GRAFANA_ADMIN_PASSWORD).unwrap(), REDACTED);
    }

    #[tokio::test]
    async fn test_prometheus_release_resolves_password() {
        let spec = prometheus_release(
            &config(),
            Output::known("prometheus".to_string()),
            password(),
        )
        .unwrap();

        assert_eq!(spec.chart(), "kube-prometheus-stack");
        assert_eq!(spec.version(), "39.2.1");
        assert_eq!(spec.flags(), RELEASE_FLAGS);
        assert_eq!(spec.timeout(), Duration::from_secs(600));

        let resolved = spec.resolve().await.unwrap();
        assert_eq!(
            resolved.values.values().get(GRAFANA_ADMIN_PASSWORD).unwrap(),
            "s3cret"
        );
        assert_eq!(resolved.values.secret_paths(), [GRAFANA_ADMIN_PASSWORD.to_string()]);
    }

    #[test]
    fn test_statsd_release_uses_statsd_chart() {
        let spec = statsd_release(&config(), Output::known("prometheus".to_string())).unwrap();
        assert_eq!(spec.name(), STATSD_RELEASE);
        assert_eq!(spec.chart(), "prometheus-statsd-exporter");
        assert_eq!(spec.version(), "0.5.0");
        assert_eq!(
            spec.repository().and_then(|r| r.name.as_deref()),
            Some("prometheus-community")
        );
    }
}
