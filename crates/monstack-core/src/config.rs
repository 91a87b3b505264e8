//! Stack configuration
//!
//! Configuration lives next to the project descriptor in `Pulumi.<stack>.yaml`:
//!
//! ```yaml
//! config:
//!   prometheus:chart_version: 39.2.1
//!   prometheus:helm_timeout: 900
//! ```
//!
//! Keys are namespaced (`<namespace>:<key>`). Lookups go through a
//! [`ConfigNamespace`] view; absent keys are not an error, callers apply their
//! own defaults. [`MonitoringConfig`] is the resolved, defaulted form that the
//! release builders take as input.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::release::RepositoryOpts;

/// Namespace holding every key this program reads
pub const CONFIG_NAMESPACE: &str = "prometheus";

pub const KEY_CHART_NAME: &str = "chart_name";
pub const KEY_CHART_VERSION: &str = "chart_version";
pub const KEY_HELM_REPO_NAME: &str = "prometheus_helm_repo_name";
pub const KEY_HELM_REPO_URL: &str = "prometheus_helm_repo_url";
pub const KEY_HELM_TIMEOUT: &str = "helm_timeout";
pub const KEY_STATSD_CHART_NAME: &str = "statsd_chart_name";
pub const KEY_STATSD_CHART_VERSION: &str = "statsd_chart_version";

pub const DEFAULT_CHART_NAME: &str = "kube-prometheus-stack";
pub const DEFAULT_CHART_VERSION: &str = "39.2.1";
pub const DEFAULT_HELM_REPO_NAME: &str = "prometheus-community";
pub const DEFAULT_HELM_REPO_URL: &str = "https://prometheus-community.github.io/helm-charts";
pub const DEFAULT_HELM_TIMEOUT: i64 = 600;
pub const DEFAULT_STATSD_CHART_NAME: &str = "prometheus-statsd-exporter";
pub const DEFAULT_STATSD_CHART_VERSION: &str = "0.5.0";

#[derive(Debug, Default, Deserialize)]
struct StackConfigFile {
    #[serde(default)]
    config: BTreeMap<String, JsonValue>,
}

/// All configuration of one stack, keyed by `<namespace>:<key>`
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    entries: BTreeMap<String, JsonValue>,
}

impl StackConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `Pulumi.<stack>.yaml` from a project directory
    ///
    /// A stack without a config file has an empty configuration.
    pub fn load(project_dir: &Path, stack: &str) -> Result<Self> {
        let path = project_dir.join(format!("Pulumi.{}.yaml", stack));
        if !path.exists() {
            tracing::debug!("no stack config at {}", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content)
    }

    /// Parse a stack config document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: Option<StackConfigFile> = serde_yaml::from_str(yaml)?;
        Ok(Self {
            entries: file.unwrap_or_default().config,
        })
    }

    /// Set a fully qualified key
    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        self.entries.insert(key.into(), value);
    }

    /// Apply `key=value` overrides; keys without a namespace land in
    /// `default_namespace`
    pub fn apply_overrides(&mut self, overrides: &[String], default_namespace: &str) -> Result<()> {
        for (key, value) in parse_config_overrides(overrides)? {
            let key = if key.contains(':') {
                key
            } else {
                format!("{}:{}", default_namespace, key)
            };
            self.set(key, value);
        }
        Ok(())
    }

    /// A view scoped to one namespace
    pub fn namespace(&self, namespace: &str) -> ConfigNamespace<'_> {
        ConfigNamespace {
            config: self,
            namespace: namespace.to_string(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Namespace-scoped read access to a [`StackConfig`]
#[derive(Debug, Clone)]
pub struct ConfigNamespace<'a> {
    config: &'a StackConfig,
    namespace: String,
}

impl ConfigNamespace<'_> {
    fn raw(&self, key: &str) -> Option<&JsonValue> {
        self.config
            .entries
            .get(&format!("{}:{}", self.namespace, key))
    }

    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// Read a string value
    ///
    /// Booleans and integers are read as their text. A YAML float has already
    /// lost its original spelling (`1.10` parses as `1.1`), so it is rejected
    /// and must be quoted instead.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.raw(key) else {
            return Ok(None);
        };
        match raw {
            JsonValue::Null => Ok(None),
            JsonValue::String(s) => Ok(Some(s.clone())),
            JsonValue::Number(n) if n.is_f64() => Err(CoreError::ConfigType {
                key: format!("{}:{}", self.namespace, key),
                expected: "quoted string",
                value: raw.to_string(),
            }),
            other => Ok(Some(other.to_string())),
        }
    }

    /// Read an integer value; a value that is present but not an integer is
    /// a configuration error
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        let Some(raw) = self.raw(key) else {
            return Ok(None);
        };
        let parsed = match raw {
            JsonValue::Null => return Ok(None),
            JsonValue::String(s) if s.trim().is_empty() => return Ok(None),
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.map(Some).ok_or_else(|| CoreError::ConfigType {
            key: format!("{}:{}", self.namespace, key),
            expected: "integer",
            value: raw.to_string(),
        })
    }
}

/// Parse `--config` arguments (key=value format)
pub fn parse_config_overrides(args: &[String]) -> Result<Vec<(String, JsonValue)>> {
    args.iter()
        .map(|arg| {
            let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::InvalidConfig {
                message: format!("Invalid --config format: '{}'. Expected key=value", arg),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CoreError::InvalidConfig {
                    message: format!("Invalid --config format: '{}'. Key is empty", arg),
                });
            }

            let value = if val == "true" {
                JsonValue::Bool(true)
            } else if val == "false" {
                JsonValue::Bool(false)
            } else if let Ok(num) = val.parse::<i64>() {
                JsonValue::Number(num.into())
            } else {
                JsonValue::String(val.to_string())
            };
            Ok((key.to_string(), value))
        })
        .collect()
}

/// Chart coordinates of one workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSettings {
    pub chart_name: String,
    pub chart_version: String,
}

/// Where a resolved setting came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSetting {
    pub key: &'static str,
    pub value: String,
    pub defaulted: bool,
}

/// Defaulted configuration for the monitoring releases
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub prometheus: ChartSettings,
    pub statsd: ChartSettings,
    pub repository: RepositoryOpts,
    pub helm_timeout: Duration,
    settings: Vec<ResolvedSetting>,
}

impl MonitoringConfig {
    /// Resolve every key, substituting defaults for absent ones
    ///
    /// Empty strings and a zero timeout count as absent.
    pub fn resolve(config: &ConfigNamespace<'_>) -> Result<Self> {
        let mut settings = Vec::with_capacity(7);
        let mut string = |key: &'static str, default: &str| -> Result<String> {
            let found = config.get(key)?.filter(|v| !v.is_empty());
            let defaulted = found.is_none();
            let value = found.unwrap_or_else(|| default.to_string());
            settings.push(ResolvedSetting {
                key,
                value: value.clone(),
                defaulted,
            });
            Ok(value)
        };

        let chart_name = string(KEY_CHART_NAME, DEFAULT_CHART_NAME)?;
        let chart_version = string(KEY_CHART_VERSION, DEFAULT_CHART_VERSION)?;
        let repo_name = string(KEY_HELM_REPO_NAME, DEFAULT_HELM_REPO_NAME)?;
        let repo_url = string(KEY_HELM_REPO_URL, DEFAULT_HELM_REPO_URL)?;
        let statsd_chart_name = string(KEY_STATSD_CHART_NAME, DEFAULT_STATSD_CHART_NAME)?;
        let statsd_chart_version = string(KEY_STATSD_CHART_VERSION, DEFAULT_STATSD_CHART_VERSION)?;

        let timeout = config.get_int(KEY_HELM_TIMEOUT)?.filter(|t| *t != 0);
        if let Some(t) = timeout.filter(|t| *t < 0) {
            return Err(CoreError::ConfigType {
                key: format!("{}:{}", config.name(), KEY_HELM_TIMEOUT),
                expected: "positive integer",
                value: t.to_string(),
            });
        }
        let helm_timeout = timeout.unwrap_or(DEFAULT_HELM_TIMEOUT);
        settings.push(ResolvedSetting {
            key: KEY_HELM_TIMEOUT,
            value: helm_timeout.to_string(),
            defaulted: timeout.is_none(),
        });

        Ok(Self {
            prometheus: ChartSettings {
                chart_name,
                chart_version,
            },
            statsd: ChartSettings {
                chart_name: statsd_chart_name,
                chart_version: statsd_chart_version,
            },
            repository: RepositoryOpts::new(repo_url).with_name(repo_name),
            helm_timeout: Duration::from_secs(helm_timeout as u64),
            settings,
        })
    }

    /// Every setting with its resolved value, in lookup order
    pub fn settings(&self) -> &[ResolvedSetting] {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(yaml: &str) -> MonitoringConfig {
        let config = StackConfig::from_yaml(yaml).unwrap();
        MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap()
    }

    #[test]
    fn test_absent_keys_use_defaults() {
        let config = resolve("config: {}");

        assert_eq!(config.prometheus.chart_name, "kube-prometheus-stack");
        assert_eq!(config.prometheus.chart_version, "39.2.1");
        assert_eq!(config.repository.name.as_deref(), Some("prometheus-community"));
        assert_eq!(
            config.repository.url,
            "https://prometheus-community.github.io/helm-charts"
        );
        assert_eq!(config.helm_timeout, Duration::from_secs(600));
        assert_eq!(config.statsd.chart_name, "prometheus-statsd-exporter");
        assert_eq!(config.statsd.chart_version, "0.5.0");
        assert!(config.settings().iter().all(|s| s.defaulted));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StackConfig::from_yaml("").unwrap();
        assert!(config.is_empty());
        let resolved = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap();
        assert_eq!(resolved.prometheus.chart_version, DEFAULT_CHART_VERSION);
    }

    #[test]
    fn test_present_keys_override_defaults() {
        let config = resolve(
            r#"
config:
  prometheus:chart_name: my-stack
  prometheus:chart_version: 45.0.0
  prometheus:prometheus_helm_repo_url: https://charts.example.com
  prometheus:helm_timeout: 900
  prometheus:statsd_chart_version: "0.6.1"
"#,
        );

        assert_eq!(config.prometheus.chart_name, "my-stack");
        assert_eq!(config.prometheus.chart_version, "45.0.0");
        assert_eq!(config.repository.url, "https://charts.example.com");
        assert_eq!(config.helm_timeout, Duration::from_secs(900));
        assert_eq!(config.statsd.chart_version, "0.6.1");
        // Untouched keys still default
        assert_eq!(config.statsd.chart_name, DEFAULT_STATSD_CHART_NAME);

        let version = config
            .settings()
            .iter()
            .find(|s| s.key == KEY_CHART_VERSION)
            .unwrap();
        assert!(!version.defaulted);
    }

    #[test]
    fn test_other_namespace_ignored() {
        let config = resolve(
            r#"
config:
  grafana:chart_version: 1.0.0
"#,
        );
        assert_eq!(config.prometheus.chart_version, DEFAULT_CHART_VERSION);
    }

    #[test]
    fn test_empty_string_and_zero_timeout_count_as_absent() {
        let config = resolve(
            r#"
config:
  prometheus:chart_name: ""
  prometheus:helm_timeout: 0
"#,
        );
        assert_eq!(config.prometheus.chart_name, DEFAULT_CHART_NAME);
        assert_eq!(config.helm_timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_get_int_accepts_numeric_string() {
        let config = StackConfig::from_yaml("config:\n  prometheus:helm_timeout: \"120\"\n").unwrap();
        let ns = config.namespace(CONFIG_NAMESPACE);
        assert_eq!(ns.get_int(KEY_HELM_TIMEOUT).unwrap(), Some(120));
    }

    #[test]
    fn test_get_int_rejects_non_integer() {
        let config = StackConfig::from_yaml("config:\n  prometheus:helm_timeout: soon\n").unwrap();
        let err = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap_err();
        assert!(matches!(err, CoreError::ConfigType { .. }));
    }

    #[test]
    fn test_get_stringifies_scalars() {
        let config = StackConfig::from_yaml("config:\n  prometheus:flag: true\n  prometheus:n: 3\n").unwrap();
        let ns = config.namespace(CONFIG_NAMESPACE);
        assert_eq!(ns.get("flag").unwrap().as_deref(), Some("true"));
        assert_eq!(ns.get("n").unwrap().as_deref(), Some("3"));
        assert_eq!(ns.get("absent").unwrap(), None);
    }

    #[test]
    fn test_unquoted_float_version_is_rejected() {
        let config =
            StackConfig::from_yaml("config:\n  prometheus:statsd_chart_version: 1.10\n").unwrap();
        let err = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap_err();
        match err {
            CoreError::ConfigType { key, expected, .. } => {
                assert_eq!(key, "prometheus:statsd_chart_version");
                assert_eq!(expected, "quoted string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_quoted_version_keeps_its_spelling() {
        let config =
            StackConfig::from_yaml("config:\n  prometheus:statsd_chart_version: \"1.10\"\n")
                .unwrap();
        let resolved = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap();
        assert_eq!(resolved.statsd.chart_version, "1.10");
    }

    #[test]
    fn test_overrides_default_namespace() {
        let mut config = StackConfig::new();
        config
            .apply_overrides(
                &[
                    "chart_version=40.1.0".to_string(),
                    "prometheus:helm_timeout=300".to_string(),
                ],
                CONFIG_NAMESPACE,
            )
            .unwrap();

        let resolved = MonitoringConfig::resolve(&config.namespace(CONFIG_NAMESPACE)).unwrap();
        assert_eq!(resolved.prometheus.chart_version, "40.1.0");
        assert_eq!(resolved.helm_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_overrides_rejects_missing_equals() {
        assert!(parse_config_overrides(&["chart_version".to_string()]).is_err());
        assert!(parse_config_overrides(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = StackConfig::load(dir.path(), "dev").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_load_stack_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Pulumi.prod.yaml"),
            "config:\n  prometheus:chart_version: 41.0.0\n",
        )
        .unwrap();
        let config = StackConfig::load(dir.path(), "prod").unwrap();
        assert_eq!(
            config.namespace(CONFIG_NAMESPACE).get(KEY_CHART_VERSION).unwrap().as_deref(),
            Some("41.0.0")
        );
    }
}
