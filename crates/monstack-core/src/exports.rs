//! Stack outputs published for other programs

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::output::Output;
use crate::secret::REDACTED;

/// Export holding the Prometheus release status
pub const PROM_STATUS: &str = "prom_status";
/// Export holding the statsd release status
pub const STATSD_STATUS: &str = "statsd_status";
/// Export holding the in-cluster Prometheus server hostname
pub const PROM_HOSTNAME: &str = "prom_hostname";

/// Suffix appended to a release name to form its in-cluster hostname
pub fn server_hostname_suffix(namespace: &str) -> String {
    format!("-prometheus-server.{}.svc.cluster.local", namespace)
}

/// In-cluster DNS name of the Prometheus server of a release
///
/// The hostname is published as plain text even when the release name is
/// secret-flagged.
pub fn service_hostname(release_name: Output<String>, namespace: &str) -> Output<String> {
    release_name
        .concat(server_hostname_suffix(namespace))
        .unsecret()
}

/// Named outputs of this program, in export order
#[derive(Debug, Clone, Default)]
pub struct Exports {
    entries: Vec<(String, Output<JsonValue>)>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `output` under `name`; a later export replaces an earlier one
    pub fn export<T>(&mut self, name: impl Into<String>, output: Output<T>)
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let name = name.into();
        let json = output.try_apply(|value| serde_json::to_value(value).map_err(CoreError::from));
        self.entries.retain(|(existing, _)| *existing != name);
        self.entries.push((name, json));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Output<JsonValue>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, output)| output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exports as far as they are known without forcing anything
    pub fn preview(&self) -> Vec<(String, JsonValue)> {
        self.entries
            .iter()
            .map(|(name, output)| {
                let shown = match output.peek() {
                    Some(resolved) if resolved.secret => JsonValue::String(REDACTED.to_string()),
                    Some(resolved) => resolved.value,
                    None => JsonValue::String("<computed>".to_string()),
                };
                (name.clone(), shown)
            })
            .collect()
    }

    /// Force every export
    pub async fn resolve(&self) -> Result<ResolvedExports> {
        let mut values = BTreeMap::new();
        let mut secret = BTreeSet::new();

        for (name, output) in &self.entries {
            let resolved = output.clone().resolve().await?;
            if resolved.secret {
                secret.insert(name.clone());
            }
            values.insert(name.clone(), resolved.value);
        }

        Ok(ResolvedExports { values, secret })
    }
}

/// Concrete exports, ready to persist
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedExports {
    pub values: BTreeMap<String, JsonValue>,
    /// Names of secret-flagged exports
    pub secret: BTreeSet<String>,
}

impl ResolvedExports {
    /// Exports with secret values replaced by the redaction marker
    pub fn redacted(&self) -> BTreeMap<String, JsonValue> {
        self.values
            .iter()
            .map(|(name, value)| {
                let shown = if self.secret.contains(name) {
                    JsonValue::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (name.clone(), shown)
            })
            .collect()
    }
}
