//! Chart values trees
//!
//! [`Values`] is a plain JSON tree. [`DeferredValues`] is a static tree plus a
//! set of leaves that only become concrete once the outputs they come from
//! are resolved, such as a password read out of a cluster Secret.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::output::Output;
use crate::plan::ResourceId;
use crate::secret::{REDACTED, Secret};

/// Values container addressed by dotted paths
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse values from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Set a value by dotted path (e.g., "grafana.adminPassword")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::Values {
                message: format!("invalid values path '{}'", path),
            });
        }
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Copy of these values with the given paths replaced by a redaction marker
    pub fn redacted<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Values {
        let mut copy = self.clone();
        for path in paths {
            let parts: Vec<&str> = path.split('.').collect();
            if get_nested(&copy.0, &parts).is_some() {
                set_nested(&mut copy.0, &parts, JsonValue::String(REDACTED.to_string()));
            }
        }
        copy
    }
}

/// A leaf of a values tree that is not known at declaration time
#[derive(Clone)]
enum DeferredLeaf {
    Plain(Output<JsonValue>),
    Secret(Output<Secret<String>>),
}

/// A static values tree with deferred leaves
#[derive(Clone, Default)]
pub struct DeferredValues {
    base: Values,
    leaves: Vec<(String, DeferredLeaf)>,
}

impl DeferredValues {
    /// Start from a fully static tree
    pub fn new(base: Values) -> Self {
        Self {
            base,
            leaves: Vec::new(),
        }
    }

    /// Set `path` to the value of `output` once it resolves
    pub fn set_deferred(mut self, path: impl Into<String>, output: Output<JsonValue>) -> Self {
        self.leaves.push((path.into(), DeferredLeaf::Plain(output)));
        self
    }

    /// Set `path` to a secret once it resolves
    ///
    /// The secret is revealed only when the tree is resolved for submission;
    /// every display of the tree shows a redaction marker at this path.
    pub fn set_secret(mut self, path: impl Into<String>, output: Output<Secret<String>>) -> Self {
        self.leaves.push((path.into(), DeferredLeaf::Secret(output)));
        self
    }

    /// The static part of the tree
    pub fn base(&self) -> &Values {
        &self.base
    }

    /// Paths whose values are deferred
    pub fn deferred_paths(&self) -> impl Iterator<Item = &str> {
        self.leaves.iter().map(|(path, _)| path.as_str())
    }

    /// Resources the deferred leaves were derived from
    pub fn dependencies(&self) -> BTreeSet<ResourceId> {
        self.leaves
            .iter()
            .flat_map(|(_, leaf)| match leaf {
                DeferredLeaf::Plain(o) => o.dependencies().clone(),
                DeferredLeaf::Secret(o) => o.dependencies().clone(),
            })
            .collect()
    }

    /// Values as they would be displayed before resolution: deferred leaves
    /// are shown as `<computed>`, secret leaves as the redaction marker
    pub fn preview(&self) -> Values {
        let mut values = self.base.clone();
        for (path, leaf) in &self.leaves {
            let shown = match leaf {
                DeferredLeaf::Secret(_) => JsonValue::String(REDACTED.to_string()),
                DeferredLeaf::Plain(o) => match o.peek() {
                    Some(resolved) if resolved.secret => JsonValue::String(REDACTED.to_string()),
                    // Known plain leaves are shown verbatim.
                    Some(resolved) => resolved.value,
                    None => JsonValue::String("<computed>".to_string()),
                },
            };
            if let Err(e) = values.set(path, shown) {
                tracing::warn!(path = %path, error = %e, "deferred value left out of preview");
            }
        }
        values
    }

    /// Force every deferred leaf and produce the concrete tree
    pub async fn resolve(&self) -> Result<ResolvedValues> {
        let mut values = self.base.clone();
        let mut secret_paths = Vec::new();

        for (path, leaf) in &self.leaves {
            match leaf {
                DeferredLeaf::Plain(output) => {
                    let resolved = output.clone().resolve().await?;
                    if resolved.secret {
                        secret_paths.push(path.clone());
                    }
                    values.set(path, resolved.value)?;
                }
                DeferredLeaf::Secret(output) => {
                    let secret = output.clone().value().await?;
                    values.set(path, JsonValue::String(secret.reveal().to_string()))?;
                    secret_paths.push(path.clone());
                }
            }
        }

        Ok(ResolvedValues {
            values,
            secret_paths,
        })
    }
}

impl fmt::Debug for DeferredValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredValues")
            .field("values", &self.preview())
            .finish()
    }
}

impl From<Values> for DeferredValues {
    fn from(values: Values) -> Self {
        DeferredValues::new(values)
    }
}

/// A concrete values tree ready for submission
#[derive(Clone, PartialEq)]
pub struct ResolvedValues {
    values: Values,
    secret_paths: Vec<String>,
}

impl ResolvedValues {
    /// The full tree, secrets included
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Paths holding secret material
    pub fn secret_paths(&self) -> &[String] {
        &self.secret_paths
    }

    /// The tree with secret paths redacted, safe to log or print
    pub fn redacted(&self) -> Values {
        self.values
            .redacted(self.secret_paths.iter().map(String::as_str))
    }
}

impl fmt::Debug for ResolvedValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedValues")
            .field("values", &self.redacted())
            .finish()
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert(key.to_string(), new_value);
        } else {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}
