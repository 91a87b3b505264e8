//! Stacks, project descriptors and cross-stack references
//!
//! Every stack publishes a set of named outputs when it is deployed. Other
//! programs read them through a [`StackReference`]; lookups are deferred and
//! only fail when the value is forced.
//!
//! State is kept by a [`StackBackend`]. The file backend stores one JSON
//! document per stack at `<root>/<owner>/<project>/<stack>.json`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::output::{Output, Resolved};

/// Project descriptor file name
pub const PROJECT_FILE: &str = "Pulumi.yaml";

/// Fully qualified stack name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackRef {
    pub owner: String,
    pub project: String,
    pub stack: String,
}

impl StackRef {
    pub fn new(
        owner: impl Into<String>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            project: project.into(),
            stack: stack.into(),
        }
    }
}

impl fmt::Display for StackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.owner, self.project, self.stack)
    }
}

impl FromStr for StackRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [owner, project, stack] if parts.iter().all(|p| !p.is_empty()) => {
                Ok(Self::new(*owner, *project, *stack))
            }
            _ => Err(CoreError::InvalidStackRef {
                reference: s.to_string(),
            }),
        }
    }
}

/// Project descriptor (`Pulumi.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProjectDescriptor {
    /// Load the descriptor from a project directory
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PROJECT_FILE);
        if !path.exists() {
            return Err(CoreError::ProjectNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        let descriptor: Self =
            serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidProject {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        if descriptor.name.trim().is_empty() {
            return Err(CoreError::InvalidProject {
                path: path.display().to_string(),
                message: "name must not be empty".to_string(),
            });
        }
        Ok(descriptor)
    }
}

/// Project name declared in the descriptor of `project_dir`
pub fn project_name_from_dir(project_dir: &Path) -> Result<String> {
    ProjectDescriptor::load(project_dir).map(|d| d.name)
}

/// Persisted outputs of one stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackState {
    /// Incremented on every successful run
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: BTreeMap<String, JsonValue>,
    /// Names of outputs holding secret material
    #[serde(default)]
    pub secret_outputs: BTreeSet<String>,
}

impl StackState {
    /// An output with its secret flag
    pub fn output(&self, key: &str) -> Option<Resolved<JsonValue>> {
        self.outputs.get(key).map(|value| Resolved {
            value: value.clone(),
            secret: self.secret_outputs.contains(key),
        })
    }
}

/// Storage of stack state
#[async_trait]
pub trait StackBackend: Send + Sync {
    /// Read the latest state of a stack
    async fn load(&self, stack: &StackRef) -> Result<StackState>;

    /// Replace the outputs of a stack, bumping its version
    async fn save(
        &self,
        stack: &StackRef,
        outputs: BTreeMap<String, JsonValue>,
        secret_outputs: BTreeSet<String>,
    ) -> Result<StackState>;

    /// Check if a stack has state
    async fn exists(&self, stack: &StackRef) -> Result<bool> {
        match self.load(stack).await {
            Ok(_) => Ok(true),
            Err(CoreError::StackNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// File-based stack state
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, stack: &StackRef) -> PathBuf {
        self.root
            .join(&stack.owner)
            .join(&stack.project)
            .join(format!("{}.json", stack.stack))
    }
}

#[async_trait]
impl StackBackend for FileBackend {
    async fn load(&self, stack: &StackRef) -> Result<StackState> {
        let path = self.state_path(stack);
        if !path.exists() {
            return Err(CoreError::StackNotFound {
                stack: stack.to_string(),
            });
        }

        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(
        &self,
        stack: &StackRef,
        outputs: BTreeMap<String, JsonValue>,
        secret_outputs: BTreeSet<String>,
    ) -> Result<StackState> {
        let previous = match self.load(stack).await {
            Ok(state) => state.version,
            Err(CoreError::StackNotFound { .. }) => 0,
            Err(e) => return Err(e),
        };

        let state = StackState {
            version: previous + 1,
            updated_at: Some(Utc::now()),
            outputs,
            secret_outputs,
        };

        let path = self.state_path(stack);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&state)?)?;

        tracing::debug!(stack = %stack, version = state.version, path = %path.display(), "saved stack state");
        Ok(state)
    }
}

/// In-memory stack state
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stacks: Arc<RwLock<HashMap<StackRef, StackState>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stack with plain outputs
    pub fn with_stack(self, stack: StackRef, outputs: BTreeMap<String, JsonValue>) -> Self {
        self.insert(
            stack,
            StackState {
                version: 1,
                outputs,
                ..Default::default()
            },
        );
        self
    }

    pub fn insert(&self, stack: StackRef, state: StackState) {
        if let Ok(mut stacks) = self.stacks.write() {
            stacks.insert(stack, state);
        }
    }
}

#[async_trait]
impl StackBackend for MemoryBackend {
    async fn load(&self, stack: &StackRef) -> Result<StackState> {
        let stacks = self.stacks.read().map_err(|_| CoreError::InvalidConfig {
            message: "stack store lock poisoned".to_string(),
        })?;
        stacks
            .get(stack)
            .cloned()
            .ok_or_else(|| CoreError::StackNotFound {
                stack: stack.to_string(),
            })
    }

    async fn save(
        &self,
        stack: &StackRef,
        outputs: BTreeMap<String, JsonValue>,
        secret_outputs: BTreeSet<String>,
    ) -> Result<StackState> {
        let mut stacks = self.stacks.write().map_err(|_| CoreError::InvalidConfig {
            message: "stack store lock poisoned".to_string(),
        })?;
        let version = stacks.get(stack).map_or(0, |s| s.version) + 1;
        let state = StackState {
            version,
            updated_at: Some(Utc::now()),
            outputs,
            secret_outputs,
        };
        stacks.insert(stack.clone(), state.clone());
        Ok(state)
    }
}

/// Read access to the outputs of another stack
#[derive(Clone)]
pub struct StackReference {
    stack: StackRef,
    state: Output<StackState>,
}

impl StackReference {
    /// Reference a stack; its state is read once, on first use
    pub fn new(stack: StackRef, backend: Arc<dyn StackBackend>) -> Self {
        let target = stack.clone();
        let state = Output::from_future(async move {
            tracing::debug!(stack = %target, "reading stack outputs");
            backend.load(&target).await
        });
        Self { stack, state }
    }

    pub fn stack(&self) -> &StackRef {
        &self.stack
    }

    /// An output that fails when forced if the stack or key is missing
    pub fn require_output(&self, key: &str) -> Output<JsonValue> {
        let state = self.state.clone();
        let stack = self.stack.to_string();
        let key = key.to_string();
        Output::from_resolved_future(async move {
            let state = state.value().await?;
            state
                .output(&key)
                .ok_or(CoreError::MissingOutput { stack, key })
        })
    }

    /// A required output that must be a string
    pub fn require_string_output(&self, key: &str) -> Output<String> {
        let stack = self.stack.to_string();
        let key_name = key.to_string();
        self.require_output(key).try_apply(move |value| match value {
            JsonValue::String(s) => Ok(s),
            other => Err(CoreError::OutputShape {
                stack,
                key: key_name,
                message: format!("expected a string, found {}", json_type(&other)),
            }),
        })
    }

    /// An optional output; a missing key resolves to `None`
    pub fn get_output(&self, key: &str) -> Output<Option<JsonValue>> {
        let state = self.state.clone();
        let key = key.to_string();
        Output::from_resolved_future(async move {
            let state = state.value().await?;
            Ok(match state.output(&key) {
                Some(resolved) => Resolved {
                    value: Some(resolved.value),
                    secret: resolved.secret,
                },
                None => Resolved {
                    value: None,
                    secret: false,
                },
            })
        })
    }
}

impl fmt::Debug for StackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackReference")
            .field("stack", &self.stack.to_string())
            .finish_non_exhaustive()
    }
}

pub(crate) fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
