//! Core error types

use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Project descriptor not found: {path}")]
    ProjectNotFound { path: String },

    #[error("Invalid project descriptor {path}: {message}")]
    InvalidProject { path: String, message: String },

    #[error("Configuration key '{key}' is not a valid {expected}: {value}")]
    ConfigType {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Stack '{stack}' not found")]
    StackNotFound { stack: String },

    #[error("Invalid stack reference '{reference}': expected <owner>/<project>/<stack>")]
    InvalidStackRef { reference: String },

    #[error("Required output '{key}' not found in stack '{stack}'")]
    MissingOutput { stack: String, key: String },

    #[error("Output '{key}' of stack '{stack}' has unexpected shape: {message}")]
    OutputShape {
        stack: String,
        key: String,
        message: String,
    },

    #[error("Secret [{key}] not found in Kubernetes secret store")]
    MissingSecretKey { key: String },

    #[error("Secret [{key}] is not valid base64: {source}")]
    SecretEncoding {
        key: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Secret [{key}] is not valid UTF-8")]
    SecretUtf8 { key: String },

    #[error("Invalid release: {message}")]
    InvalidRelease { message: String },

    #[error("Invalid chart version '{version}'")]
    InvalidChartVersion { version: String },

    #[error("Duplicate resource: {resource}")]
    DuplicateResource { resource: String },

    #[error("Resource {resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[error("Resource {resource} failed: {message}")]
    ResourceFailed { resource: String, message: String },

    #[error("Output of {resource} was never resolved")]
    Unresolved { resource: String },

    #[error("Invalid manifest pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid manifest {path}: {message}")]
    InvalidManifest { path: String, message: String },

    #[error("Values error: {message}")]
    Values { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A deferred failure observed by more than one consumer
    #[error(transparent)]
    Shared(Arc<CoreError>),
}

impl From<Arc<CoreError>> for CoreError {
    fn from(err: Arc<CoreError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(CoreError::Shared)
    }
}

impl CoreError {
    /// Follow shared wrappers down to the originating error
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
