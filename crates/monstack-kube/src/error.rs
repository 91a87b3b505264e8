//! Error types for monstack-kube

use std::time::Duration;

use monstack_core::CoreError;
use thiserror::Error;

/// Result type for monstack-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while realizing a plan
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// A deferred input failed or the declaration was invalid
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Secret does not exist
    #[error("secret '{name}' not found in namespace '{namespace}'")]
    SecretNotFound { namespace: String, name: String },

    /// Secret identifier is not `<namespace>/<name>`
    #[error("invalid secret id '{id}': expected <namespace>/<name>")]
    InvalidSecretId { id: String },

    /// The helm binary could not be started
    #[error("failed to run '{binary}': {message}\nHint: install helm or point --helm at it")]
    HelmUnavailable { binary: String, message: String },

    /// A helm command exited with an error
    #[error("helm {command} failed: {stderr}")]
    Helm { command: String, stderr: String },

    /// Release ended up in a state other than deployed
    #[error("release '{name}' is {status} after install")]
    ReleaseFailed { name: String, status: String },

    /// Object kind is not served by the API server
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownResourceType { api_version: String, kind: String },

    /// Manifests could not be applied
    #[error("failed to apply {failed} of {total} manifest object(s): {details}")]
    ApplyFailed {
        failed: usize,
        total: usize,
        details: String,
    },

    /// A resource did not finish within its create timeout
    #[error("{resource} did not finish within {after:?}")]
    Timeout { resource: String, after: Duration },

    /// The engine was handed a resource it cannot run
    #[error("{resource} has no cluster session")]
    NoSession { resource: String },

    /// One or more resources of a wave failed
    #[error("{} resource(s) failed: {}", .failures.len(), describe(.failures))]
    Deployment { failures: Vec<ResourceFailure> },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A resource that failed during a run
#[derive(Debug)]
pub struct ResourceFailure {
    pub resource: String,
    pub error: KubeError,
}

impl std::fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.resource, self.error)
    }
}

fn describe(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if the error stems from a failed stack reference lookup
    pub fn is_stack_reference(&self) -> bool {
        match self {
            KubeError::Core(e) => matches!(
                e.root(),
                CoreError::StackNotFound { .. }
                    | CoreError::MissingOutput { .. }
                    | CoreError::OutputShape { .. }
            ),
            KubeError::Deployment { failures } => {
                failures.iter().any(|f| f.error.is_stack_reference())
            }
            _ => false,
        }
    }
}
