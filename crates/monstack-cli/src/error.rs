//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use monstack_core::CoreError;
use monstack_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Stack configuration or project layout is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(monstack::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A referenced stack or one of its outputs is missing
    #[error("Stack reference error: {message}")]
    #[diagnostic(code(monstack::cli::stack_reference))]
    StackReference {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A resource failed against the cluster
    #[error("Deployment failed: {message}")]
    #[diagnostic(code(monstack::cli::deployment))]
    Deployment {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(monstack::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(monstack::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::StackReference { .. } => exit_codes::STACK_REFERENCE_ERROR,
            CliError::Deployment { .. } => exit_codes::DEPLOYMENT_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err.root() {
            CoreError::StackNotFound { .. } => CliError::StackReference {
                message,
                help: Some(
                    "Run `monstack up` for the referenced stack, or check --owner, --stack and --state-dir"
                        .to_string(),
                ),
            },
            CoreError::MissingOutput { .. }
            | CoreError::OutputShape { .. }
            | CoreError::InvalidStackRef { .. } => CliError::StackReference {
                message,
                help: None,
            },
            CoreError::ProjectNotFound { .. } => CliError::Config {
                message,
                help: Some(
                    "The project directory and its sibling kubeconfig and secrets projects each need a Pulumi.yaml"
                        .to_string(),
                ),
            },
            CoreError::ConfigType { .. }
            | CoreError::InvalidConfig { .. }
            | CoreError::InvalidProject { .. }
            | CoreError::InvalidRelease { .. }
            | CoreError::InvalidChartVersion { .. }
            | CoreError::InvalidPattern { .. }
            | CoreError::InvalidManifest { .. }
            | CoreError::DuplicateResource { .. }
            | CoreError::UnknownDependency { .. }
            | CoreError::Values { .. }
            | CoreError::YamlParse(_) => CliError::Config {
                message,
                help: None,
            },
            CoreError::MissingSecretKey { .. }
            | CoreError::SecretEncoding { .. }
            | CoreError::SecretUtf8 { .. }
            | CoreError::ResourceFailed { .. }
            | CoreError::Unresolved { .. } => CliError::Deployment {
                message,
                help: None,
            },
            CoreError::Io(_) => CliError::Io { message },
            CoreError::JsonParse(_) | CoreError::Shared(_) => CliError::Internal { message },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        if err.is_stack_reference() {
            return CliError::StackReference {
                message: err.to_string(),
                help: Some(
                    "The kubeconfig and secrets stacks must have been deployed with the same --owner and --stack"
                        .to_string(),
                ),
            };
        }
        match err {
            KubeError::Core(core) => core.into(),
            KubeError::HelmUnavailable { .. } => CliError::Deployment {
                message: err.to_string(),
                help: Some("Install helm or point --helm at it".to_string()),
            },
            KubeError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::Deployment {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Internal {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
