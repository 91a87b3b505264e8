//! Monstack Core - declaration side of the monitoring stack
//!
//! This crate builds the desired state of a run without touching a cluster:
//! - `config`: stack configuration with namespaced keys and defaults
//! - `output`: deferred values with dependency and secret tracking
//! - `stack`: project descriptors, stack state and cross-stack references
//! - `secret`: redacted secret values and Secret data decoding
//! - `values` / `charts`: chart values trees and the two releases
//! - `plan`: the resource graph and its execution waves
//! - `exports`: outputs published for other stacks
//! - `program`: the monitoring stack itself

pub mod charts;
pub mod config;
pub mod error;
pub mod exports;
pub mod manifests;
pub mod output;
pub mod plan;
pub mod program;
pub mod release;
pub mod secret;
pub mod stack;
pub mod values;

pub use config::{
    CONFIG_NAMESPACE, ChartSettings, ConfigNamespace, MonitoringConfig, ResolvedSetting,
    StackConfig, parse_config_overrides,
};
pub use error::{CoreError, Result};
pub use exports::{Exports, ResolvedExports};
pub use manifests::{ConfigGroupSpec, ManifestDocument};
pub use output::{Output, Resolved, Resolver};
pub use plan::{
    ConfigGroupHandle, CustomTimeouts, NamespaceHandle, NamespaceSpec, Plan, ProviderHandle,
    Resource, ResourceId, ResourceKind, ResourceOptions, ResourceOutputs, ResourceType,
    SecretHandle,
};
pub use program::{Program, ProgramContext, declare};
pub use release::{
    ReleaseFlags, ReleaseHandle, ReleaseSpec, ReleaseState, ReleaseStatus, RepositoryOpts,
    ResolvedRelease,
};
pub use secret::{REDACTED, Secret, extract_admin_password};
pub use stack::{
    FileBackend, MemoryBackend, ProjectDescriptor, StackBackend, StackRef, StackReference,
    StackState, project_name_from_dir,
};
pub use values::{DeferredValues, ResolvedValues, Values};
