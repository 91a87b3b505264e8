//! Monstack Kube - cluster side of a monstack run
//!
//! This crate provides:
//! - **Engine**: executes a declared plan wave by wave and publishes outputs
//! - **Cluster seams**: [`ClusterConnector`] and [`ClusterSession`] traits
//! - **Kubernetes sessions**: namespaces, Secret reads and Server-Side Apply
//!   of manifests through the Kubernetes API
//! - **Helm**: release installation through the `helm` binary
//! - **Mock cluster**: an in-memory session for tests

pub mod client;
pub mod engine;
pub mod error;
pub mod helm;
pub mod mock;
pub mod provider;
pub mod resources;

pub use client::{KubeConnector, KubeSession};
pub use engine::{Engine, ResourceRecord, RunSummary};
pub use error::{KubeError, ResourceFailure, Result};
pub use helm::{DEFAULT_HELM_BINARY, HelmCli};
pub use mock::{ClusterEvent, MockCluster};
pub use provider::{ApplySummary, ClusterConnector, ClusterSession, parse_secret_id};
pub use resources::{DEFAULT_DISCOVERY_TIMEOUT, FIELD_MANAGER, ResourceManager};
