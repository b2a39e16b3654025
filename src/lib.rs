#![doc = include_str!("../README.md")]

pub mod auth;
pub mod cluster;
pub mod environment;
pub mod error;
pub mod governance;
pub mod orchestrator;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use auth::AuthTokenResolver;
pub use cluster::{ClusterManagerClient, ClusterManagerConfig, ClusterOverrides, ClusterSizing};
pub use environment::{EnvironmentProjector, PodEnvVar, ResolvedCredentials, ValueFrom};
pub use error::Error;
pub use governance::{GovernanceClient, GovernanceConfig};
pub use orchestrator::{
    ClusterManager, CredentialSource, ProvisionerConfig, SessionOrchestrator, StartOutcome,
    StopOutcome,
};
pub use session::{AuthState, Environment, Session, SessionHandle, SessionState};
pub use types::{AuthToken, ClusterHandle, CredentialScope, CredentialSet, Username};
