use std::future::Future;

use crate::cluster::{ClusterManagerClient, ClusterOverrides};
use crate::error::Error;
use crate::governance::GovernanceClient;
use crate::types::{AuthToken, ClusterHandle, CredentialSet};

/// Source of scoped object-storage credentials.
///
/// Implemented by [`GovernanceClient`]. Implementations make a single
/// attempt per call; the orchestrator decides what a failure means.
///
/// # Example
///
/// ```rust,ignore
/// impl CredentialSource for StaticCredentials {
///     async fn fetch_credentials(&self, _token: &AuthToken) -> Result<CredentialSet, Error> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
pub trait CredentialSource: Send + Sync + 'static {
    fn fetch_credentials(
        &self,
        token: &AuthToken,
    ) -> impl Future<Output = Result<CredentialSet, Error>> + Send;
}

/// Remote owner of per-identity compute clusters.
///
/// Implemented by [`ClusterManagerClient`]. At most one cluster exists per
/// identity; `create_cluster` replaces any existing one.
pub trait ClusterManager: Send + Sync + 'static {
    fn create_cluster(
        &self,
        token: &AuthToken,
        overrides: &ClusterOverrides,
    ) -> impl Future<Output = Result<ClusterHandle, Error>> + Send;

    fn delete_cluster(&self, token: &AuthToken) -> impl Future<Output = Result<(), Error>> + Send;
}

impl CredentialSource for GovernanceClient {
    fn fetch_credentials(
        &self,
        token: &AuthToken,
    ) -> impl Future<Output = Result<CredentialSet, Error>> + Send {
        GovernanceClient::fetch_credentials(self, token)
    }
}

impl ClusterManager for ClusterManagerClient {
    fn create_cluster(
        &self,
        token: &AuthToken,
        overrides: &ClusterOverrides,
    ) -> impl Future<Output = Result<ClusterHandle, Error>> + Send {
        ClusterManagerClient::create_cluster(self, token, overrides)
    }

    fn delete_cluster(&self, token: &AuthToken) -> impl Future<Output = Result<(), Error>> + Send {
        ClusterManagerClient::delete_cluster(self, token)
    }
}
