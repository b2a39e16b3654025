//! Session provisioning lifecycle.
//!
//! [`SessionOrchestrator`] drives one session through
//! `Idle → Starting → Running → Stopping → Stopped` (or `StartFailed`):
//!
//! - **start**: resolve token (fatal) → fetch credentials (degrades) →
//!   create cluster (fatal) → project into the environment.
//! - **stop**: resolve token → delete cluster. Neither step can fail the
//!   stop; the session always ends `Stopped`.
//!
//! Steps run strictly in that order, one at a time. Nothing is retried here;
//! retry and backoff belong to the caller.
//!
//! ```rust,ignore
//! use notebook_provisioner::{ProvisionerConfig, Session, SessionOrchestrator};
//!
//! let orchestrator = SessionOrchestrator::from_config(ProvisionerConfig::from_env()?)?;
//!
//! let mut session = Session::new("alice").with_token("kbase_token", token);
//! orchestrator.on_start(&mut session).await?;
//! // ... pod runs with session.environment ...
//! orchestrator.on_stop(&mut session).await;
//! ```

mod config;
pub(crate) mod traits;

pub use config::ProvisionerConfig;
pub use traits::{ClusterManager, CredentialSource};

use crate::auth::AuthTokenResolver;
use crate::cluster::ClusterManagerClient;
use crate::environment::{EnvironmentProjector, ResolvedCredentials};
use crate::error::Error;
use crate::governance::GovernanceClient;
use crate::session::{Session, SessionState};

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct StartOutcome {
    /// Master URL projected as `SPARK_MASTER_URL`.
    pub master_url: String,
    /// `true` when sentinel storage credentials were projected.
    pub credentials_degraded: bool,
}

/// Result of a stop. Stops never fail; this reports what teardown managed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct StopOutcome {
    /// The cluster manager acknowledged the delete.
    pub cluster_released: bool,
    /// Why teardown was skipped or failed, when it was.
    pub skipped_reason: Option<String>,
}

/// Sequences token resolution, credential acquisition, cluster creation and
/// environment projection for one session at a time.
///
/// Holds no per-session state, so one instance serves every session
/// concurrently. The only shared resource is the HTTP connection pool inside
/// the remote clients.
pub struct SessionOrchestrator<C = GovernanceClient, M = ClusterManagerClient> {
    resolver: AuthTokenResolver,
    credentials: C,
    clusters: M,
    projector: EnvironmentProjector,
}

impl SessionOrchestrator {
    /// Build the HTTP-backed orchestrator. Both clients share one pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: ProvisionerConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self::from_config_with_http_client(config, http))
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied pool.
    #[must_use]
    pub fn from_config_with_http_client(config: ProvisionerConfig, http: reqwest::Client) -> Self {
        let ProvisionerConfig {
            governance,
            cluster,
            settings,
        } = config;

        Self::new(
            AuthTokenResolver::new(settings.token_field),
            GovernanceClient::new(governance).with_http_client(http.clone()),
            ClusterManagerClient::new(cluster).with_http_client(http),
            EnvironmentProjector::new()
                .with_pod_env_prefix(settings.pod_env_prefix)
                .with_rw_group(settings.rw_group),
        )
    }
}

impl<C: CredentialSource, M: ClusterManager> SessionOrchestrator<C, M> {
    #[must_use]
    pub fn new(
        resolver: AuthTokenResolver,
        credentials: C,
        clusters: M,
        projector: EnvironmentProjector,
    ) -> Self {
        Self {
            resolver,
            credentials,
            clusters,
            projector,
        }
    }

    #[must_use]
    pub fn projector(&self) -> &EnvironmentProjector {
        &self.projector
    }

    /// Provision the session's compute and storage access.
    ///
    /// A credential failure degrades the start instead of failing it. On
    /// success the session is `Running`; on error it is `StartFailed` and
    /// carries no `SPARK_MASTER_URL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if the session has no usable
    /// token, or [`Error::ClusterCreate`] if the cluster could not be created.
    pub async fn on_start(&self, session: &mut Session) -> Result<StartOutcome, Error> {
        tracing::info!(username = %session.username, "Session start requested");
        session.transition(SessionState::Starting);

        match self.provision(session).await {
            Ok(outcome) => {
                session.transition(SessionState::Running);
                tracing::info!(
                    username = %session.username,
                    master_url = %outcome.master_url,
                    credentials_degraded = outcome.credentials_degraded,
                    "Session running"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.projector.clear_cluster(session);
                session.transition(SessionState::StartFailed);
                tracing::error!(username = %session.username, error = %e, "Session start failed");
                Err(e)
            }
        }
    }

    async fn provision(&self, session: &mut Session) -> Result<StartOutcome, Error> {
        let token = self.resolver.resolve(session)?;

        let credentials = match self.credentials.fetch_credentials(&token).await {
            Ok(set) => {
                tracing::info!(username = %session.username, "Storage credentials issued");
                ResolvedCredentials::Issued(set)
            }
            Err(e) => {
                tracing::error!(
                    username = %session.username,
                    error = %e,
                    "Failed to get storage credentials; continuing with degraded credentials"
                );
                ResolvedCredentials::Degraded
            }
        };

        tracing::info!(username = %session.username, "Creating cluster");
        let cluster = self
            .clusters
            .create_cluster(&token, &session.cluster_overrides)
            .await?;
        tracing::info!(
            username = %session.username,
            master_url = %cluster.master_url,
            "Cluster created"
        );

        self.projector.apply(session, &credentials, &cluster);

        Ok(StartOutcome {
            master_url: cluster.master_url,
            credentials_degraded: credentials.is_degraded(),
        })
    }

    /// Release the session's cluster. Never fails; always ends `Stopped`.
    ///
    /// Owned environment keys are retracted once teardown has been attempted.
    pub async fn on_stop(&self, session: &mut Session) -> StopOutcome {
        tracing::info!(username = %session.username, "Session stop requested");
        session.transition(SessionState::Stopping);

        let outcome = match self.resolver.resolve(session) {
            Err(e) => {
                tracing::warn!(
                    username = %session.username,
                    error = %e,
                    "Cannot authenticate cluster delete; skipping teardown"
                );
                StopOutcome {
                    cluster_released: false,
                    skipped_reason: Some(e.to_string()),
                }
            }
            Ok(token) => {
                tracing::info!(username = %session.username, "Deleting cluster");
                match self.clusters.delete_cluster(&token).await {
                    Ok(()) => {
                        tracing::info!(username = %session.username, "Cluster deleted");
                        StopOutcome {
                            cluster_released: true,
                            skipped_reason: None,
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            username = %session.username,
                            error = %e,
                            "Error deleting cluster"
                        );
                        StopOutcome {
                            cluster_released: false,
                            skipped_reason: Some(e.to_string()),
                        }
                    }
                }
            }
        };

        self.projector.retract(session);
        session.transition(SessionState::Stopped);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use secrecy::SecretString;

    use super::*;
    use crate::auth::DEFAULT_TOKEN_FIELD;
    use crate::cluster::ClusterOverrides;
    use crate::environment::{
        MINIO_ACCESS_KEY, MINIO_CONFIG_ERROR, MINIO_SECRET_KEY, MINIO_SECURE, SPARK_MASTER_URL,
    };
    use crate::types::{AuthToken, ClusterHandle, CredentialSet};

    /// Shared call log so ordering across both fakes is observable.
    type CallLog = std::sync::Arc<Mutex<Vec<String>>>;

    struct FakeCredentials {
        fail: bool,
        log: CallLog,
    }

    impl CredentialSource for FakeCredentials {
        async fn fetch_credentials(&self, token: &AuthToken) -> Result<CredentialSet, Error> {
            self.log
                .lock()
                .unwrap()
                .push(format!("credentials:{}", token.expose()));
            if self.fail {
                return Err(Error::CredentialFetch {
                    status: Some(500),
                    detail: "governance down".into(),
                });
            }
            Ok(CredentialSet {
                access_key: "AK".into(),
                secret_key: SecretString::from("SK".to_string()),
                endpoint: "minio:9000".into(),
                secure: true,
            })
        }
    }

    struct FakeClusters {
        fail_create: bool,
        fail_delete: bool,
        counter: Mutex<u32>,
        log: CallLog,
    }

    impl ClusterManager for FakeClusters {
        async fn create_cluster(
            &self,
            token: &AuthToken,
            _overrides: &ClusterOverrides,
        ) -> Result<ClusterHandle, Error> {
            self.log
                .lock()
                .unwrap()
                .push(format!("create:{}", token.expose()));
            if self.fail_create {
                return Err(Error::ClusterCreate {
                    status: Some(500),
                    detail: "no capacity".into(),
                });
            }
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            Ok(ClusterHandle {
                master_url: format!("spark://10.0.0.{}:7077", *counter),
            })
        }

        async fn delete_cluster(&self, token: &AuthToken) -> Result<(), Error> {
            self.log
                .lock()
                .unwrap()
                .push(format!("delete:{}", token.expose()));
            if self.fail_delete {
                return Err(Error::ClusterDelete {
                    status: Some(500),
                    detail: "stuck".into(),
                });
            }
            Ok(())
        }
    }

    struct Harness {
        orchestrator: SessionOrchestrator<FakeCredentials, FakeClusters>,
        log: CallLog,
    }

    fn harness(fail_credentials: bool, fail_create: bool, fail_delete: bool) -> Harness {
        let log = CallLog::default();
        let orchestrator = SessionOrchestrator::new(
            AuthTokenResolver::default(),
            FakeCredentials {
                fail: fail_credentials,
                log: log.clone(),
            },
            FakeClusters {
                fail_create,
                fail_delete,
                counter: Mutex::new(4),
                log: log.clone(),
            },
            EnvironmentProjector::new(),
        );
        Harness { orchestrator, log }
    }

    fn session() -> Session {
        Session::new("alice").with_token(DEFAULT_TOKEN_FIELD, "tok-123")
    }

    impl Harness {
        fn calls(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn start_projects_everything_and_runs() {
        let h = harness(false, false, false);
        let mut session = session();

        let outcome = h.orchestrator.on_start(&mut session).await.unwrap();

        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(outcome.master_url, "spark://10.0.0.5:7077");
        assert!(!outcome.credentials_degraded);
        assert_eq!(session.env(SPARK_MASTER_URL), Some("spark://10.0.0.5:7077"));
        assert_eq!(session.env(MINIO_ACCESS_KEY), Some("AK"));
        assert_eq!(session.env(MINIO_SECRET_KEY), Some("SK"));
        assert_eq!(session.env(MINIO_CONFIG_ERROR), None);
    }

    #[tokio::test]
    async fn start_fetches_credentials_before_cluster() {
        let h = harness(false, false, false);
        h.orchestrator.on_start(&mut session()).await.unwrap();
        assert_eq!(h.calls(), ["credentials:tok-123", "create:tok-123"]);
    }

    #[tokio::test]
    async fn credential_failure_degrades_start() {
        let h = harness(true, false, false);
        let mut session = session();

        let outcome = h.orchestrator.on_start(&mut session).await.unwrap();

        assert!(outcome.credentials_degraded);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.env(MINIO_ACCESS_KEY), Some(""));
        assert_eq!(session.env(MINIO_SECURE), Some("false"));
        assert!(!session.env(MINIO_CONFIG_ERROR).unwrap_or_default().is_empty());
        assert_eq!(h.calls(), ["credentials:tok-123", "create:tok-123"]);
    }

    #[tokio::test]
    async fn cluster_failure_is_fatal() {
        let h = harness(false, true, false);
        let mut session = session();

        let err = h.orchestrator.on_start(&mut session).await.unwrap_err();

        assert!(matches!(err, Error::ClusterCreate { status: Some(500), .. }));
        assert_eq!(session.state(), SessionState::StartFailed);
        assert_eq!(session.env(SPARK_MASTER_URL), None);
        assert_eq!(session.env(MINIO_ACCESS_KEY), None);
    }

    #[tokio::test]
    async fn failed_restart_clears_stale_master_url() {
        let h = harness(false, true, false);
        let mut session = session();
        session
            .environment
            .insert(SPARK_MASTER_URL.into(), "spark://old:7077".into());

        assert!(h.orchestrator.on_start(&mut session).await.is_err());
        assert_eq!(session.env(SPARK_MASTER_URL), None);
    }

    #[tokio::test]
    async fn missing_token_fails_start_without_remote_calls() {
        let h = harness(false, false, false);
        let mut session = Session::new("alice");

        let err = h.orchestrator.on_start(&mut session).await.unwrap_err();

        assert!(matches!(err, Error::MissingCredential(_)));
        assert_eq!(session.state(), SessionState::StartFailed);
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn consecutive_starts_both_succeed() {
        let h = harness(false, false, false);
        let mut session = session();

        let first = h.orchestrator.on_start(&mut session).await.unwrap();
        let second = h.orchestrator.on_start(&mut session).await.unwrap();

        assert_ne!(first.master_url, second.master_url);
        assert_eq!(session.env(SPARK_MASTER_URL), Some(second.master_url.as_str()));
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn start_failed_session_can_start_again() {
        let h = harness(false, false, false);
        let mut session = Session::new("alice");
        assert!(h.orchestrator.on_start(&mut session).await.is_err());

        session = session.with_token(DEFAULT_TOKEN_FIELD, "tok-123");
        h.orchestrator.on_start(&mut session).await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn stop_deletes_cluster_and_retracts_environment() {
        let h = harness(false, false, false);
        let mut session = session();
        session.environment.insert("NB_USER".into(), "alice".into());
        h.orchestrator.on_start(&mut session).await.unwrap();

        let outcome = h.orchestrator.on_stop(&mut session).await;

        assert!(outcome.cluster_released);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.env(SPARK_MASTER_URL), None);
        assert_eq!(session.env("NB_USER"), Some("alice"));
        assert_eq!(h.calls().last().map(String::as_str), Some("delete:tok-123"));
    }

    #[tokio::test]
    async fn stop_without_token_skips_delete_and_stops() {
        let h = harness(false, false, false);
        let mut session = Session::new("alice");

        let outcome = h.orchestrator.on_stop(&mut session).await;

        assert!(!outcome.cluster_released);
        assert!(outcome.skipped_reason.is_some());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(h.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_with_failing_delete_still_stops() {
        let h = harness(false, false, true);
        let mut session = session();
        h.orchestrator.on_start(&mut session).await.unwrap();

        let outcome = h.orchestrator.on_stop(&mut session).await;

        assert!(!outcome.cluster_released);
        assert!(outcome.skipped_reason.unwrap().contains("HTTP 500"));
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn token_is_resolved_again_on_stop() {
        let h = harness(false, false, false);
        let mut session = session();
        h.orchestrator.on_start(&mut session).await.unwrap();

        // Token rotated between start and stop.
        session = session.with_token(DEFAULT_TOKEN_FIELD, "tok-456");
        h.orchestrator.on_stop(&mut session).await;

        assert_eq!(h.calls().last().map(String::as_str), Some("delete:tok-456"));
    }
}
