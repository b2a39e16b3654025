use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::cluster::ClusterOverrides;
use crate::error::Error;
use crate::orchestrator::traits::{ClusterManager, CredentialSource};
use crate::orchestrator::{SessionOrchestrator, StartOutcome, StopOutcome};
use crate::types::{CredentialScope, Username};

/// Flat key/value environment handed to the spawned pod.
pub type Environment = HashMap<String, String>;

/// Authentication state recorded by the hub's authenticator.
pub type AuthState = serde_json::Map<String, serde_json::Value>;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    StartFailed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::StartFailed => write!(f, "start_failed"),
        }
    }
}

/// One user's environment for the duration of a lifecycle transition.
///
/// `environment` is the only channel by which provisioning results reach
/// the pod. Nothing else about the session is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: Username,
    pub is_admin: bool,
    pub groups: Vec<String>,
    pub auth_state: Option<AuthState>,
    pub environment: Environment,
    pub cluster_overrides: ClusterOverrides,
    state: SessionState,
}

impl Session {
    /// Create an idle session with no auth state and an empty environment.
    #[must_use]
    pub fn new(username: impl Into<Username>) -> Self {
        Self {
            username: username.into(),
            is_admin: false,
            groups: Vec::new(),
            auth_state: None,
            environment: Environment::new(),
            cluster_overrides: ClusterOverrides::default(),
            state: SessionState::Idle,
        }
    }

    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    #[must_use]
    pub fn with_auth_state(mut self, auth_state: AuthState) -> Self {
        self.auth_state = Some(auth_state);
        self
    }

    /// Record `token` under `field` in a fresh auth state.
    #[must_use]
    pub fn with_token(self, field: &str, token: impl Into<String>) -> Self {
        let mut state = AuthState::new();
        state.insert(field.to_owned(), serde_json::Value::String(token.into()));
        self.with_auth_state(state)
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_cluster_overrides(mut self, overrides: ClusterOverrides) -> Self {
        self.cluster_overrides = overrides;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: SessionState) {
        tracing::debug!(
            username = %self.username,
            from = %self.state,
            to = %next,
            "Session state change"
        );
        self.state = next;
    }

    /// Storage access level: admins and members of `rw_group` get read/write.
    #[must_use]
    pub fn credential_scope(&self, rw_group: &str) -> CredentialScope {
        if self.is_admin || self.groups.iter().any(|g| g == rw_group) {
            CredentialScope::ReadWrite
        } else {
            CredentialScope::ReadOnly
        }
    }

    /// Environment value for `key`, if set.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }
}

/// Shared handle for hosts that may deliver start and stop concurrently.
///
/// Transitions through the same handle run one at a time in arrival
/// order: a stop that arrives mid-start waits for the start to finish or
/// fail, then tears down whatever it created.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for inspection.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }

    /// Run the start sequence once the session is free.
    ///
    /// # Errors
    ///
    /// Propagates the fatal start errors of [`SessionOrchestrator::on_start`].
    pub async fn start<C, M>(
        &self,
        orchestrator: &SessionOrchestrator<C, M>,
    ) -> Result<StartOutcome, Error>
    where
        C: CredentialSource,
        M: ClusterManager,
    {
        let mut session = self.inner.lock().await;
        orchestrator.on_start(&mut session).await
    }

    /// Run the stop sequence once the session is free.
    pub async fn stop<C, M>(&self, orchestrator: &SessionOrchestrator<C, M>) -> StopOutcome
    where
        C: CredentialSource,
        M: ClusterManager,
    {
        let mut session = self.inner.lock().await;
        orchestrator.on_stop(&mut session).await
    }
}
