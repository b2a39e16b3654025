use derive_more::{Display, From, Into};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Hub username. Unique among concurrently running sessions.
///
/// The cluster manager keys clusters on the identity behind the token, so
/// this is used for logging and scoping, never as a remote lookup key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct Username(pub String);

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Username {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Delegated identity token read from session auth state.
///
/// Opaque and owned by the identity provider. Never minted or persisted
/// here; `Debug` output is redacted.
#[derive(Debug, Clone)]
pub struct AuthToken(SecretString);

impl AuthToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Raw bearer value, for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Scoped object-storage credentials for one session start.
///
/// Produced fresh on every start and handed to the environment projector.
#[derive(Debug, Clone)]
pub struct CredentialSet {
    pub access_key: String,
    pub secret_key: SecretString,
    pub endpoint: String,
    pub secure: bool,
}

impl CredentialSet {
    /// Placeholder used when the governance service could not be reached.
    #[must_use]
    pub fn sentinel() -> Self {
        Self {
            access_key: String::new(),
            secret_key: SecretString::from(String::new()),
            endpoint: String::new(),
            secure: false,
        }
    }
}

/// Connection endpoint of a freshly created compute cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHandle {
    pub master_url: String,
}

/// Object-storage access level granted to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    ReadOnly,
    ReadWrite,
}

impl std::fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}
