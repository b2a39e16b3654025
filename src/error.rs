/// Errors raised while provisioning or releasing a session environment.
///
/// `status` carries the remote HTTP status when a response was received.
/// Transport failures, timeouts and local validation leave it `None`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No usable identity token in the session's auth state.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Governance credential request failed.
    #[error("Credential fetch failed{}: {detail}", status_suffix(.status))]
    CredentialFetch { status: Option<u16>, detail: String },

    /// Cluster manager refused or botched the create request.
    #[error("Cluster create failed{}: {detail}", status_suffix(.status))]
    ClusterCreate { status: Option<u16>, detail: String },

    /// Cluster manager refused or botched the delete request.
    #[error("Cluster delete failed{}: {detail}", status_suffix(.status))]
    ClusterDelete { status: Option<u16>, detail: String },

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Remote HTTP status attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::CredentialFetch { status, .. }
            | Self::ClusterCreate { status, .. }
            | Self::ClusterDelete { status, .. } => *status,
            Self::MissingCredential(_) | Self::Config(_) => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
