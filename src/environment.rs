use secrecy::ExposeSecret;
use serde::Serialize;

use crate::session::Session;
use crate::types::{ClusterHandle, CredentialScope, CredentialSet};

pub const SPARK_MASTER_URL: &str = "SPARK_MASTER_URL";
pub const MINIO_ACCESS_KEY: &str = "MINIO_ACCESS_KEY";
pub const MINIO_SECRET_KEY: &str = "MINIO_SECRET_KEY";
pub const MINIO_ENDPOINT: &str = "MINIO_ENDPOINT";
pub const MINIO_SECURE: &str = "MINIO_SECURE";
pub const MINIO_CONFIG_ERROR: &str = "MINIO_CONFIG_ERROR";
pub const MINIO_RW_ACCESS_KEY: &str = "MINIO_RW_ACCESS_KEY";
pub const MINIO_RW_SECRET_KEY: &str = "MINIO_RW_SECRET_KEY";

/// Value of `MINIO_CONFIG_ERROR` on a degraded start.
pub const DEGRADED_CREDENTIALS_MESSAGE: &str =
    "Failed to retrieve MinIO credentials. Please contact an administrator.";

/// Every key the projector writes, and so retracts on stop.
///
/// The `MINIO_RW_*` keys are seeded by the deployment and only ever removed
/// from read-only sessions in [`EnvironmentProjector::apply`].
pub const OWNED_KEYS: &[&str] = &[
    SPARK_MASTER_URL,
    MINIO_ACCESS_KEY,
    MINIO_SECRET_KEY,
    MINIO_ENDPOINT,
    MINIO_SECURE,
    MINIO_CONFIG_ERROR,
];

pub const DEFAULT_POD_ENV_PREFIX: &str = "BERDL";

/// Storage credentials as they reach the projector.
#[derive(Debug, Clone)]
pub enum ResolvedCredentials {
    /// Issued by the governance service.
    Issued(CredentialSet),
    /// Governance call failed; project the sentinel plus the error marker.
    Degraded,
}

impl ResolvedCredentials {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }
}

/// Source of a pod-runtime-resolved environment value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ValueFrom {
    FieldRef { field_path: String },
    ResourceFieldRef { resource: String },
}

/// Environment variable filled in by the pod runtime at materialization.
///
/// Serializes in the Kubernetes `EnvVar` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodEnvVar {
    pub name: String,
    pub value_from: ValueFrom,
}

/// Writes provisioning results into a session's environment.
///
/// Last write wins for owned keys. Keys outside [`OWNED_KEYS`] are never
/// touched, except that read-only sessions lose the seeded `MINIO_RW_*` keys.
#[derive(Debug, Clone)]
pub struct EnvironmentProjector {
    pod_env_prefix: String,
    rw_group: String,
}

impl Default for EnvironmentProjector {
    fn default() -> Self {
        Self {
            pod_env_prefix: DEFAULT_POD_ENV_PREFIX.into(),
            rw_group: "minio_rw".into(),
        }
    }
}

impl EnvironmentProjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix for pod-runtime field names (`<PREFIX>_POD_IP`, ...).
    #[must_use]
    pub fn with_pod_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pod_env_prefix = prefix.into();
        self
    }

    /// Group whose members get read/write storage credentials.
    #[must_use]
    pub fn with_rw_group(mut self, group: impl Into<String>) -> Self {
        self.rw_group = group.into();
        self
    }

    #[must_use]
    pub fn rw_group(&self) -> &str {
        &self.rw_group
    }

    /// Project credentials and the cluster endpoint into `session`.
    pub fn apply(
        &self,
        session: &mut Session,
        credentials: &ResolvedCredentials,
        cluster: &ClusterHandle,
    ) {
        let env = &mut session.environment;
        match credentials {
            ResolvedCredentials::Issued(set) => {
                write_credentials(env, set);
                env.remove(MINIO_CONFIG_ERROR);
            }
            ResolvedCredentials::Degraded => {
                write_credentials(env, &CredentialSet::sentinel());
                env.insert(
                    MINIO_CONFIG_ERROR.into(),
                    DEGRADED_CREDENTIALS_MESSAGE.into(),
                );
            }
        }
        env.insert(SPARK_MASTER_URL.into(), cluster.master_url.clone());

        if session.credential_scope(&self.rw_group) == CredentialScope::ReadOnly {
            let removed_access = session.environment.remove(MINIO_RW_ACCESS_KEY).is_some();
            let removed_secret = session.environment.remove(MINIO_RW_SECRET_KEY).is_some();
            if removed_access || removed_secret {
                tracing::info!(
                    username = %session.username,
                    "Removed read/write storage credentials from read-only session"
                );
            }
        }
    }

    /// Drop the cluster endpoint, e.g. after a failed create.
    pub fn clear_cluster(&self, session: &mut Session) {
        session.environment.remove(SPARK_MASTER_URL);
    }

    /// Remove every owned key; foreign and seeded keys stay.
    pub fn retract(&self, session: &mut Session) {
        for key in OWNED_KEYS {
            session.environment.remove(*key);
        }
    }

    /// Field references the pod runtime resolves at pod creation.
    #[must_use]
    pub fn pod_env(&self) -> Vec<PodEnvVar> {
        let field = |suffix: &str, path: &str| PodEnvVar {
            name: format!("{}_{suffix}", self.pod_env_prefix),
            value_from: ValueFrom::FieldRef {
                field_path: path.into(),
            },
        };
        let resource = |suffix: &str, resource: &str| PodEnvVar {
            name: format!("{}_{suffix}", self.pod_env_prefix),
            value_from: ValueFrom::ResourceFieldRef {
                resource: resource.into(),
            },
        };
        vec![
            field("POD_IP", "status.podIP"),
            field("POD_NAME", "metadata.name"),
            resource("CPU_REQUEST", "requests.cpu"),
            resource("CPU_LIMIT", "limits.cpu"),
            resource("MEMORY_REQUEST", "requests.memory"),
            resource("MEMORY_LIMIT", "limits.memory"),
        ]
    }
}

fn write_credentials(env: &mut crate::session::Environment, set: &CredentialSet) {
    env.insert(MINIO_ACCESS_KEY.into(), set.access_key.clone());
    env.insert(
        MINIO_SECRET_KEY.into(),
        set.secret_key.expose_secret().to_owned(),
    );
    env.insert(MINIO_ENDPOINT.into(), set.endpoint.clone());
    env.insert(MINIO_SECURE.into(), set.secure.to_string());
}
