use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::auth::DEFAULT_TOKEN_FIELD;
use crate::cluster::{ClusterManagerConfig, ClusterSizing};
use crate::environment::DEFAULT_POD_ENV_PREFIX;
use crate::error::Error;
use crate::governance::GovernanceConfig;

/// Settings that are not tied to a single remote service.
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub(crate) token_field: String,
    pub(crate) pod_env_prefix: String,
    pub(crate) rw_group: String,
}

impl SessionSettings {
    fn defaults() -> Self {
        Self {
            token_field: DEFAULT_TOKEN_FIELD.into(),
            pod_env_prefix: DEFAULT_POD_ENV_PREFIX.into(),
            rw_group: "minio_rw".into(),
        }
    }
}

/// Provisioner configuration.
///
/// Both remote services are constructor parameters. Use [`from_env()`](ProvisionerConfig::from_env) for the
/// deployment convention, or [`new()`](ProvisionerConfig::new) with `with_*`
/// methods for full control.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    pub(crate) governance: GovernanceConfig,
    pub(crate) cluster: ClusterManagerConfig,
    pub(crate) settings: SessionSettings,
}

impl ProvisionerConfig {
    #[must_use]
    pub fn new(governance: GovernanceConfig, cluster: ClusterManagerConfig) -> Self {
        Self {
            governance,
            cluster,
            settings: SessionSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `GOVERNANCE_API_URL`: governance service base URL
    /// - `MINIO_ENDPOINT_URL`: object-storage endpoint passed to sessions
    /// - `SPARK_CLUSTER_MANAGER_API_URL`: cluster manager base URL
    ///
    /// # Optional env vars
    /// - `MINIO_SECURE_FLAG`: TLS to object storage (default `true`)
    /// - `DEFAULT_WORKER_COUNT`, `DEFAULT_WORKER_CORES`, `DEFAULT_WORKER_MEMORY`,
    ///   `DEFAULT_MASTER_CORES`, `DEFAULT_MASTER_MEMORY`: cluster sizing defaults
    /// - `GOVERNANCE_API_TIMEOUT_SECS`: credential request timeout, at least 1 (default 30)
    /// - `SPARK_CLUSTER_MANAGER_TIMEOUT_SECS`: cluster request timeout, at least 1 (default 60)
    /// - `AUTH_STATE_TOKEN_FIELD`: auth-state field holding the token (default `kbase_token`)
    /// - `POD_ENV_PREFIX`: prefix for pod-runtime env names (default `BERDL`)
    /// - `MINIO_RW_GROUP`: group granted read/write storage (default `minio_rw`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or any value is malformed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env()`](ProvisionerConfig::from_env), reading through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required keys are missing or any value is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let governance_url = env.url("GOVERNANCE_API_URL")?;
        let storage_endpoint = env.required("MINIO_ENDPOINT_URL")?;
        let cluster_url = env.url("SPARK_CLUSTER_MANAGER_API_URL")?;

        let mut governance = GovernanceConfig::new(governance_url, storage_endpoint);
        if let Some(secure) = env.get("MINIO_SECURE_FLAG") {
            governance = governance.with_secure(parse_flag("MINIO_SECURE_FLAG", &secure)?);
        }
        if let Some(timeout) = env.timeout("GOVERNANCE_API_TIMEOUT_SECS")? {
            governance = governance.with_timeout(timeout);
        }

        let fallback = ClusterSizing::default();
        let sizing = ClusterSizing {
            worker_count: env
                .parsed("DEFAULT_WORKER_COUNT")?
                .unwrap_or(fallback.worker_count),
            worker_cores: env
                .parsed("DEFAULT_WORKER_CORES")?
                .unwrap_or(fallback.worker_cores),
            worker_memory: env
                .get("DEFAULT_WORKER_MEMORY")
                .unwrap_or(fallback.worker_memory),
            master_cores: env
                .parsed("DEFAULT_MASTER_CORES")?
                .unwrap_or(fallback.master_cores),
            master_memory: env
                .get("DEFAULT_MASTER_MEMORY")
                .unwrap_or(fallback.master_memory),
        };
        sizing
            .validate()
            .map_err(|e| Error::Config(format!("default cluster sizing: {e}")))?;

        let mut cluster = ClusterManagerConfig::new(cluster_url).with_defaults(sizing);
        if let Some(timeout) = env.timeout("SPARK_CLUSTER_MANAGER_TIMEOUT_SECS")? {
            cluster = cluster.with_timeout(timeout);
        }

        let mut config = Self::new(governance, cluster);
        if let Some(field) = env.get("AUTH_STATE_TOKEN_FIELD") {
            config = config.with_token_field(field);
        }
        if let Some(prefix) = env.get("POD_ENV_PREFIX") {
            config = config.with_pod_env_prefix(prefix);
        }
        if let Some(group) = env.get("MINIO_RW_GROUP") {
            config = config.with_rw_group(group);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
        self.settings.token_field = field.into();
        self
    }

    #[must_use]
    pub fn with_pod_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.pod_env_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_rw_group(mut self, group: impl Into<String>) -> Self {
        self.settings.rw_group = group.into();
        self
    }

    #[must_use]
    pub fn governance(&self) -> &GovernanceConfig {
        &self.governance
    }

    #[must_use]
    pub fn cluster(&self) -> &ClusterManagerConfig {
        &self.cluster
    }

    #[must_use]
    pub fn token_field(&self) -> &str {
        &self.settings.token_field
    }

    #[must_use]
    pub fn pod_env_prefix(&self) -> &str {
        &self.settings.pod_env_prefix
    }

    #[must_use]
    pub fn rw_group(&self) -> &str {
        &self.settings.rw_group
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// Non-blank value, trimmed.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, Error> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("{key} is required")))
    }

    fn url(&self, key: &str) -> Result<Url, Error> {
        self.required(key)?
            .parse()
            .map_err(|e| Error::Config(format!("{key}: {e}")))
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.parse::<T>()
                    .map_err(|e| Error::Config(format!("{key}: {e}")))
            })
            .transpose()
    }

    /// Whole seconds, at least one.
    fn timeout(&self, key: &str) -> Result<Option<Duration>, Error> {
        match self.parsed::<u64>(key)? {
            Some(0) => Err(Error::Config(format!("{key}: timeout must be at least 1 second"))),
            secs => Ok(secs.map(Duration::from_secs)),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}
