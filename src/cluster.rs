use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::governance::transport_detail;
use crate::types::{AuthToken, ClusterHandle};

/// Deployment-wide cluster sizing used when a session does not override it.
///
/// Memory values keep their unit suffix (`"10GiB"`) and are passed to the
/// cluster manager as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSizing {
    pub worker_count: u32,
    pub worker_cores: u32,
    pub worker_memory: String,
    pub master_cores: u32,
    pub master_memory: String,
}

impl Default for ClusterSizing {
    fn default() -> Self {
        Self {
            worker_count: 2,
            worker_cores: 1,
            worker_memory: "10GiB".into(),
            master_cores: 1,
            master_memory: "10GiB".into(),
        }
    }
}

impl ClusterSizing {
    /// Reject sizings the cluster manager could never satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterCreate`] (no status) for a zero count or core
    /// number, or an empty memory string.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |detail: String| Error::ClusterCreate {
            status: None,
            detail,
        };
        for (name, value) in [
            ("worker_count", self.worker_count),
            ("worker_cores", self.worker_cores),
            ("master_cores", self.master_cores),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be a positive integer")));
            }
        }
        for (name, value) in [
            ("worker_memory", &self.worker_memory),
            ("master_memory", &self.master_memory),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Per-session sizing. Unset fields fall back to [`ClusterSizing`] defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterOverrides {
    pub worker_count: Option<u32>,
    pub worker_cores: Option<u32>,
    pub worker_memory: Option<String>,
    pub master_cores: Option<u32>,
    pub master_memory: Option<String>,
}

impl ClusterOverrides {
    /// Merge onto `defaults`, field by field.
    #[must_use]
    pub fn resolve(&self, defaults: &ClusterSizing) -> ClusterSizing {
        ClusterSizing {
            worker_count: self.worker_count.unwrap_or(defaults.worker_count),
            worker_cores: self.worker_cores.unwrap_or(defaults.worker_cores),
            worker_memory: self
                .worker_memory
                .clone()
                .unwrap_or_else(|| defaults.worker_memory.clone()),
            master_cores: self.master_cores.unwrap_or(defaults.master_cores),
            master_memory: self
                .master_memory
                .clone()
                .unwrap_or_else(|| defaults.master_memory.clone()),
        }
    }
}

/// Cluster manager configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClusterManagerConfig {
    pub(crate) base_url: Url,
    pub(crate) defaults: ClusterSizing,
    pub(crate) timeout: Duration,
}

impl ClusterManagerConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            defaults: ClusterSizing::default(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: ClusterSizing) -> Self {
        self.defaults = defaults;
        self
    }

    /// Upper bound for one create or delete request.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn defaults(&self) -> &ClusterSizing {
        &self.defaults
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/clusters`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the joined URL does not parse.
    pub fn clusters_url(&self) -> Result<Url, Error> {
        let raw = format!("{}/clusters", self.base_url.as_str().trim_end_matches('/'));
        raw.parse()
            .map_err(|e| Error::Config(format!("cluster manager URL {raw}: {e}")))
    }
}

#[derive(Deserialize)]
struct CreateClusterResponse {
    #[serde(default)]
    master_url: Option<String>,
}

/// Client for the cluster manager.
///
/// Clusters are keyed remotely on the identity behind the bearer token, so
/// delete needs no handle. Create always asks for force-replace, which makes
/// it idempotent across session restarts.
#[derive(Debug, Clone)]
pub struct ClusterManagerClient {
    config: ClusterManagerConfig,
    http: reqwest::Client,
}

impl ClusterManagerClient {
    #[must_use]
    pub fn new(config: ClusterManagerConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClusterManagerConfig {
        &self.config
    }

    /// Create (or replace) the caller's cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterCreate`] when the sizing is invalid, on
    /// transport failure or timeout, on any status other than 201, or when
    /// the body has no non-empty `master_url`.
    pub async fn create_cluster(
        &self,
        token: &AuthToken,
        overrides: &ClusterOverrides,
    ) -> Result<ClusterHandle, Error> {
        let sizing = overrides.resolve(&self.config.defaults);
        sizing.validate()?;

        let mut url = self.config.clusters_url().map_err(|e| Error::ClusterCreate {
            status: None,
            detail: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("force", "true");
        tracing::debug!(url = %url, sizing = ?sizing, "Requesting cluster creation");

        let response = self
            .http
            .post(url)
            .bearer_auth(token.expose())
            .json(&sizing)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| Error::ClusterCreate {
                status: None,
                detail: transport_detail(&e, self.config.timeout),
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::ClusterCreate {
                status: Some(status.as_u16()),
                detail,
            });
        }

        let body = response
            .json::<CreateClusterResponse>()
            .await
            .map_err(|e| Error::ClusterCreate {
                status: Some(status.as_u16()),
                detail: format!("malformed create response: {e}"),
            })?;

        match body.master_url {
            Some(master_url) if !master_url.trim().is_empty() => Ok(ClusterHandle { master_url }),
            _ => Err(Error::ClusterCreate {
                status: Some(status.as_u16()),
                detail: "master_url not found in response".into(),
            }),
        }
    }

    /// Delete the caller's cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterDelete`] on transport failure or timeout, or
    /// on any status other than 200/204.
    pub async fn delete_cluster(&self, token: &AuthToken) -> Result<(), Error> {
        let url = self.config.clusters_url().map_err(|e| Error::ClusterDelete {
            status: None,
            detail: e.to_string(),
        })?;
        tracing::debug!(url = %url, "Requesting cluster deletion");

        let response = self
            .http
            .delete(url)
            .bearer_auth(token.expose())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| Error::ClusterDelete {
                status: None,
                detail: transport_detail(&e, self.config.timeout),
            })?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => {
                let detail = response.text().await.unwrap_or_default();
                Err(Error::ClusterDelete {
                    status: Some(status.as_u16()),
                    detail,
                })
            }
        }
    }
}
