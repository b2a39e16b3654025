use std::time::Duration;

use reqwest::StatusCode;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::types::{AuthToken, CredentialSet};

/// Governance service configuration.
///
/// The storage endpoint and transport flag are static per deployment and
/// passed through untouched; only the key pair is fetched remotely.
///
/// ```rust,ignore
/// let config = GovernanceConfig::new(
///     "https://governance.internal".parse()?,
///     "minio.internal:9000",
/// )
/// .with_secure(false)
/// .with_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GovernanceConfig {
    pub(crate) base_url: Url,
    pub(crate) storage_endpoint: String,
    pub(crate) secure: bool,
    pub(crate) timeout: Duration,
}

impl GovernanceConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    #[must_use]
    pub fn new(base_url: Url, storage_endpoint: impl Into<String>) -> Self {
        Self {
            base_url,
            storage_endpoint: storage_endpoint.into(),
            secure: true,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Whether clients should reach object storage over TLS (default: `true`).
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Upper bound for one credential request.
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
    pub fn storage_endpoint(&self) -> &str {
        &self.storage_endpoint
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `{base}/credentials/`
    #[must_use]
    pub fn credentials_url(&self) -> String {
        format!("{}/credentials/", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct CredentialResponse {
    access_key: String,
    secret_key: String,
}

/// Client for the governance credential endpoint.
///
/// One request per call and no retries. Safe to share across sessions;
/// the inner `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct GovernanceClient {
    config: GovernanceConfig,
    http: reqwest::Client,
}

impl GovernanceClient {
    #[must_use]
    pub fn new(config: GovernanceConfig) -> Self {
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
    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    /// Exchange a bearer token for object-storage credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialFetch`] on transport failure or timeout, on
    /// any status other than 200, or when the body lacks `access_key` or
    /// `secret_key`.
    pub async fn fetch_credentials(&self, token: &AuthToken) -> Result<CredentialSet, Error> {
        let url = self.config.credentials_url();
        tracing::debug!(url = %url, "Requesting storage credentials");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose())
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| Error::CredentialFetch {
                status: None,
                detail: transport_detail(&e, self.config.timeout),
            })?;

        if response.status() != StatusCode::OK {
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::CredentialFetch {
                status: Some(status),
                detail,
            });
        }

        let body = response
            .json::<CredentialResponse>()
            .await
            .map_err(|e| Error::CredentialFetch {
                status: Some(StatusCode::OK.as_u16()),
                detail: format!("malformed credential response: {e}"),
            })?;

        Ok(CredentialSet {
            access_key: body.access_key,
            secret_key: SecretString::from(body.secret_key),
            endpoint: self.config.storage_endpoint.clone(),
            secure: self.config.secure,
        })
    }
}

/// Describe a request that never produced a response.
pub(crate) fn transport_detail(err: &reqwest::Error, timeout: Duration) -> String {
    if err.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs_f64())
    } else {
        err.to_string()
    }
}
