use crate::error::Error;
use crate::session::Session;
use crate::types::AuthToken;

/// Auth-state field holding the delegated token unless configured otherwise.
pub const DEFAULT_TOKEN_FIELD: &str = "kbase_token";

/// Reads the delegated identity token out of a session's auth state.
///
/// Fails closed: a missing state, a missing field, a non-string value or an
/// blank string is an error, never a fallback token. Each lifecycle
/// transition resolves independently.
#[derive(Debug, Clone)]
pub struct AuthTokenResolver {
    token_field: String,
}

impl Default for AuthTokenResolver {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_FIELD)
    }
}

impl AuthTokenResolver {
    #[must_use]
    pub fn new(token_field: impl Into<String>) -> Self {
        Self {
            token_field: token_field.into(),
        }
    }

    #[must_use]
    pub fn token_field(&self) -> &str {
        &self.token_field
    }

    /// Resolve the session's token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] when no usable token is recorded.
    pub fn resolve(&self, session: &Session) -> Result<AuthToken, Error> {
        let Some(auth_state) = session.auth_state.as_ref() else {
            tracing::error!(username = %session.username, "Auth state not found for user");
            return Err(Error::MissingCredential(
                "authentication state is missing".into(),
            ));
        };

        match auth_state.get(&self.token_field).and_then(|v| v.as_str()) {
            Some(token) if !token.trim().is_empty() => Ok(AuthToken::new(token)),
            _ => {
                tracing::error!(
                    username = %session.username,
                    field = %self.token_field,
                    "Token not found in auth state"
                );
                Err(Error::MissingCredential(format!(
                    "authentication token is missing from auth state field '{}'",
                    self.token_field
                )))
            }
        }
    }
}
