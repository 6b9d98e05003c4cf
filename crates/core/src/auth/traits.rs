use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("{user_id} may not act for owner {owner_id}")]
    Forbidden { user_id: String, owner_id: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Metric label for failures.
    pub fn label(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::ConfigurationError(_) => "internal_error",
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request and return the identity
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Authenticate, then require the identity to act for `owner_id`.
    async fn authenticate_owner(
        &self,
        request: &AuthRequest,
        owner_id: &str,
    ) -> Result<Identity, AuthError> {
        let identity = self.authenticate(request).await?;
        if !identity.can_act_for(owner_id) {
            return Err(AuthError::Forbidden {
                user_id: identity.user_id,
                owner_id: owner_id.to_string(),
            });
        }
        Ok(identity)
    }

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}
