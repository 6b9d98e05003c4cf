//! API Key authentication.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that validates requests against per-owner API keys.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
///
/// The identity's user id is the owner the key belongs to.
pub struct ApiKeyAuthenticator {
    /// Owner id → key.
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }

    /// Extract API key from request headers.
    /// Checks Authorization: Bearer and X-API-Key headers.
    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        // Check Authorization: Bearer <key>
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header.strip_prefix("Bearer ") {
                return Some(key.to_string());
            }
            // Also support lowercase
            if let Some(key) = auth_header.strip_prefix("bearer ") {
                return Some(key.to_string());
            }
        }

        // Check X-API-Key header
        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.clone());
        }

        None
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Every key is compared so the lookup time does not depend on which owner matched.
        let mut owner = None;
        for (owner_id, key) in &self.keys {
            if constant_time_eq(provided_key.as_bytes(), key.as_bytes()) {
                owner = Some(owner_id);
            }
        }

        match owner {
            Some(owner_id) => Ok(Identity {
                user_id: owner_id.clone(),
                method: "api_key".to_string(),
            }),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn authenticator() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new(HashMap::from([
            ("alice".to_string(), "secret-key-123".to_string()),
            ("bob".to_string(), "other-key-456".to_string()),
        ]))
    }

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_bearer_token_valid() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "Bearer secret-key-123")]);

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_x_api_key_header_valid() {
        let auth = authenticator();
        let request = make_request(vec![("X-API-Key", "secret-key-123")]);

        let identity = auth.authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "Bearer wrong-key")]);

        let result = auth.authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let auth = authenticator();
        let request = make_request(vec![]);

        let result = auth.authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_bearer_lowercase() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "bearer secret-key-123")]);

        let identity = auth.authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "alice");
    }

    #[tokio::test]
    async fn test_key_identifies_owner() {
        let auth = authenticator();
        let request = make_request(vec![("X-API-Key", "other-key-456")]);

        let identity = auth.authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "bob");
    }

    #[tokio::test]
    async fn test_key_for_other_owner_is_forbidden() {
        let auth = authenticator();
        let request = make_request(vec![("Authorization", "Bearer secret-key-123")]);

        let identity = auth.authenticate_owner(&request, "alice").await.unwrap();
        assert_eq!(identity.user_id, "alice");

        let err = auth.authenticate_owner(&request, "bob").await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
        assert_eq!(err.label(), "forbidden");
    }

    #[test]
    fn test_method_name() {
        let auth = authenticator();
        assert_eq!(auth.method_name(), "api_key");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }
}
