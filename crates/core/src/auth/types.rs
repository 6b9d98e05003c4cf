use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// A request carrying only a bearer credential, as WebSocket clients
    /// pass it in the query string.
    pub fn bearer(token: &str, source_ip: IpAddr) -> Self {
        Self {
            headers: HashMap::from([("authorization".to_string(), format!("Bearer {}", token))]),
            source_ip,
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.method == "none"
    }

    /// Whether this identity may act on behalf of `owner_id`.
    /// Anonymous identities are trusted with any owner.
    pub fn can_act_for(&self, owner_id: &str) -> bool {
        self.is_anonymous() || self.user_id == owner_id
    }
}
