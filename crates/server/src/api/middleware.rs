//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Extensions, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use screenflow_core::{AuthError, AuthRequest, Identity};

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// This middleware extracts credentials from request headers and validates them
/// against the authenticator configured in AppState. If authentication fails,
/// it returns a 401 Unauthorized response.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    // Skip auth check if using NoneAuthenticator, but still insert anonymous identity
    if authenticator.method_name() == "none" {
        let mut request = request;
        request.extensions_mut().insert(Identity::anonymous());
        return Ok(next.run(request).await);
    }

    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let auth_request = AuthRequest {
        headers,
        source_ip: source_ip(request.extensions()),
    };

    match authenticator.authenticate(&auth_request).await {
        Ok(identity) => {
            // Authentication successful, insert identity and continue to the handler
            let mut request = request;
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            AUTH_FAILURES_TOTAL.with_label_values(&[e.label()]).inc();
            match e {
                AuthError::NotAuthenticated | AuthError::InvalidCredentials(_) => {
                    Err(StatusCode::UNAUTHORIZED)
                }
                AuthError::Forbidden { .. } => Err(StatusCode::FORBIDDEN),
                AuthError::ConfigurationError(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

/// Client address recorded by `into_make_service_with_connect_info`, or localhost.
pub fn source_ip(extensions: &Extensions) -> IpAddr {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Extractor for the authenticated identity.
///
/// Falls back to the anonymous identity if none is present (shouldn't happen
/// if auth middleware is properly configured).
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

impl AuthUser {
    /// Owner id to act as. Anonymous callers name the owner themselves
    /// (`"anonymous"` when they don't); authenticated callers always act as
    /// themselves and may not name someone else.
    pub fn owner_for(&self, requested: Option<&str>) -> Result<String, StatusCode> {
        let identity = &self.0;
        match requested {
            Some(owner) if identity.can_act_for(owner) => Ok(owner.to_string()),
            Some(_) => Err(StatusCode::FORBIDDEN),
            None => Ok(identity.user_id.clone()),
        }
    }

    /// Whether the caller may see or change a resource owned by `owner_id`.
    pub fn owns(&self, owner_id: &str) -> bool {
        self.0.can_act_for(owner_id)
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .unwrap_or_else(Identity::anonymous);
        std::future::ready(Ok(AuthUser(identity)))
    }
}
