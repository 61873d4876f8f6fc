//! Session authentication middleware

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use super::{ApiError, ApiState};

/// Cookie carrying the identity provider's session token
pub const SESSION_COOKIE: &str = "__session";

/// Id of the user behind the request's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

/// Session token from the session cookie or a bearer header
fn extract_session_token(req: &Request) -> Option<&str> {
    let from_cookie = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value);

    from_cookie
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .filter(|token| !token.is_empty())
}

/// Middleware that admits only requests with a valid session
pub async fn require_session(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(identity) = &state.identity else {
        tracing::debug!("no identity provider, refusing request");
        return Err(ApiError::Unauthorized);
    };

    let Some(token) = extract_session_token(&req) else {
        tracing::debug!("no session token provided");
        return Err(ApiError::Unauthorized);
    };

    let user_id = match identity.verify_session(token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            tracing::debug!("invalid session token");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => {
            tracing::warn!(error = %e, provider = identity.name(), "session verification failed");
            return Err(ApiError::Unauthorized);
        }
    };

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
