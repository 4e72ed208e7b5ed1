use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{debug, warn};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::session::{SESSION_COOKIE, SessionKeys};

/// Resolve the session token (Bearer header first, then cookie), validate it,
/// and hand the `Identity` to the handler as an extension. Tokens past the
/// refresh age are re-issued as a new cookie on the way out.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.sessions.claims(&token).ok_or(ApiError::Unauthorized)?;
    let identity = claims.identity();
    let refresh = SessionKeys::needs_refresh(&claims, Utc::now());

    req.extensions_mut().insert(identity.clone());
    let response = next.run(req).await;

    if !refresh {
        return Ok(response);
    }

    match state.sessions.mint(&identity) {
        Ok(token) => {
            debug!("Refreshed session for {}", identity.id);
            Ok((CookieJar::new().add(state.sessions.cookie(token)), response).into_response())
        }
        Err(e) => {
            warn!("Session refresh failed for {}: {}", identity.id, e);
            Ok(response)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
}
