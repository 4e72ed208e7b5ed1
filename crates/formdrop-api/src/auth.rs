use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info};
use uuid::Uuid;

use formdrop_db::{Database, is_unique_violation};
use formdrop_types::api::{AuthResponse, LoginRequest, RegisterRequest, SessionResponse, StatusResponse};
use formdrop_types::models::Identity;

use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::mailer::Mailer;
use crate::session::SessionKeys;

const MIN_PASSWORD_LEN: usize = 8;

/// Verified against when the email is unknown, so a miss costs one Argon2
/// verification just like a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    hash_password("formdrop-dummy-password")
        .map_err(|e| error!("Failed to build dummy password hash: {}", e))
        .ok()
});

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub sessions: SessionKeys,
    pub mailer: Arc<dyn Mailer>,
    /// Public base URL, used to build each form's `requestUrl`.
    pub base_url: String,
}

/// Run a blocking closure (database work, password hashing) off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&*state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Check credentials. An unknown email and a wrong password fail the same way.
pub fn authenticate(db: &Database, email: &str, password: &str) -> Result<Identity, ApiError> {
    let user = if email.is_empty() {
        None
    } else {
        db.get_user_by_email(email)?
    };

    let Some(user) = user else {
        burn_verification(password);
        return Err(ApiError::InvalidCredentials);
    };

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Corrupt password hash for user {}: {}", user.id, e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", user.id, e))?;

    Ok(Identity {
        id,
        name: user.name,
        email: user.email,
    })
}

pub fn register_user(db: &Database, name: &str, email: &str, password: &str) -> Result<Identity, ApiError> {
    let name = name.trim();
    let email = email.trim();

    if name.is_empty() || email.is_empty() {
        return Err(ApiError::validation("Name and email are required"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation("Password must be at least 8 characters"));
    }

    if db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::EmailTaken);
    }

    let password_hash = hash_password(password)?;
    let id = Uuid::new_v4();

    // The UNIQUE index still decides if two registrations race.
    db.create_user(&id.to_string(), name, email, &password_hash)
        .map_err(|e| if is_unique_violation(&e) { ApiError::EmailTaken } else { ApiError::Internal(e) })?;

    Ok(Identity {
        id,
        name: name.to_string(),
        email: email.to_string(),
    })
}

fn burn_verification(password: &str) {
    let Some(hash) = DUMMY_HASH.as_deref() else {
        return;
    };
    if let Ok(parsed) = PasswordHash::new(hash) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = blocking(&state, move |s| {
        register_user(&s.db, &req.name, &req.email, &req.password)
    })
    .await?;

    let token = state.sessions.mint(&identity)?;
    info!("Registered user {}", identity.id);

    Ok((
        StatusCode::CREATED,
        jar.add(state.sessions.cookie(token.clone())),
        Json(AuthResponse { user: identity, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = blocking(&state, move |s| authenticate(&s.db, &req.email, &req.password)).await?;

    let token = state.sessions.mint(&identity)?;
    info!("User {} signed in", identity.id);

    Ok((
        jar.add(state.sessions.cookie(token.clone())),
        Json(AuthResponse { user: identity, token }),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.sessions.removal_cookie()),
        Json(StatusResponse::ok("Signed out")),
    )
}

pub async fn session(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(SessionResponse { user: identity })
}
