use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use formdrop_db::models::FormRow;
use formdrop_db::{Database, format_timestamp, is_unique_violation, parse_timestamp};
use formdrop_types::api::{
    CreateFormRequest, CreateFormResponse, FormDetailResponse, FormListResponse, FormSummary,
    StatusResponse,
};
use formdrop_types::models::{Form, Identity};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::JsonBody;
use crate::messages::list_messages_for_owner;

/// Route prefix of the public submission endpoint. Baked into every stored
/// `requestUrl`, so it must not change.
pub const SUBMISSION_PATH: &str = "/api/form";

const MAX_ID_ATTEMPTS: usize = 3;

pub fn request_url(base_url: &str, unique_id: &Uuid) -> String {
    format!("{}{}/{}", base_url.trim_end_matches('/'), SUBMISSION_PATH, unique_id)
}

pub fn create_form(
    db: &Database,
    owner_id: Uuid,
    name: &str,
    email: &str,
    base_url: &str,
) -> Result<Form, ApiError> {
    create_form_with_ids(db, owner_id, name, email, base_url, Uuid::new_v4)
}

/// `create_form` with an injectable id source. A collision on `unique_id`
/// draws a fresh id and tries again.
pub fn create_form_with_ids(
    db: &Database,
    owner_id: Uuid,
    name: &str,
    email: &str,
    base_url: &str,
    mut next_id: impl FnMut() -> Uuid,
) -> Result<Form, ApiError> {
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(ApiError::validation("Name and email are required"));
    }

    for attempt in 1..=MAX_ID_ATTEMPTS {
        match insert_form(db, owner_id, name, email, base_url, next_id()) {
            Err(ApiError::Conflict) => {
                warn!("uniqueId collision on attempt {}, regenerating", attempt);
            }
            other => return other,
        }
    }

    Err(ApiError::Conflict)
}

fn insert_form(
    db: &Database,
    owner_id: Uuid,
    name: &str,
    email: &str,
    base_url: &str,
    unique_id: Uuid,
) -> Result<Form, ApiError> {
    let now = Utc::now();
    let form = Form {
        id: Uuid::new_v4(),
        unique_id,
        user_id: owner_id,
        name: name.to_string(),
        email: email.to_string(),
        request_url: request_url(base_url, &unique_id),
        created_at: now,
        updated_at: now,
    };

    let stamp = format_timestamp(now);
    let row = FormRow {
        id: form.id.to_string(),
        unique_id: unique_id.to_string(),
        user_id: owner_id.to_string(),
        name: form.name.clone(),
        email: form.email.clone(),
        request_url: form.request_url.clone(),
        created_at: stamp.clone(),
        updated_at: stamp,
    };

    db.insert_form(&row)
        .map_err(|e| if is_unique_violation(&e) { ApiError::Conflict } else { ApiError::Internal(e) })?;

    Ok(form)
}

pub fn list_forms(db: &Database, owner_id: Uuid) -> Result<Vec<FormSummary>, ApiError> {
    db.get_forms_for_user(&owner_id.to_string())?
        .into_iter()
        .map(|row| -> Result<FormSummary, ApiError> {
            Ok(FormSummary {
                unique_id: parse_uuid(&row.unique_id)?,
                created_at: parse_timestamp(&row.created_at)?,
                name: row.name,
                email: row.email,
                request_url: row.request_url,
            })
        })
        .collect()
}

/// Someone else's form reads exactly like a missing one.
pub fn get_form_with_messages(
    db: &Database,
    owner_id: Uuid,
    unique_id: &str,
) -> Result<FormDetailResponse, ApiError> {
    let form = db
        .get_form_for_owner(unique_id, &owner_id.to_string())?
        .ok_or(ApiError::NotFound)?;

    let messages = list_messages_for_owner(db, owner_id, &form.id)?;

    Ok(FormDetailResponse {
        request_url: form.request_url,
        messages,
    })
}

/// Returns how many messages went with the form.
pub fn delete_form(db: &Database, owner_id: Uuid, unique_id: &str) -> Result<usize, ApiError> {
    db.delete_form_for_owner(unique_id, &owner_id.to_string())?
        .ok_or(ApiError::NotFound)
}

pub(crate) fn parse_uuid(raw: &str) -> anyhow::Result<Uuid> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Corrupt id '{}': {}", raw, e))
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(req): JsonBody<CreateFormRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let form = blocking(&state, move |s| {
        create_form(&s.db, identity.id, &req.name, &req.email, &s.base_url)
    })
    .await?;

    info!("Form {} created by {}", form.unique_id, form.user_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateFormResponse {
            message: "Form created successfully".into(),
            form,
        }),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let forms = blocking(&state, move |s| list_forms(&s.db, identity.id)).await?;

    Ok(Json(FormListResponse {
        forms,
        message: "Forms fetched successfully".into(),
    }))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(&state, move |s| {
        get_form_with_messages(&s.db, identity.id, &unique_id)
    })
    .await?;

    Ok(Json(detail))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = unique_id.clone();
    let removed = blocking(&state, move |s| delete_form(&s.db, identity.id, &uid)).await?;

    info!("Form {} deleted with {} messages", unique_id, removed);

    Ok(Json(StatusResponse::ok(
        "Form and associated messages deleted successfully",
    )))
}
