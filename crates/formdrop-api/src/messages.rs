use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use formdrop_db::models::{FormRow, MessageRow, NewMessage};
use formdrop_db::{Database, parse_timestamp};
use formdrop_types::api::{MessageView, ReplyRequest, StatusResponse, SubmitMessageRequest};
use formdrop_types::models::{Identity, Message};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::extract::{JsonBody, SubmissionBody};
use crate::forms::parse_uuid;
use crate::mailer::escape_html;

pub const REPLY_SUBJECT: &str = "Reply to Your Submission";

/// Store a public submission. The form is looked up by its public token only.
/// An unknown form wins over blank fields; nothing is stored on either error.
pub fn submit_message(
    db: &Database,
    unique_id: &str,
    req: &SubmitMessageRequest,
) -> Result<(FormRow, Message), ApiError> {
    let name = req.name.trim();
    let email = req.email.trim();
    let body = req.message.trim();

    if name.is_empty() || email.is_empty() || body.is_empty() {
        if db.get_form_by_unique_id(unique_id)?.is_none() {
            return Err(ApiError::NotFound);
        }
        return Err(ApiError::validation("Name, email, and message are required"));
    }

    let id = Uuid::new_v4().to_string();
    let new = NewMessage {
        id: &id,
        name,
        email,
        message: body,
    };

    let (form, row) = db
        .insert_message_for_form(unique_id, &new)?
        .ok_or(ApiError::NotFound)?;

    Ok((form, message_from_row(row)?))
}

pub fn list_messages_for_owner(
    db: &Database,
    owner_id: Uuid,
    form_id: &str,
) -> Result<Vec<MessageView>, ApiError> {
    db.get_messages_for_form(form_id, &owner_id.to_string())?
        .into_iter()
        .map(|row| -> Result<MessageView, ApiError> {
            Ok(MessageView {
                id: parse_uuid(&row.id)?,
                created_at: parse_timestamp(&row.created_at)?,
                name: row.name,
                email: row.email,
                message: row.message,
            })
        })
        .collect()
}

/// The message to reply to, provided its parent form belongs to `owner_id`.
pub fn find_reply_target(db: &Database, owner_id: Uuid, message_id: &str) -> Result<Message, ApiError> {
    let row = db
        .get_message_for_owner(message_id, &owner_id.to_string())?
        .ok_or(ApiError::NotFound)?;
    message_from_row(row)
}

fn message_from_row(row: MessageRow) -> Result<Message, ApiError> {
    Ok(Message {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        form_id: parse_uuid(&row.form_id)?,
        created_at: parse_timestamp(&row.created_at)?,
        name: row.name,
        email: row.email,
        message: row.message,
    })
}

pub fn submission_subject(form_name: &str) -> String {
    format!("New submission: {}", form_name)
}

pub fn submission_html(message: &Message) -> String {
    format!(
        "<p><strong>Name:</strong> {}</p><p><strong>Email:</strong> {}</p><p>{}</p>",
        escape_html(&message.name),
        escape_html(&message.email),
        escape_html(&message.message),
    )
}

pub fn reply_html(reply_text: &str) -> String {
    format!("<p>{}</p>", escape_html(reply_text))
}

// -- Handlers --

/// Backs both `POST /forms/{unique_id}/messages` and the public
/// `POST /api/form/{unique_id}` URL handed out as `requestUrl`. Accepts
/// urlencoded and multipart bodies.
pub async fn submit(
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
    SubmissionBody(req): SubmissionBody,
) -> Result<impl IntoResponse, ApiError> {
    let (form, message) = blocking(&state, move |s| submit_message(&s.db, &unique_id, &req)).await?;

    info!("Message {} stored for form {}", message.id, form.unique_id);

    // Forwarding is best-effort: the submission is already stored.
    if let Err(e) = state
        .mailer
        .send(&form.email, &submission_subject(&form.name), &submission_html(&message))
        .await
    {
        warn!("Failed to forward message {} to {}: {}", message.id, form.email, e);
    }

    Ok((
        StatusCode::CREATED,
        Json(StatusResponse::ok("Message submitted successfully")),
    ))
}

pub async fn reply(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Extension(identity): Extension<Identity>,
    JsonBody(req): JsonBody<ReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply_text = req.reply_text.trim().to_string();
    if reply_text.is_empty() {
        return Err(ApiError::validation("Reply text is required"));
    }

    let target = blocking(&state, move |s| find_reply_target(&s.db, identity.id, &message_id)).await?;

    state
        .mailer
        .send(&target.email, REPLY_SUBJECT, &reply_html(&reply_text))
        .await
        .map_err(ApiError::SendFailed)?;

    info!("Reply sent for message {}", target.id);

    Ok(Json(StatusResponse::ok("Reply sent successfully.")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::create_form;

    fn setup() -> (Database, Uuid, String) {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        db.create_user(&owner.to_string(), "Owner", "owner@x.com", "hash").unwrap();
        let form = create_form(&db, owner, "Contact", "a@x.com", "http://localhost").unwrap();
        (db, owner, form.unique_id.to_string())
    }

    fn request(name: &str, email: &str, message: &str) -> SubmitMessageRequest {
        SubmitMessageRequest {
            name: name.into(),
            email: email.into(),
            message: message.into(),
        }
    }

    #[test]
    fn submission_inherits_form_owner() {
        let (db, owner, uid) = setup();
        let (form, message) = submit_message(&db, &uid, &request(" Bob ", "bob@y.com", "hi")).unwrap();
        assert_eq!(message.user_id, owner);
        assert_eq!(message.form_id.to_string(), form.id);
        assert_eq!(message.name, "Bob");
    }

    #[test]
    fn blank_fields_store_nothing() {
        let (db, owner, uid) = setup();
        let form = db.get_form_by_unique_id(&uid).unwrap().unwrap();

        for req in [
            request("  ", "bob@y.com", "hi"),
            request("Bob", "", "hi"),
            request("Bob", "bob@y.com", " \n\t "),
        ] {
            let err = submit_message(&db, &uid, &req).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }

        assert!(list_messages_for_owner(&db, owner, &form.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_form_beats_validation() {
        let (db, _, _) = setup();
        let err = submit_message(&db, "nope", &request("", "", "")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[test]
    fn reply_target_must_belong_to_caller() {
        let (db, owner, uid) = setup();
        let (_, message) = submit_message(&db, &uid, &request("Bob", "bob@y.com", "hi")).unwrap();
        let stranger = Uuid::new_v4();

        let found = find_reply_target(&db, owner, &message.id.to_string()).unwrap();
        assert_eq!(found.email, "bob@y.com");
        assert!(matches!(
            find_reply_target(&db, stranger, &message.id.to_string()),
            Err(ApiError::NotFound)
        ));
    }

    #[test]
    fn outgoing_html_is_escaped() {
        assert_eq!(reply_html("<script>"), "<p>&lt;script&gt;</p>");
    }
}
