//! Body extractors whose rejections go through `ApiError`, so a bad body is a
//! JSON 400 like every other validation failure.

use axum::{
    Form,
    extract::{FromRequest, Multipart, Request},
    http::header,
};

use formdrop_types::api::SubmitMessageRequest;

use crate::error::ApiError;

/// `axum::Json` with the rejection mapped to `ApiError::Validation`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// A public submission, sent either urlencoded or as `multipart/form-data`.
/// Fields other than `name`, `email` and `message` are ignored.
#[derive(Debug)]
pub struct SubmissionBody(pub SubmitMessageRequest);

impl<S> FromRequest<S> for SubmissionBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let Form(body) = Form::<SubmitMessageRequest>::from_request(req, state).await?;
            return Ok(Self(body));
        }

        let mut multipart = Multipart::from_request(req, state).await?;
        let mut body = SubmitMessageRequest::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            let value = field.text().await?;
            match name.as_deref() {
                Some("name") => body.name = value,
                Some("email") => body.email = value,
                Some("message") => body.message = value,
                _ => {}
            }
        }

        Ok(Self(body))
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}
