//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::openai::Message;

// Errors

pub const APOLOGY: &str = "Sorry, I encountered an unexpected error. Please try again.";
pub const INVALID_USER_KEY: &str = "Invalid userKey.";
pub const INVALID_REQUEST: &str = "Invalid request body.";

pub enum ApiError {
    BadRequest(&'static str),
    Internal(anyhow::Error),
}

/// Convert `ApiError` into an Axum compatible response. Every error
/// has the same `{reply}` shape as a successful chat response so the
/// client can always show it.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reply) => {
                (StatusCode::BAD_REQUEST, Json(ChatResponse::new(reply))).into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!("API or logic error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ChatResponse::new(APOLOGY)),
                )
                    .into_response()
            }
        }
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` to turn them into `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

// Chat

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(rename = "userKey")]
    pub user_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub reply: String,
}

impl ChatResponse {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct ChatTranscriptResponse {
    pub transcript: Vec<Message>,
}
