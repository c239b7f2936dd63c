use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::ContactMessage;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, OwnerUser};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MessageInput {
    pub subject: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct MessageView {
    pub id: String,
    #[serde(flatten)]
    pub message: ContactMessage,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/{id}", delete(delete_message))
}

/// POST /messages — signed-in, verified senders only. Name and
/// username come from the account, never from the body, so the inbox
/// cannot be spoofed.
async fn create_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<MessageInput>,
) -> AppResult<Response> {
    if !user.verified {
        return Err(AppError::Forbidden(
            "Please verify your email to send messages".into(),
        ));
    }
    let subject = input.subject.trim().to_string();
    let body = input.message.trim().to_string();
    if subject.is_empty() || body.is_empty() {
        return Err(AppError::BadRequest("Please fill in all fields".into()));
    }

    let message = ContactMessage {
        name: user.display_name,
        username: user.username,
        subject,
        message: body,
        timestamp: chrono::Utc::now().timestamp_millis(),
        user_id: user.id,
    };
    let id = state
        .store
        .push("messages", &serde_json::to_value(&message)?)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// GET /messages — the owner's inbox, newest first.
async fn list_messages(
    State(state): State<AppState>,
    OwnerUser(_): OwnerUser,
) -> AppResult<Json<serde_json::Value>> {
    let mut messages = Vec::new();
    for (id, value) in state.store.children("messages")? {
        if let Ok(message) = serde_json::from_value::<ContactMessage>(value) {
            messages.push(MessageView { id, message });
        }
    }
    messages.reverse();
    Ok(Json(json!({
        "count": messages.len(),
        "messages": messages,
    })))
}

/// DELETE /messages/{id} — owner only.
async fn delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OwnerUser(_): OwnerUser,
) -> AppResult<Json<serde_json::Value>> {
    let path = format!("messages/{}", id);
    crate::store::path::validate(&path)?;
    if !state.store.remove(&path)? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "deleted": true })))
}
