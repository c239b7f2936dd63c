use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::models::{CodeComment, CodePost};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser, OwnerUser};
use crate::state::AppState;

// --- View structs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePostView {
    pub id: String,
    pub title: String,
    pub language: String,
    pub description: String,
    pub code: String,
    pub timestamp: i64,
    pub author: String,
    pub like_count: usize,
    pub liked: bool,
    pub comment_count: usize,
}

#[derive(Serialize)]
pub struct CodeCommentView {
    pub id: String,
    #[serde(flatten)]
    pub comment: CodeComment,
}

// --- Request bodies ---

#[derive(Deserialize)]
pub struct CodePostInput {
    pub title: String,
    pub language: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
}

#[derive(Deserialize)]
pub struct CommentInput {
    pub text: String,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/codes", get(list_posts).post(create_post))
        .route("/codes/{id}", put(update_post).delete(delete_post))
        .route("/codes/{id}/like", post(toggle_like))
        .route("/codes/{id}/comments", get(list_comments).post(create_comment))
}

// --- Handlers ---

/// GET /codes — every post, newest first, with the reaction summary
/// the board renders.
async fn list_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Json<Vec<CodePostView>>> {
    let viewer = user.map(|u| u.id);
    let mut posts = Vec::new();
    for (id, value) in state.store.children("codes")? {
        match view_from_value(&id, &value, viewer.as_deref()) {
            Some(view) => posts.push(view),
            // A row that is not a post record (partial write, stray
            // leaf) is skipped rather than failing the whole board.
            None => tracing::warn!("skipping malformed post at codes/{}", id),
        }
    }
    // Push keys are time-ordered, so reversing gives newest-first.
    posts.reverse();
    Ok(Json(posts))
}

/// POST /codes — owner only.
async fn create_post(
    State(state): State<AppState>,
    OwnerUser(owner): OwnerUser,
    Json(input): Json<CodePostInput>,
) -> AppResult<Response> {
    let post = validate_post(input, owner.display_name)?;
    let id = state.store.push("codes", &serde_json::to_value(&post)?)?;
    tracing::info!("code post {} created", id);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// PUT /codes/{id} — owner only. Merges the editable fields so likes
/// and comments under the post survive the edit.
async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OwnerUser(owner): OwnerUser,
    Json(input): Json<CodePostInput>,
) -> AppResult<Json<Value>> {
    let path = post_path(&id)?;
    if !state.store.exists(&path)? {
        return Err(AppError::NotFound);
    }
    let post = validate_post(input, owner.display_name)?;
    let fields = match serde_json::to_value(&post)? {
        Value::Object(map) => map,
        _ => unreachable!("struct serializes to an object"),
    };
    state.store.merge(&path, &fields)?;
    Ok(Json(json!({ "id": id })))
}

/// DELETE /codes/{id} — owner only, takes likes and comments with it.
async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OwnerUser(_): OwnerUser,
) -> AppResult<Json<Value>> {
    if !state.store.remove(&post_path(&id)?)? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "deleted": true })))
}

/// POST /codes/{id}/like — idempotent toggle for the signed-in user.
async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    let path = post_path(&id)?;
    if !state.store.exists(&path)? {
        return Err(AppError::NotFound);
    }

    let like_path = format!("{}/likes/{}", path, user.id);
    let liked = if state.store.exists(&like_path)? {
        state.store.remove(&like_path)?;
        false
    } else {
        let now = chrono::Utc::now().timestamp_millis();
        state.store.set(&like_path, &json!(now))?;
        true
    };

    let count = state.store.children(&format!("{}/likes", path))?.len();
    Ok(Json(json!({ "liked": liked, "count": count })))
}

/// GET /codes/{id}/comments — oldest first, as threads read.
async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<CodeCommentView>>> {
    let path = post_path(&id)?;
    if !state.store.exists(&path)? {
        return Err(AppError::NotFound);
    }

    let mut comments = Vec::new();
    for (comment_id, value) in state.store.children(&format!("{}/comments", path))? {
        if let Ok(comment) = serde_json::from_value::<CodeComment>(value) {
            comments.push(CodeCommentView { id: comment_id, comment });
        }
    }
    Ok(Json(comments))
}

/// POST /codes/{id}/comments — any signed-in user. Identity comes from
/// the session, not the request body.
async fn create_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    Json(input): Json<CommentInput>,
) -> AppResult<Response> {
    let text = input.text.trim().to_string();
    if text.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }
    let path = post_path(&id)?;
    if !state.store.exists(&path)? {
        return Err(AppError::NotFound);
    }

    let comment = CodeComment {
        text,
        uid: user.id,
        username: user.username,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    let comment_id = state
        .store
        .push(&format!("{}/comments", path), &serde_json::to_value(&comment)?)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": comment_id })),
    )
        .into_response())
}

// --- Helpers ---

fn post_path(id: &str) -> AppResult<String> {
    crate::store::path::validate(&format!("codes/{}", id))?;
    Ok(format!("codes/{}", id))
}

fn validate_post(input: CodePostInput, author: String) -> AppResult<CodePost> {
    let title = input.title.trim().to_string();
    let code = input.code.trim_end().to_string();
    if title.is_empty() || input.language.trim().is_empty() || code.is_empty() {
        return Err(AppError::BadRequest(
            "Title, language and code are required".into(),
        ));
    }
    Ok(CodePost {
        title,
        language: input.language.trim().to_string(),
        description: input.description.trim().to_string(),
        code,
        timestamp: chrono::Utc::now().timestamp_millis(),
        author,
    })
}

fn view_from_value(id: &str, value: &Value, viewer: Option<&str>) -> Option<CodePostView> {
    let obj = value.as_object()?;
    let likes = obj
        .get("likes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let comment_count = obj
        .get("comments")
        .and_then(Value::as_object)
        .map(|m| m.len())
        .unwrap_or(0);

    Some(CodePostView {
        id: id.to_string(),
        title: obj.get("title")?.as_str()?.to_string(),
        language: obj.get("language").and_then(Value::as_str).unwrap_or("").to_string(),
        description: obj
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        code: obj.get("code").and_then(Value::as_str).unwrap_or("").to_string(),
        timestamp: obj.get("timestamp").and_then(Value::as_i64).unwrap_or(0),
        author: obj.get("author").and_then(Value::as_str).unwrap_or("").to_string(),
        like_count: likes.len(),
        liked: viewer.map(|uid| likes.contains_key(uid)).unwrap_or(false),
        comment_count,
    })
}
