// Page content overrides for the owner's in-place editor. Each page
// has a map of edit-id -> HTML string; pristine markup is whatever the
// map does not override.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::extractors::OwnerUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/content/{page}", get(get_page).put(put_page).delete(reset_page))
        .route("/content/{page}/{edit_id}", put(put_override))
}

/// Edit ids key overrides to DOM positions. The client derives them as
/// `edit-{selector stripped to its lowercase letters}-{element index}`;
/// the scheme must stay stable or saved overrides detach from their
/// elements, so anything else is rejected.
fn is_valid_edit_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("edit-") else {
        return false;
    };
    let Some((selector, index)) = rest.rsplit_once('-') else {
        return false;
    };
    selector.chars().all(|c| c.is_ascii_lowercase())
        && !index.is_empty()
        && index.chars().all(|c| c.is_ascii_digit())
}

fn page_path(page: &str) -> AppResult<String> {
    let path = format!("pageContent/{}", page);
    crate::store::path::validate(&path)?;
    Ok(path)
}

/// GET /content/{page} — the full override map; `{}` when untouched.
async fn get_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> AppResult<Json<Value>> {
    let map = state
        .store
        .get(&page_path(&page)?)?
        .unwrap_or_else(|| json!({}));
    Ok(Json(map))
}

/// PUT /content/{page}/{edit_id} — one override, last writer wins.
async fn put_override(
    State(state): State<AppState>,
    Path((page, edit_id)): Path<(String, String)>,
    OwnerUser(_): OwnerUser,
    Json(html): Json<String>,
) -> AppResult<Json<Value>> {
    if !is_valid_edit_id(&edit_id) {
        return Err(AppError::BadRequest("Invalid edit id".into()));
    }
    let path = format!("{}/{}", page_path(&page)?, edit_id);
    state.store.set(&path, &json!(html))?;
    Ok(Json(json!({ "saved": true })))
}

/// PUT /content/{page} — the editor's "save all": replaces the page
/// map wholesale.
async fn put_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
    OwnerUser(_): OwnerUser,
    Json(overrides): Json<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let mut map = Map::new();
    for (id, html) in overrides {
        if !is_valid_edit_id(&id) {
            return Err(AppError::BadRequest("Invalid edit id".into()));
        }
        map.insert(id, json!(html));
    }
    let count = map.len();
    state.store.set(&page_path(&page)?, &Value::Object(map))?;
    Ok(Json(json!({ "saved": count })))
}

/// DELETE /content/{page} — discard every override, back to pristine.
async fn reset_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
    OwnerUser(_): OwnerUser,
) -> AppResult<Json<Value>> {
    let removed = state.store.remove(&page_path(&page)?)?;
    Ok(Json(json!({ "reset": removed })))
}
