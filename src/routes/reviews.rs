use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::models::Review;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

const MIN_REVIEW_LEN: usize = 10;

#[derive(Deserialize)]
pub struct ReviewInput {
    pub text: String,
    pub rating: Option<i64>,
}

#[derive(Serialize)]
pub struct ReviewView {
    pub id: String,
    #[serde(flatten)]
    pub review: Review,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/reviews/{id}", put(update_review).delete(delete_review))
}

/// Shared validation for create and edit: trimmed text with a length
/// floor, rating defaulting to five stars.
fn validate_review(input: &ReviewInput) -> AppResult<(String, i64)> {
    let text = input.text.trim().to_string();
    if text.chars().count() < MIN_REVIEW_LEN {
        return Err(AppError::BadRequest(
            "Review must be at least 10 characters".into(),
        ));
    }
    let rating = input.rating.unwrap_or(5);
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }
    Ok((text, rating))
}

/// GET /reviews — newest first by their timestamp field. Older records
/// were not push-keyed, so key order cannot be trusted here.
async fn list_reviews(State(state): State<AppState>) -> AppResult<Json<Vec<ReviewView>>> {
    let mut reviews = Vec::new();
    for (id, value) in state.store.children("reviews")? {
        if let Ok(review) = serde_json::from_value::<Review>(value) {
            reviews.push(ReviewView { id, review });
        }
    }
    reviews.sort_by(|a, b| b.review.timestamp.cmp(&a.review.timestamp));
    Ok(Json(reviews))
}

/// POST /reviews — signed-in, verified users.
async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<ReviewInput>,
) -> AppResult<Response> {
    if !user.verified {
        return Err(AppError::Forbidden(
            "Please verify your email to post a review".into(),
        ));
    }
    let (text, rating) = validate_review(&input)?;

    let review = Review {
        name: user.display_name,
        username: user.username,
        text,
        rating,
        timestamp: chrono::Utc::now().timestamp_millis(),
        user_id: user.id,
        edited_at: None,
    };
    let id = state.store.push("reviews", &serde_json::to_value(&review)?)?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))).into_response())
}

/// PUT /reviews/{id} — the original author only.
async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
    Json(input): Json<ReviewInput>,
) -> AppResult<Json<Value>> {
    let path = format!("reviews/{}", id);
    crate::store::path::validate(&path)?;
    let existing = state.store.get(&path)?.ok_or(AppError::NotFound)?;
    let author = existing
        .get("userId")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if author != user.id {
        return Err(AppError::Forbidden(
            "You can only edit your own reviews".into(),
        ));
    }

    let (text, rating) = validate_review(&input)?;
    let fields = json!({
        "text": text,
        "rating": rating,
        "editedAt": chrono::Utc::now().timestamp_millis(),
    });
    let fields = match fields {
        Value::Object(map) => map,
        _ => unreachable!("literal is an object"),
    };
    state.store.merge(&path, &fields)?;
    Ok(Json(json!({ "id": id })))
}

/// DELETE /reviews/{id} — moderation is the owner's alone; authors
/// cannot retract a published review.
async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> AppResult<Json<Value>> {
    if !user.is_owner {
        return Err(AppError::Forbidden("You cannot delete this review".into()));
    }
    let path = format!("reviews/{}", id);
    crate::store::path::validate(&path)?;
    if !state.store.remove(&path)? {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: &str, rating: Option<i64>) -> ReviewInput {
        ReviewInput {
            text: text.to_string(),
            rating,
        }
    }

    #[test]
    fn length_floor_counts_characters_not_bytes() {
        // Nine characters fail regardless of how many bytes they take.
        assert!(validate_review(&input("123456789", None)).is_err());
        assert!(validate_review(&input("很好很好很好很好很", None)).is_err());

        // Ten characters pass, multibyte included.
        assert!(validate_review(&input("1234567890", None)).is_ok());
        assert!(validate_review(&input("很好很好很好很好很好", None)).is_ok());
    }

    #[test]
    fn rating_defaults_and_bounds() {
        let (_, rating) = validate_review(&input("a fine website", None)).unwrap();
        assert_eq!(rating, 5);
        assert!(validate_review(&input("a fine website", Some(0))).is_err());
        assert!(validate_review(&input("a fine website", Some(6))).is_err());
        assert!(validate_review(&input("a fine website", Some(1))).is_ok());
    }
}
