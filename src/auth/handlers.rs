use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{accounts, session, tokens};
use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult, AuthCode};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::users::{self, username};

// -- Request/Response types --

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "profilePic")]
    pub profile_pic: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CheckUsernameQuery {
    pub username: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct VerifyConfirm {
    pub token: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub verified: bool,
    pub owner: bool,
}

// -- Handlers --

/// POST /auth/signup — email/password account with a user-chosen handle.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<Response> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if name.is_empty() || req.username.trim().is_empty() || email.is_empty() || req.password.is_empty()
    {
        return Err(AppError::BadRequest("Please fill in all fields".into()));
    }
    let handle = username::validate_handle(&req.username)?;
    if !email.contains('@') {
        return Err(AppError::Auth(AuthCode::InvalidEmail));
    }
    if req.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }

    // Advisory pre-check, same as the form's blur probe. The
    // reservation below is the authoritative one.
    if users::is_username_taken(&state.store, &handle)? {
        return Err(AppError::BadRequest("Username already taken".into()));
    }
    if accounts::find_by_email(&state.db, &email)?.is_some() {
        return Err(AppError::Auth(AuthCode::EmailAlreadyInUse));
    }

    let uid = uuid::Uuid::now_v7().to_string();
    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;
    accounts::insert_email_account(&state.db, &uid, &email, &password_hash, &name)?;

    let profile = UserProfile {
        name: name.clone(),
        username: handle.clone(),
        email: Some(email.clone()),
        created_at: chrono::Utc::now().timestamp_millis(),
        profile_pic: req.profile_pic,
        phone_number: None,
    };
    if !users::reserve_username(&state.store, &handle, &uid, &profile)? {
        // Lost the race after the pre-check; leave no orphan account.
        accounts::delete(&state.db, &uid)?;
        return Err(AppError::BadRequest("Username already taken".into()));
    }

    let token = tokens::issue_token(&state.db, tokens::CodeKind::VerifyEmail, &uid)?;
    state.mailer.send_verification(&email, &token).await?;

    let session_token = session::create_session(&state.db, &uid, state.config.auth.session_hours)?;
    tracing::info!("new account {} (@{})", uid, handle);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session::session_cookie(&state.config, &session_token))],
        Json(json!({ "uid": uid, "username": handle })),
    )
        .into_response())
}

/// POST /auth/login — email/password.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let email = req.email.trim().to_lowercase();
    let account = accounts::find_by_email(&state.db, &email)?
        .ok_or(AppError::Auth(AuthCode::UserNotFound))?;
    let hash = account
        .password_hash
        .as_deref()
        .ok_or(AppError::Auth(AuthCode::InvalidCredential))?;
    if !bcrypt::verify(&req.password, hash).unwrap_or(false) {
        return Err(AppError::Auth(AuthCode::WrongPassword));
    }

    let session_token =
        session::create_session(&state.db, &account.id, state.config.auth.session_hours)?;
    let username = users::get_username(&state.store, &account.id)?;

    Ok((
        [(header::SET_COOKIE, session::session_cookie(&state.config, &session_token))],
        Json(json!({ "uid": account.id, "username": username })),
    )
        .into_response())
}

/// POST /auth/logout — drops the session either way.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token_from_headers(&headers, &state.config.auth.cookie_name) {
        session::delete_session(&state.db, &token)?;
    }
    Ok((
        [(header::SET_COOKIE, session::clear_cookie(&state.config))],
        Json(json!({ "signed_in": false })),
    )
        .into_response())
}

/// GET /auth/me — auth state plus the derived flags the pages key off.
pub async fn me(MaybeUser(user): MaybeUser) -> Json<MeResponse> {
    match user {
        Some(user) => Json(MeResponse {
            signed_in: true,
            uid: Some(user.id),
            name: Some(user.display_name),
            username: Some(user.username),
            verified: user.verified,
            owner: user.is_owner,
        }),
        None => Json(MeResponse {
            signed_in: false,
            uid: None,
            name: None,
            username: None,
            verified: false,
            owner: false,
        }),
    }
}

/// GET /auth/username/check?username= — availability probe for the
/// signup form. Store errors surface as errors, never as "available".
pub async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<CheckUsernameQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let handle = username::validate_handle(&query.username)?;
    let taken = users::is_username_taken(&state.store, &handle)?;
    Ok(Json(json!({ "username": handle, "taken": taken })))
}

/// POST /auth/password-reset — mails a reset token.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::BadRequest("Enter your email first".into()));
    }
    let account = accounts::find_by_email(&state.db, &email)?
        .ok_or(AppError::Auth(AuthCode::UserNotFound))?;

    let token = tokens::issue_token(&state.db, tokens::CodeKind::ResetPassword, &account.id)?;
    state.mailer.send_password_reset(&email, &token).await?;
    Ok(Json(json!({ "sent": true })))
}

/// POST /auth/password-reset/confirm.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> AppResult<Json<serde_json::Value>> {
    if req.password.len() < 6 {
        return Err(AppError::BadRequest(
            "Password must be at least 6 characters".into(),
        ));
    }
    let account_id = tokens::consume_token(&state.db, tokens::CodeKind::ResetPassword, &req.token)?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired token".into()))?;

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;
    accounts::set_password_hash(&state.db, &account_id, &password_hash)?;
    Ok(Json(json!({ "reset": true })))
}

/// POST /auth/verify/send — re-send the verification mail.
pub async fn send_verification(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<serde_json::Value>> {
    if user.verified {
        return Err(AppError::BadRequest("Email already verified".into()));
    }
    let account = accounts::find_by_id(&state.db, &user.id)?.ok_or(AppError::Unauthorized)?;
    let email = account
        .email
        .ok_or_else(|| AppError::BadRequest("Account has no email".into()))?;

    let token = tokens::issue_token(&state.db, tokens::CodeKind::VerifyEmail, &user.id)?;
    state.mailer.send_verification(&email, &token).await?;
    Ok(Json(json!({ "sent": true })))
}

/// POST /auth/verify/confirm.
pub async fn confirm_verification(
    State(state): State<AppState>,
    Json(req): Json<VerifyConfirm>,
) -> AppResult<Json<serde_json::Value>> {
    let account_id = tokens::consume_token(&state.db, tokens::CodeKind::VerifyEmail, &req.token)?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired token".into()))?;
    accounts::mark_email_verified(&state.db, &account_id)?;
    Ok(Json(json!({ "verified": true })))
}

fn session_token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let (key, value) = cookie.split_once('=')?;
            if key.trim() == cookie_name {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
}
