// Phone/OTP login. Sending a text is the one rate-limited external
// action the site performs, so it sits behind the daily quota gate.
// The quota is claimed before dispatch; a failed send still counts.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{accounts, session, tokens};
use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult, AuthCode};
use crate::quota;
use crate::state::AppState;
use crate::users::{self, username};

#[derive(Deserialize)]
pub struct PhoneStartRequest {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct PhoneVerifyRequest {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
    pub code: String,
}

/// E.164: '+', a leading 1-9, then up to 14 more digits.
fn is_valid_e164(number: &str) -> bool {
    let Some(rest) = number.strip_prefix('+') else {
        return false;
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if ('1'..='9').contains(&c) => {}
        _ => return false,
    }
    let digits: Vec<char> = chars.collect();
    !digits.is_empty() && digits.len() <= 14 && digits.iter().all(|c| c.is_ascii_digit())
}

/// GET /auth/phone/quota — advisory remaining budget, used by the login
/// page to hide the phone tab once exhausted.
pub async fn quota_status(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let limit = state.config.quota.sms_daily_limit;
    let remaining = quota::remaining(&state.store, limit, &quota::today_key())?;
    Ok(Json(json!({ "remaining": remaining, "limit": limit })))
}

/// POST /auth/phone/start — claim quota, then text a code.
pub async fn start(
    State(state): State<AppState>,
    Json(req): Json<PhoneStartRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let phone_number = req.phone_number.trim().to_string();
    if phone_number.is_empty() {
        return Err(AppError::BadRequest("Please enter a phone number".into()));
    }
    if !is_valid_e164(&phone_number) {
        return Err(AppError::Auth(AuthCode::InvalidPhoneNumber));
    }

    let limit = state.config.quota.sms_daily_limit;
    let count = quota::gate_and_increment(&state.store, limit, &quota::today_key())?;
    tracing::info!("SMS quota {}/{} after grant for {}", count, limit, phone_number);

    let code = tokens::issue_otp(&state.db, &phone_number)?;
    state.sms.send_otp(&phone_number, &code).await?;

    Ok(Json(json!({ "sent": true })))
}

/// POST /auth/phone/verify — confirm the code and sign in, creating a
/// minimal profile on first login.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<PhoneVerifyRequest>,
) -> AppResult<Response> {
    let phone_number = req.phone_number.trim().to_string();
    let code = req.code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::BadRequest("Enter a valid 6-digit code".into()));
    }
    if !tokens::verify_otp(&state.db, &phone_number, code)? {
        return Err(AppError::BadRequest("Invalid Code".into()));
    }

    let uid = match accounts::find_by_phone(&state.db, &phone_number)? {
        Some(account) => account.id,
        None => {
            let uid = uuid::Uuid::now_v7().to_string();
            accounts::insert_phone_account(&state.db, &uid, &phone_number)?;
            uid
        }
    };
    let handle = ensure_phone_profile(&state, &uid, &phone_number)?;

    let session_token = session::create_session(&state.db, &uid, state.config.auth.session_hours)?;
    Ok((
        [(header::SET_COOKIE, session::session_cookie(&state.config, &session_token))],
        Json(json!({ "uid": uid, "username": handle })),
    )
        .into_response())
}

/// First phone login gets a profile with a handle derived from the uid
/// prefix. Unlike the original's unindexed temporary username, the
/// handle goes through the reservation path like everyone else's.
fn ensure_phone_profile(state: &AppState, uid: &str, phone_number: &str) -> AppResult<String> {
    if let Some(profile) = users::get_profile(&state.store, uid)? {
        return Ok(profile.username);
    }
    let base = format!("user_{}", &uid[..5.min(uid.len())]);
    for _ in 0..3 {
        let handle =
            username::generate_unique(&base, |c| users::is_username_taken(&state.store, c))?;
        let profile = UserProfile {
            name: "User".to_string(),
            username: handle.clone(),
            email: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            profile_pic: None,
            phone_number: Some(phone_number.to_string()),
        };
        if users::reserve_username(&state.store, &handle, uid, &profile)? {
            return Ok(handle);
        }
    }
    Err(AppError::Auth(AuthCode::UsernameExhausted))
}
