pub mod username;

use serde_json::json;

use crate::db::models::UserProfile;
use crate::error::{AppError, AppResult, AuthCode};
use crate::store::TreeStore;

pub fn profile_path(uid: &str) -> String {
    format!("users/{}", uid)
}

pub fn username_path(handle: &str) -> String {
    format!("usernames/{}", handle)
}

/// Key-existence probe against the username index. Store failures
/// propagate; they are never read as "available".
pub fn is_username_taken(store: &TreeStore, handle: &str) -> AppResult<bool> {
    store.exists(&username_path(&handle.to_lowercase()))
}

pub fn get_profile(store: &TreeStore, uid: &str) -> AppResult<Option<UserProfile>> {
    match store.get(&profile_path(uid))? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Username for display. Missing profiles read as "User", like the
/// original site showed for half-created accounts.
pub fn get_username(store: &TreeStore, uid: &str) -> AppResult<String> {
    match store.get(&format!("users/{}/username", uid))? {
        Some(serde_json::Value::String(name)) => Ok(name),
        _ => Ok("User".to_string()),
    }
}

pub fn is_owner(store: &TreeStore, owner_username: &str, uid: &str) -> AppResult<bool> {
    Ok(get_username(store, uid)? == owner_username)
}

/// Atomically claim `handle` for `uid` and write the profile record.
/// Returns false (and writes nothing) when the handle is already held.
pub fn reserve_username(
    store: &TreeStore,
    handle: &str,
    uid: &str,
    profile: &UserProfile,
) -> AppResult<bool> {
    let profile_value = serde_json::to_value(profile)?;
    store.reserve_with(
        &username_path(handle),
        &json!(uid),
        &[(profile_path(uid), profile_value)],
    )
}

/// Create the profile for an externally-authenticated account (Google,
/// phone) if it does not exist yet, deriving a unique handle from the
/// display name. Returns the account's username either way.
pub fn ensure_user(
    store: &TreeStore,
    uid: &str,
    name: &str,
    email: Option<&str>,
    profile_pic: Option<&str>,
    phone_number: Option<&str>,
) -> AppResult<String> {
    if let Some(profile) = get_profile(store, uid)? {
        return Ok(profile.username);
    }

    // Generation and reservation race against concurrent signups, so
    // losing a reservation re-generates rather than failing.
    for _ in 0..3 {
        let handle = username::generate_unique(name, |c| is_username_taken(store, c))?;
        let profile = UserProfile {
            name: name.to_string(),
            username: handle.clone(),
            email: email.map(str::to_string),
            created_at: chrono::Utc::now().timestamp_millis(),
            profile_pic: profile_pic.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        };
        if reserve_username(store, &handle, uid, &profile)? {
            return Ok(handle);
        }
    }
    Err(AppError::Auth(AuthCode::UsernameExhausted))
}
