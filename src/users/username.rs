// Handle normalization and generation. Pure except for the RNG; the
// store is reached only through the `taken` probe the caller supplies.

use rand::Rng;

use crate::error::{AppError, AppResult, AuthCode};

pub const MIN_HANDLE_LEN: usize = 3;

/// Probe budget for auto-generated usernames before giving up.
const MAX_GENERATE_ATTEMPTS: usize = 10;

/// Normalize a user-typed handle: lowercase, then keep only
/// `[a-z0-9_]`. Idempotent.
pub fn normalize_handle(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// Normalize a display name into a handle base: lowercase, everything
/// outside `[a-z0-9]` becomes `_`. Empty input falls back to "user".
pub fn normalize_base(input: &str) -> String {
    let base: String = input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '_'
            }
        })
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

/// Normalize and validate a user-typed handle. Rejections carry the
/// message shown to the user.
pub fn validate_handle(input: &str) -> AppResult<String> {
    let handle = normalize_handle(input);
    if handle.is_empty() {
        return Err(AppError::BadRequest(
            "Username: only letters, numbers, underscores".into(),
        ));
    }
    if handle.len() < MIN_HANDLE_LEN {
        return Err(AppError::BadRequest(
            "Username must be at least 3 characters".into(),
        ));
    }
    Ok(handle)
}

/// Find a free username starting from `base`. On collision, retries
/// with `{base}_{r}`, r in [0, 1000), always suffixing the original
/// base. Bounded: after the probe budget the caller gets a terminal
/// error instead of an unbounded loop.
pub fn generate_unique<F>(base: &str, mut taken: F) -> AppResult<String>
where
    F: FnMut(&str) -> AppResult<bool>,
{
    let base = normalize_base(base);
    let mut candidate = base.clone();
    for _ in 0..MAX_GENERATE_ATTEMPTS {
        if !taken(&candidate)? {
            return Ok(candidate);
        }
        candidate = format!("{}_{}", base, rand::thread_rng().gen_range(0..1000));
    }
    Err(AppError::Auth(AuthCode::UsernameExhausted))
}
