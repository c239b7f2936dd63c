use rand::Rng;
use rusqlite::params;

use crate::config::Config;
use crate::error::AppResult;
use crate::state::DbPool;

/// Create a new session for an account. Returns the session token.
pub fn create_session(pool: &DbPool, account_id: &str, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, account_id, token, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, account_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Session cookie for a fresh login.
pub fn session_cookie(config: &Config, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        config.auth.cookie_name,
        token,
        config.auth.session_hours * 3600
    )
}

/// Expired cookie clearing the session on logout.
pub fn clear_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        config.auth.cookie_name
    )
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
