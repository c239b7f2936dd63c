// One-time codes: email verification links, password reset links, and
// phone OTP codes. Long random tokens are stored raw (unguessable);
// short numeric OTPs are stored as bcrypt hashes with an attempt cap.

use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const OTP_MAX_ATTEMPTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    VerifyEmail,
    ResetPassword,
    PhoneOtp,
}

impl CodeKind {
    fn as_str(&self) -> &'static str {
        match self {
            CodeKind::VerifyEmail => "verify_email",
            CodeKind::ResetPassword => "reset_password",
            CodeKind::PhoneOtp => "phone_otp",
        }
    }

    fn ttl_minutes(&self) -> i64 {
        match self {
            CodeKind::VerifyEmail => 24 * 60,
            CodeKind::ResetPassword => 60,
            CodeKind::PhoneOtp => 5,
        }
    }
}

/// Issue a long random token for `subject` (an account id), replacing
/// any previous one of the same kind.
pub fn issue_token(pool: &DbPool, kind: CodeKind, subject: &str) -> AppResult<String> {
    let token = super::session::generate_token();
    store_code(pool, kind, subject, &token)?;
    Ok(token)
}

/// Redeem a token: returns the subject and deletes the row, or None
/// when the token is unknown or expired.
pub fn consume_token(pool: &DbPool, kind: CodeKind, token: &str) -> AppResult<Option<String>> {
    let conn = pool.get()?;
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, subject FROM one_time_codes
             WHERE kind = ?1 AND code_hash = ?2 AND expires_at > datetime('now')",
            params![kind.as_str(), token],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, subject)) = row else {
        return Ok(None);
    };
    conn.execute("DELETE FROM one_time_codes WHERE id = ?1", params![id])?;
    Ok(Some(subject))
}

/// Issue a 6-digit OTP for a phone number. Only the bcrypt hash is
/// persisted; the plaintext goes to the SMS gateway and nowhere else.
pub fn issue_otp(pool: &DbPool, phone_number: &str) -> AppResult<String> {
    let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
    let hash = bcrypt::hash(&code, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))?;
    store_code(pool, CodeKind::PhoneOtp, phone_number, &hash)?;
    Ok(code)
}

/// Check an OTP. Wrong guesses count against a small budget; hitting
/// it invalidates the code. Success is single-use.
pub fn verify_otp(pool: &DbPool, phone_number: &str, code: &str) -> AppResult<bool> {
    let conn = pool.get()?;
    let row: Option<(String, String, i64)> = conn
        .query_row(
            "SELECT id, code_hash, attempts FROM one_time_codes
             WHERE kind = 'phone_otp' AND subject = ?1 AND expires_at > datetime('now')",
            params![phone_number],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((id, hash, attempts)) = row else {
        return Ok(false);
    };

    if attempts >= OTP_MAX_ATTEMPTS {
        conn.execute("DELETE FROM one_time_codes WHERE id = ?1", params![id])?;
        return Ok(false);
    }

    if bcrypt::verify(code, &hash).unwrap_or(false) {
        conn.execute("DELETE FROM one_time_codes WHERE id = ?1", params![id])?;
        Ok(true)
    } else {
        conn.execute(
            "UPDATE one_time_codes SET attempts = attempts + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(false)
    }
}

fn store_code(pool: &DbPool, kind: CodeKind, subject: &str, code_hash: &str) -> AppResult<()> {
    let conn = pool.get()?;
    // One live code per (kind, subject).
    conn.execute(
        "DELETE FROM one_time_codes WHERE kind = ?1 AND subject = ?2",
        params![kind.as_str(), subject],
    )?;
    conn.execute(
        "INSERT INTO one_time_codes (id, kind, subject, code_hash, expires_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now', ?5))",
        params![
            uuid::Uuid::now_v7().to_string(),
            kind.as_str(),
            subject,
            code_hash,
            format!("+{} minutes", kind.ttl_minutes()),
        ],
    )?;
    Ok(())
}
