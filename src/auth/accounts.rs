use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::Account;
use crate::error::AppResult;
use crate::state::DbPool;

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        phone_number: row.get(2)?,
        google_sub: row.get(3)?,
        password_hash: row.get(4)?,
        display_name: row.get(5)?,
        email_verified: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const COLUMNS: &str =
    "id, email, phone_number, google_sub, password_hash, display_name, email_verified, created_at";

fn find_by(pool: &DbPool, column: &str, value: &str) -> AppResult<Option<Account>> {
    let conn = pool.get()?;
    let account = conn
        .query_row(
            &format!("SELECT {} FROM accounts WHERE {} = ?1", COLUMNS, column),
            params![value],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

pub fn find_by_id(pool: &DbPool, id: &str) -> AppResult<Option<Account>> {
    find_by(pool, "id", id)
}

pub fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Option<Account>> {
    find_by(pool, "email", email)
}

pub fn find_by_phone(pool: &DbPool, phone_number: &str) -> AppResult<Option<Account>> {
    find_by(pool, "phone_number", phone_number)
}

pub fn find_by_google_sub(pool: &DbPool, sub: &str) -> AppResult<Option<Account>> {
    find_by(pool, "google_sub", sub)
}

pub fn insert_email_account(
    pool: &DbPool,
    id: &str,
    email: &str,
    password_hash: &str,
    display_name: &str,
) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO accounts (id, email, password_hash, display_name)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, email, password_hash, display_name],
    )?;
    Ok(())
}

pub fn insert_google_account(
    pool: &DbPool,
    id: &str,
    sub: &str,
    email: Option<&str>,
    display_name: &str,
) -> AppResult<()> {
    let conn = pool.get()?;
    // Google attests the address, so it arrives verified.
    conn.execute(
        "INSERT INTO accounts (id, google_sub, email, display_name, email_verified)
         VALUES (?1, ?2, ?3, ?4, 1)",
        params![id, sub, email, display_name],
    )?;
    Ok(())
}

pub fn insert_phone_account(pool: &DbPool, id: &str, phone_number: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO accounts (id, phone_number, display_name) VALUES (?1, ?2, 'User')",
        params![id, phone_number],
    )?;
    Ok(())
}

pub fn delete(pool: &DbPool, id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn link_google_sub(pool: &DbPool, id: &str, sub: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE accounts SET google_sub = ?2, email_verified = 1 WHERE id = ?1",
        params![id, sub],
    )?;
    Ok(())
}

pub fn set_password_hash(pool: &DbPool, id: &str, password_hash: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE accounts SET password_hash = ?2 WHERE id = ?1",
        params![id, password_hash],
    )?;
    // A reset invalidates every live session.
    conn.execute("DELETE FROM sessions WHERE account_id = ?1", params![id])?;
    Ok(())
}

pub fn mark_email_verified(pool: &DbPool, id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE accounts SET email_verified = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}
