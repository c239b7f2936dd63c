// Daily SMS quota gate. One shared counter per UTC day; the counter
// only grows, and the day rollover starts a fresh key.

use chrono::Utc;

use crate::error::{AppError, AppResult, AuthCode};
use crate::store::TreeStore;

pub fn quota_path(date_key: &str) -> String {
    format!("quotas/{}/sms_count", date_key)
}

/// Current UTC date, `YYYY-MM-DD`.
pub fn today_key() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

pub fn current_count(store: &TreeStore, date_key: &str) -> AppResult<i64> {
    match store.get(&quota_path(date_key))? {
        Some(value) => Ok(value.as_i64().unwrap_or(0)),
        None => Ok(0),
    }
}

/// Advisory remaining budget, for UI toggling only.
pub fn remaining(store: &TreeStore, limit: i64, date_key: &str) -> AppResult<i64> {
    Ok((limit - current_count(store, date_key)?).max(0))
}

/// Check the counter and claim one send. At or past the limit the call
/// fails locally without touching the counter or the SMS gateway. The
/// increment itself is atomic; the preceding read is advisory, so
/// concurrent callers right at the boundary can overshoot by one,
/// exactly as the original gate did.
pub fn gate_and_increment(store: &TreeStore, limit: i64, date_key: &str) -> AppResult<i64> {
    if current_count(store, date_key)? >= limit {
        return Err(AppError::Auth(AuthCode::QuotaExceeded));
    }
    store.increment(&quota_path(date_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::AuthCode;

    fn test_store() -> TreeStore {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        TreeStore::new(pool)
    }

    #[test]
    fn counts_up_by_one_per_gate() {
        let store = test_store();
        assert_eq!(gate_and_increment(&store, 10, "2025-06-01").unwrap(), 1);
        assert_eq!(gate_and_increment(&store, 10, "2025-06-01").unwrap(), 2);
        assert_eq!(current_count(&store, "2025-06-01").unwrap(), 2);
    }

    #[test]
    fn rejects_at_limit_without_incrementing() {
        let store = test_store();
        for _ in 0..10 {
            gate_and_increment(&store, 10, "2025-06-01").unwrap();
        }
        let err = gate_and_increment(&store, 10, "2025-06-01").unwrap_err();
        assert!(matches!(
            err,
            AppError::Auth(AuthCode::QuotaExceeded)
        ));
        // Rejected attempts must not consume quota.
        assert_eq!(current_count(&store, "2025-06-01").unwrap(), 10);
    }

    #[test]
    fn day_rollover_uses_a_fresh_counter() {
        let store = test_store();
        for _ in 0..10 {
            gate_and_increment(&store, 10, "2025-06-01").unwrap();
        }
        assert!(gate_and_increment(&store, 10, "2025-06-02").is_ok());
        assert_eq!(current_count(&store, "2025-06-01").unwrap(), 10);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let store = test_store();
        for _ in 0..3 {
            store.increment(&quota_path("2025-06-01")).unwrap();
        }
        assert_eq!(remaining(&store, 10, "2025-06-01").unwrap(), 7);
        assert_eq!(remaining(&store, 2, "2025-06-01").unwrap(), 0);
    }

    #[test]
    fn today_key_is_utc_date_shaped() {
        let key = today_key();
        assert_eq!(key.len(), 10);
        assert_eq!(&key[4..5], "-");
        assert_eq!(&key[7..8], "-");
    }
}
