use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::path;
use crate::error::AppResult;
use crate::state::DbPool;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// Fired after a write commits. Delivery is in write order for a given
/// path; lagging subscribers miss events rather than block writers.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub path: String,
    pub kind: EventKind,
}

/// Path-keyed JSON tree over SQLite. Rows are leaves; interior nodes
/// are implied by prefixes. Writing a subtree replaces it wholesale,
/// `merge` touches only the named children, and `reserve` is an atomic
/// insert-if-absent so uniqueness never depends on a separate read.
#[derive(Clone)]
pub struct TreeStore {
    pool: DbPool,
    events: broadcast::Sender<StoreEvent>,
}

impl TreeStore {
    pub fn new(pool: DbPool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { pool, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Read the value at `path`: the leaf if one exists, otherwise the
    /// subtree below it assembled into a JSON object.
    pub fn get(&self, path: &str) -> AppResult<Option<Value>> {
        path::validate(path)?;
        let conn = self.pool.get()?;
        read_subtree(&conn, path)
    }

    /// Whether anything is stored at or below `path`.
    pub fn exists(&self, path: &str) -> AppResult<bool> {
        path::validate(path)?;
        let conn = self.pool.get()?;
        subtree_occupied(&conn, path)
    }

    /// Immediate children of `path` in key order. Pushed keys are
    /// UUIDv7, so key order is chronological.
    pub fn children(&self, path: &str) -> AppResult<Vec<(String, Value)>> {
        match self.get(path)? {
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Full replace: drops the subtree below `path`, then writes the
    /// leaves of `value`. Setting null or an empty object is a delete.
    pub fn set(&self, path: &str, value: &Value) -> AppResult<()> {
        path::validate(path)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        delete_subtree(&tx, path)?;
        clear_ancestor_leaves(&tx, path)?;
        insert_leaves(&tx, path, value)?;
        tx.commit()?;
        self.notify(path, EventKind::Put);
        Ok(())
    }

    /// Partial update: replaces only the named children, leaving
    /// siblings alone. A null field deletes that child.
    pub fn merge(&self, path: &str, fields: &Map<String, Value>) -> AppResult<()> {
        path::validate(path)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // A leaf at the node itself would shadow the children.
        tx.execute("DELETE FROM tree WHERE path = ?1", params![path])?;
        clear_ancestor_leaves(&tx, path)?;
        for (key, value) in fields {
            let child = path::join(path, key)?;
            delete_subtree(&tx, &child)?;
            insert_leaves(&tx, &child, value)?;
        }
        tx.commit()?;
        self.notify(path, EventKind::Put);
        Ok(())
    }

    /// Append under `path` with a generated, time-ordered key.
    pub fn push(&self, path: &str, value: &Value) -> AppResult<String> {
        let key = uuid::Uuid::now_v7().to_string();
        let child = path::join(path, &key)?;
        self.set(&child, value)?;
        Ok(key)
    }

    /// Delete the node and everything below it. Returns whether
    /// anything was there.
    pub fn remove(&self, path: &str) -> AppResult<bool> {
        path::validate(path)?;
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = delete_subtree(&tx, path)?;
        tx.commit()?;
        if deleted > 0 {
            self.notify(path, EventKind::Delete);
        }
        Ok(deleted > 0)
    }

    /// Atomic counter: treat the leaf at `path` as an integer (missing
    /// counts as 0), add one, return the new value. Single upsert, so
    /// concurrent callers each get a distinct value.
    pub fn increment(&self, path: &str) -> AppResult<i64> {
        path::validate(path)?;
        let conn = self.pool.get()?;
        let new_value: i64 = conn.query_row(
            "INSERT INTO tree (path, value) VALUES (?1, '1')
             ON CONFLICT(path) DO UPDATE SET
               value = CAST(CAST(value AS INTEGER) + 1 AS TEXT),
               updated_at = datetime('now')
             RETURNING CAST(value AS INTEGER)",
            params![path],
            |row| row.get(0),
        )?;
        self.notify(path, EventKind::Put);
        Ok(new_value)
    }

    /// Atomic insert-if-absent. Returns false, writing nothing, when
    /// anything already exists at or below `path`.
    pub fn reserve(&self, path: &str, value: &Value) -> AppResult<bool> {
        self.reserve_with(path, value, &[])
    }

    /// Like `reserve`, but commits the extra writes in the same
    /// transaction. Used to keep the username index and the profile
    /// record consistent: both land, or neither does.
    pub fn reserve_with(
        &self,
        path: &str,
        value: &Value,
        writes: &[(String, Value)],
    ) -> AppResult<bool> {
        path::validate(path)?;
        for (p, _) in writes {
            path::validate(p)?;
        }
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if subtree_occupied(&tx, path)? {
            return Ok(false);
        }
        clear_ancestor_leaves(&tx, path)?;
        insert_leaves(&tx, path, value)?;
        for (p, v) in writes {
            delete_subtree(&tx, p)?;
            clear_ancestor_leaves(&tx, p)?;
            insert_leaves(&tx, p, v)?;
        }
        tx.commit()?;
        self.notify(path, EventKind::Put);
        for (p, _) in writes {
            self.notify(p, EventKind::Put);
        }
        Ok(true)
    }

    fn notify(&self, path: &str, kind: EventKind) {
        // No receivers is fine.
        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            kind,
        });
    }
}

// '0' is the ASCII successor of '/', so `p >= base || '/' AND p < base || '0'`
// matches exactly the paths strictly below base. LIKE is avoided because
// '_' in usernames is a LIKE wildcard.

fn subtree_occupied(conn: &Connection, path: &str) -> AppResult<bool> {
    let occupied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM tree
         WHERE path = ?1 OR (path >= ?1 || '/' AND path < ?1 || '0')",
        params![path],
        |row| row.get(0),
    )?;
    Ok(occupied)
}

fn delete_subtree(conn: &Connection, path: &str) -> AppResult<usize> {
    let deleted = conn.execute(
        "DELETE FROM tree
         WHERE path = ?1 OR (path >= ?1 || '/' AND path < ?1 || '0')",
        params![path],
    )?;
    Ok(deleted)
}

/// A leaf stored at an ancestor would make `path` unreachable; writing
/// below it converts the ancestor into an interior node.
fn clear_ancestor_leaves(conn: &Connection, path: &str) -> AppResult<()> {
    for ancestor in path::ancestors(path) {
        conn.execute("DELETE FROM tree WHERE path = ?1", params![ancestor])?;
    }
    Ok(())
}

fn insert_leaves(conn: &Connection, path: &str, value: &Value) -> AppResult<()> {
    let mut rows = Vec::new();
    flatten(&mut rows, path, value)?;
    for (p, raw) in rows {
        conn.execute(
            "INSERT INTO tree (path, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(path) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![p, raw],
        )?;
    }
    Ok(())
}

/// Break a JSON value into leaf rows. Objects become child paths, so
/// every nested key stays individually addressable (`codes/{id}/likes/{uid}`).
/// Nulls and empty objects produce nothing, matching the original
/// store's treatment of them as deletions.
fn flatten(rows: &mut Vec<(String, String)>, path: &str, value: &Value) -> AppResult<()> {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = path::join(path, key)?;
                flatten(rows, &child_path, child)?;
            }
        }
        other => rows.push((path.to_string(), other.to_string())),
    }
    Ok(())
}

fn read_subtree(conn: &Connection, path: &str) -> AppResult<Option<Value>> {
    let exact: Option<String> = conn
        .query_row(
            "SELECT value FROM tree WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    if let Some(raw) = exact {
        return Ok(Some(serde_json::from_str(&raw)?));
    }

    let mut stmt = conn.prepare(
        "SELECT path, value FROM tree
         WHERE path >= ?1 || '/' AND path < ?1 || '0'
         ORDER BY path",
    )?;
    let rows: Vec<(String, String)> = stmt
        .query_map(params![path], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut root = Map::new();
    for (full_path, raw) in rows {
        let value: Value = serde_json::from_str(&raw)?;
        let rel = &full_path[path.len() + 1..];
        let segments: Vec<&str> = rel.split('/').collect();
        insert_at(&mut root, &segments, value);
    }
    Ok(Some(Value::Object(root)))
}

fn insert_at(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    if segments.len() == 1 {
        node.insert(segments[0].to_string(), value);
        return;
    }
    let child = node
        .entry(segments[0].to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(map) = child {
        insert_at(map, &segments[1..], value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn test_store() -> TreeStore {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        TreeStore::new(pool)
    }

    #[test]
    fn set_and_get_roundtrips_nested_records() {
        let store = test_store();
        let post = json!({
            "title": "Hello",
            "language": "rust",
            "timestamp": 1700000000000i64,
        });
        store.set("codes/p1", &post).unwrap();
        assert_eq!(store.get("codes/p1").unwrap().unwrap(), post);
        assert_eq!(
            store.get("codes/p1/title").unwrap().unwrap(),
            json!("Hello")
        );
        assert!(store.get("codes/p2").unwrap().is_none());
    }

    #[test]
    fn set_replaces_whole_subtree() {
        let store = test_store();
        store
            .set("codes/p1", &json!({"title": "a", "description": "b"}))
            .unwrap();
        store.set("codes/p1", &json!({"title": "c"})).unwrap();
        assert_eq!(
            store.get("codes/p1").unwrap().unwrap(),
            json!({"title": "c"})
        );
    }

    #[test]
    fn merge_keeps_siblings() {
        let store = test_store();
        store
            .set("reviews/r1", &json!({"text": "nice work here", "rating": 4}))
            .unwrap();
        let fields = json!({"rating": 5, "editedAt": 123})
            .as_object()
            .cloned()
            .unwrap();
        store.merge("reviews/r1", &fields).unwrap();
        assert_eq!(
            store.get("reviews/r1").unwrap().unwrap(),
            json!({"text": "nice work here", "rating": 5, "editedAt": 123})
        );
    }

    #[test]
    fn merge_with_null_deletes_field() {
        let store = test_store();
        store.set("users/u1", &json!({"name": "A", "profilePic": "x"})).unwrap();
        let fields = json!({"profilePic": null}).as_object().cloned().unwrap();
        store.merge("users/u1", &fields).unwrap();
        assert_eq!(
            store.get("users/u1").unwrap().unwrap(),
            json!({"name": "A"})
        );
    }

    #[test]
    fn push_generates_ordered_keys() {
        let store = test_store();
        let k1 = store.push("messages", &json!({"subject": "one"})).unwrap();
        let k2 = store.push("messages", &json!({"subject": "two"})).unwrap();
        assert!(k1 < k2, "push keys must be time-ordered");

        let children = store.children("messages").unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0, k1);
        assert_eq!(children[1].0, k2);
    }

    #[test]
    fn remove_deletes_subtree_and_reports() {
        let store = test_store();
        store
            .set("codes/p1", &json!({"title": "a", "likes": {"u1": 1}}))
            .unwrap();
        assert!(store.remove("codes/p1").unwrap());
        assert!(store.get("codes/p1").unwrap().is_none());
        assert!(store.get("codes/p1/likes/u1").unwrap().is_none());
        assert!(!store.remove("codes/p1").unwrap());
    }

    #[test]
    fn underscore_in_key_is_not_a_wildcard() {
        let store = test_store();
        store.set("usernames/bob_1", &json!("u1")).unwrap();
        store.set("usernames/bobs1", &json!("u2")).unwrap();
        store.remove("usernames/bob_1").unwrap();
        assert!(store.get("usernames/bobs1").unwrap().is_some());
    }

    #[test]
    fn increment_starts_at_one_and_counts_up() {
        let store = test_store();
        assert_eq!(store.increment("quotas/2025-06-01/sms_count").unwrap(), 1);
        assert_eq!(store.increment("quotas/2025-06-01/sms_count").unwrap(), 2);
        assert_eq!(
            store.get("quotas/2025-06-01/sms_count").unwrap().unwrap(),
            json!(2)
        );
    }

    #[test]
    fn increment_is_atomic_across_threads() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("t.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        let store = TreeStore::new(pool);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    store.increment("quotas/2025-06-01/sms_count").unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(
            store.get("quotas/2025-06-01/sms_count").unwrap().unwrap(),
            json!(100)
        );
    }

    #[test]
    fn reserve_refuses_second_writer() {
        let store = test_store();
        assert!(store.reserve("usernames/bob", &json!("u1")).unwrap());
        assert!(!store.reserve("usernames/bob", &json!("u2")).unwrap());
        assert_eq!(store.get("usernames/bob").unwrap().unwrap(), json!("u1"));
    }

    #[test]
    fn reserve_with_writes_all_or_nothing() {
        let store = test_store();
        let profile = json!({"name": "Bob", "username": "bob"});
        assert!(store
            .reserve_with(
                "usernames/bob",
                &json!("u1"),
                &[("users/u1".to_string(), profile.clone())],
            )
            .unwrap());
        assert_eq!(store.get("users/u1").unwrap().unwrap(), profile);

        // Losing the reservation writes nothing at all.
        let other = json!({"name": "Bob 2", "username": "bob"});
        assert!(!store
            .reserve_with(
                "usernames/bob",
                &json!("u2"),
                &[("users/u2".to_string(), other)],
            )
            .unwrap());
        assert!(store.get("users/u2").unwrap().is_none());
    }

    #[test]
    fn events_fire_after_writes() {
        let store = test_store();
        let mut rx = store.subscribe();
        store.set("codes/p1", &json!({"title": "a"})).unwrap();
        store.remove("codes/p1").unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.path, "codes/p1");
        assert_eq!(first.kind, EventKind::Put);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.kind, EventKind::Delete);
    }
}
