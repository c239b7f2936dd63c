use crate::error::{AppError, AppResult};

/// Characters a path segment may contain. Covers every key shape the
/// tree holds: uuids, usernames, dates, page edit ids.
fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Validate a tree path: non-empty `/`-separated segments, restricted
/// charset, no leading or trailing slash.
pub fn validate(path: &str) -> AppResult<()> {
    if path.is_empty() {
        return Err(AppError::BadRequest("Empty path".into()));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            return Err(AppError::BadRequest(format!("Bad path: {}", path)));
        }
        if !segment.chars().all(is_segment_char) {
            return Err(AppError::BadRequest(format!("Bad path segment: {}", segment)));
        }
    }
    Ok(())
}

/// Join a path and a child key. The key is validated as one segment.
pub fn join(path: &str, key: &str) -> AppResult<String> {
    if key.is_empty() || key.contains('/') || !key.chars().all(is_segment_char) {
        return Err(AppError::BadRequest(format!("Bad key: {}", key)));
    }
    Ok(format!("{}/{}", path, key))
}

/// All proper ancestors of a path, nearest last: `a/b/c` -> `["a", "a/b"]`.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for (i, c) in path.char_indices() {
        if c == '/' {
            out.push(&path[..i]);
        }
    }
    out
}
