use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::error::AppError;
use crate::state::AppState;
use crate::users;

/// The currently authenticated user, joined with the derived flags the
/// site keys off: reserved username, verified email, owner role.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
    pub username: String,
    pub verified: bool,
    pub is_owner: bool,
}

/// Extractor that requires authentication. Returns 401 if no valid
/// session is found.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            extract_session_token(parts, &state.config.auth.cookie_name).ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        let (id, display_name, verified) = conn
            .query_row(
                "SELECT a.id, a.display_name, a.email_verified FROM sessions s \
                 JOIN accounts a ON a.id = s.account_id \
                 WHERE s.token = ?1 AND s.expires_at > datetime('now')",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .map_err(|_| AppError::Unauthorized)?;
        drop(conn);

        let username = users::get_username(&state.store, &id)?;
        let is_owner = username == state.config.auth.owner_username;

        Ok(CurrentUser {
            id,
            display_name: display_name.unwrap_or_else(|| "User".to_string()),
            username,
            verified,
            is_owner,
        })
    }
}

/// Optional user extractor — None instead of 401 when not signed in.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

/// Extractor gating owner-only routes. The owner role is decided here,
/// server-side, by the reserved username; there is no client flag to
/// trust.
pub struct OwnerUser(pub CurrentUser);

impl FromRequestParts<AppState> for OwnerUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_owner {
            return Err(AppError::Forbidden("Access denied".into()));
        }
        Ok(OwnerUser(user))
    }
}

fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
