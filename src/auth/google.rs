// Google sign-in via the OAuth authorization-code flow with PKCE.
// Pending logins are held server-side keyed by the CSRF state token,
// so the callback can only complete a flow this server started.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;

use crate::auth::{accounts, session};
use crate::config::GoogleConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::users;

const STATE_TTL: Duration = Duration::from_secs(600);

type GoogleClient = oauth2::Client<
    oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
    oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    oauth2::StandardTokenIntrospectionResponse<
        oauth2::EmptyExtraTokenFields,
        oauth2::basic::BasicTokenType,
    >,
    oauth2::StandardRevocableToken,
    oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

struct PendingLogin {
    pkce_verifier: String,
    return_url: Option<String>,
    created_at: Instant,
}

/// In-memory table of flows awaiting their callback.
#[derive(Default)]
pub struct OauthStateStore {
    pending: HashMap<String, PendingLogin>,
}

impl OauthStateStore {
    fn insert(&mut self, state: String, pkce_verifier: String, return_url: Option<String>) {
        self.clear_stale();
        self.pending.insert(
            state,
            PendingLogin {
                pkce_verifier,
                return_url,
                created_at: Instant::now(),
            },
        );
    }

    /// Single-use: a state token cannot complete two callbacks.
    fn take(&mut self, state: &str) -> Option<(String, Option<String>)> {
        self.clear_stale();
        self.pending
            .remove(state)
            .map(|p| (p.pkce_verifier, p.return_url))
    }

    fn clear_stale(&mut self) {
        self.pending
            .retain(|_, p| p.created_at.elapsed() < STATE_TTL);
    }
}

fn build_client(google: &GoogleConfig) -> AppResult<GoogleClient> {
    let auth_url = AuthUrl::new("https://accounts.google.com/o/oauth2/auth".to_string())
        .map_err(|e| AppError::Internal(format!("auth url: {}", e)))?;
    let token_url = TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
        .map_err(|e| AppError::Internal(format!("token url: {}", e)))?;
    let redirect_url = RedirectUrl::new(google.redirect_url.clone())
        .map_err(|e| AppError::Internal(format!("redirect url: {}", e)))?;

    Ok(BasicClient::new(ClientId::new(google.client_id.clone()))
        .set_client_secret(ClientSecret::new(google.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url))
}

/// Post-login redirects stay on this site: absolute-path targets only.
/// Anything else (full URLs, scheme-relative `//host`) falls back to `/`.
fn local_return_url(candidate: Option<String>) -> String {
    match candidate {
        Some(url) if url.starts_with('/') && !url.starts_with("//") => url,
        _ => "/".to_string(),
    }
}

fn google_config(state: &AppState) -> AppResult<&GoogleConfig> {
    state
        .config
        .google
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("Google sign-in is not configured".into()))
}

#[derive(Deserialize)]
pub struct BeginQuery {
    pub return_url: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    sub: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
}

/// GET /auth/google — kick off the flow with a fresh PKCE pair.
pub async fn begin(
    State(state): State<AppState>,
    Query(query): Query<BeginQuery>,
) -> AppResult<Redirect> {
    let client = build_client(google_config(&state)?)?;

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let (authorize_url, csrf_state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new("openid".to_string()))
        .add_scope(Scope::new("email".to_string()))
        .add_scope(Scope::new("profile".to_string()))
        .set_pkce_challenge(pkce_challenge)
        .url();

    state.oauth_states.lock().await.insert(
        csrf_state.secret().clone(),
        pkce_verifier.secret().clone(),
        query.return_url,
    );

    Ok(Redirect::to(authorize_url.as_str()))
}

/// GET /auth/google/callback — exchange the code, fetch the profile,
/// and sign the account in (creating or linking as needed).
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let csrf_state = query
        .state
        .ok_or_else(|| AppError::BadRequest("Missing state parameter".into()))?;
    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest("Missing code parameter".into()))?;

    let (pkce_verifier, return_url) = state
        .oauth_states
        .lock()
        .await
        .take(&csrf_state)
        .ok_or_else(|| AppError::BadRequest("Unknown or expired sign-in attempt".into()))?;

    let client = build_client(google_config(&state)?)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| AppError::Internal(format!("http client: {}", e)))?;

    let token = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await
        .map_err(|e| AppError::Internal(format!("token exchange: {}", e)))?;

    let info: GoogleUserInfo = http_client
        .get("https://openidconnect.googleapis.com/v1/userinfo")
        .bearer_auth(token.access_token().secret())
        .send()
        .await
        .map_err(|e| AppError::Internal(format!("userinfo: {}", e)))?
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("userinfo body: {}", e)))?;

    let uid = resolve_account(&state, &info)?;
    let display_name = info.name.unwrap_or_else(|| "User".to_string());
    users::ensure_user(
        &state.store,
        &uid,
        &display_name,
        info.email.as_deref(),
        info.picture.as_deref(),
        None,
    )?;

    let session_token = session::create_session(&state.db, &uid, state.config.auth.session_hours)?;
    tracing::info!("google sign-in for account {}", uid);

    let destination = local_return_url(return_url);
    Ok((
        [(header::SET_COOKIE, session::session_cookie(&state.config, &session_token))],
        Redirect::to(&destination),
    )
        .into_response())
}

/// Find the account for a Google identity: by sub first, then by
/// already-registered email (linking the sub), else a fresh account.
fn resolve_account(state: &AppState, info: &GoogleUserInfo) -> AppResult<String> {
    if let Some(account) = accounts::find_by_google_sub(&state.db, &info.sub)? {
        return Ok(account.id);
    }
    if let Some(email) = info.email.as_deref() {
        if let Some(account) = accounts::find_by_email(&state.db, &email.to_lowercase())? {
            accounts::link_google_sub(&state.db, &account.id, &info.sub)?;
            return Ok(account.id);
        }
    }
    let uid = uuid::Uuid::now_v7().to_string();
    accounts::insert_google_account(
        &state.db,
        &uid,
        &info.sub,
        info.email.as_deref(),
        info.name.as_deref().unwrap_or("User"),
    )?;
    Ok(uid)
}
