use axum::routing::{get, post};
use axum::Router;

use crate::auth::{google, handlers, phone};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(handlers::signup))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me))
        .route("/auth/username/check", get(handlers::check_username))
        .route("/auth/password-reset", post(handlers::request_password_reset))
        .route("/auth/password-reset/confirm", post(handlers::confirm_password_reset))
        .route("/auth/verify/send", post(handlers::send_verification))
        .route("/auth/verify/confirm", post(handlers::confirm_verification))
        .route("/auth/google", get(google::begin))
        .route("/auth/google/callback", get(google::callback))
        .route("/auth/phone/quota", get(phone::quota_status))
        .route("/auth/phone/start", post(phone::start))
        .route("/auth/phone/verify", post(phone::verify))
}
