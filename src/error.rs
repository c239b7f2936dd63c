use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Stable auth error codes, kept compatible with the codes the original
/// hosted provider surfaced. Each maps to a human-readable message;
/// unknown codes fall back to a generic one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCode {
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    TooManyRequests,
    InvalidPhoneNumber,
    QuotaExceeded,
    CaptchaCheckFailed,
    UsernameExhausted,
    Other(String),
}

impl AuthCode {
    pub fn code(&self) -> &str {
        match self {
            AuthCode::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthCode::InvalidEmail => "auth/invalid-email",
            AuthCode::WeakPassword => "auth/weak-password",
            AuthCode::UserNotFound => "auth/user-not-found",
            AuthCode::WrongPassword => "auth/wrong-password",
            AuthCode::InvalidCredential => "auth/invalid-credential",
            AuthCode::TooManyRequests => "auth/too-many-requests",
            AuthCode::InvalidPhoneNumber => "auth/invalid-phone-number",
            AuthCode::QuotaExceeded => "auth/quota-exceeded",
            AuthCode::CaptchaCheckFailed => "auth/captcha-check-failed",
            AuthCode::UsernameExhausted => "auth/username-exhausted",
            AuthCode::Other(code) => code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthCode::EmailAlreadyInUse => "Email already registered",
            AuthCode::InvalidEmail => "Invalid email address",
            AuthCode::WeakPassword => "Password too weak",
            AuthCode::UserNotFound => "No account found",
            AuthCode::WrongPassword => "Incorrect password",
            AuthCode::InvalidCredential => "Invalid email or password",
            AuthCode::TooManyRequests => "Too many attempts, try later",
            AuthCode::InvalidPhoneNumber => "Invalid phone number format",
            AuthCode::QuotaExceeded => "SMS quota exceeded",
            AuthCode::CaptchaCheckFailed => "Recaptcha failed, try again",
            AuthCode::UsernameExhausted => "Could not find a free username, try again",
            AuthCode::Other(_) => "An error occurred",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthCode::UserNotFound | AuthCode::WrongPassword | AuthCode::InvalidCredential => {
                StatusCode::UNAUTHORIZED
            }
            AuthCode::TooManyRequests | AuthCode::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            AuthCode::EmailAlreadyInUse => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for AuthCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Auth error: {0}")]
    Auth(AuthCode),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()).into_response(),
            AppError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()).into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()).into_response(),
            AppError::Auth(code) => (
                code.status(),
                Json(json!({
                    "code": code.code(),
                    "message": code.message(),
                })),
            )
                .into_response(),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(response_status(AppError::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(
            response_status(AppError::Forbidden("Access denied".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn bad_request_returns_400() {
        assert_eq!(
            response_status(AppError::BadRequest("oops".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn quota_exceeded_returns_429() {
        assert_eq!(
            response_status(AppError::Auth(AuthCode::QuotaExceeded)),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn known_codes_map_to_messages() {
        assert_eq!(
            AuthCode::EmailAlreadyInUse.message(),
            "Email already registered"
        );
        assert_eq!(AuthCode::WrongPassword.message(), "Incorrect password");
        assert_eq!(AuthCode::QuotaExceeded.message(), "SMS quota exceeded");
    }

    #[test]
    fn unknown_code_falls_back_to_generic_message() {
        let code = AuthCode::Other("auth/some-new-failure".into());
        assert_eq!(code.code(), "auth/some-new-failure");
        assert_eq!(code.message(), "An error occurred");
    }
}
