// Outbound delivery seams. Real dispatch belongs to external services;
// the server only ever talks to these traits.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &str, token: &str) -> AppResult<()>;
    async fn send_password_reset(&self, email: &str, token: &str) -> AppResult<()>;
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_otp(&self, phone_number: &str, code: &str) -> AppResult<()>;
}

/// Default mailer: logs instead of delivering. Useful for development
/// and the only behavior the test suite relies on.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, token: &str) -> AppResult<()> {
        tracing::info!("verification mail for {}: token {}", email, token);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> AppResult<()> {
        tracing::info!("password reset mail for {}: token {}", email, token);
        Ok(())
    }
}

pub struct LogSmsGateway;

#[async_trait]
impl SmsGateway for LogSmsGateway {
    async fn send_otp(&self, phone_number: &str, code: &str) -> AppResult<()> {
        tracing::info!("OTP text for {}: code {}", phone_number, code);
        Ok(())
    }
}

/// Test double that records sends and can be told to fail, to check
/// that a failed dispatch still consumes quota.
pub struct RecordingSms {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingSms {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SmsGateway for RecordingSms {
    async fn send_otp(&self, phone_number: &str, code: &str) -> AppResult<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::Internal("SMS gateway down".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((phone_number.to_string(), code.to_string()));
        Ok(())
    }
}
