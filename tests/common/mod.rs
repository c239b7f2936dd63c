// Shared harness for the HTTP-level tests: a real router over a fresh
// in-memory database, driven through tower's oneshot.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

use vitrine::auth::google::OauthStateStore;
use vitrine::config::Config;
use vitrine::outbound::{LogMailer, RecordingSms, SmsGateway};
use vitrine::state::AppState;
use vitrine::store::TreeStore;
use vitrine::{app_router, db};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sms: Arc<RecordingSms>,
}

pub fn test_app() -> TestApp {
    let pool = db::memory_pool().unwrap();
    db::run_migrations(&pool).unwrap();
    let store = TreeStore::new(pool.clone());
    let sms = RecordingSms::new();

    let state = AppState {
        db: pool,
        store,
        config: Config::default(),
        mailer: Arc::new(LogMailer),
        sms: sms.clone() as Arc<dyn SmsGateway>,
        oauth_states: Arc::new(Mutex::new(OauthStateStore::default())),
    };
    let router = app_router().with_state(state.clone());
    TestApp { router, state, sms }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cookie: Option<String>,
    pub body: Value,
    pub text: String,
}

impl TestApp {
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            cookie,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request("GET", uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request("POST", uri, cookie, Some(body)).await
    }

    pub async fn put(&self, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        self.request("PUT", uri, cookie, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request("DELETE", uri, cookie, None).await
    }

    /// Sign up an account and return its session cookie and uid.
    pub async fn signup(&self, name: &str, username: &str, email: &str) -> (String, String) {
        let response = self
            .post(
                "/auth/signup",
                None,
                serde_json::json!({
                    "name": name,
                    "username": username,
                    "email": email,
                    "password": "hunter22",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        let uid = response.body["uid"].as_str().unwrap().to_string();
        (response.cookie.expect("signup sets a session cookie"), uid)
    }

    /// Mark an account's email verified, as the mailed link would.
    pub fn verify_email(&self, uid: &str) {
        vitrine::auth::accounts::mark_email_verified(&self.state.db, uid).unwrap();
    }

    /// A session for the configured owner account.
    pub async fn owner_session(&self) -> (String, String) {
        let owner = self.state.config.auth.owner_username.clone();
        let (cookie, uid) = self
            .signup("Sandesh", &owner, "owner@example.com")
            .await;
        self.verify_email(&uid);
        (cookie, uid)
    }
}
