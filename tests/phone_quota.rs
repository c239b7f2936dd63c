mod common;

use axum::http::StatusCode;
use serde_json::json;
use std::sync::atomic::Ordering;

use common::test_app;
use vitrine::quota;

const PHONE: &str = "+15551230001";

fn start_body(phone: &str) -> serde_json::Value {
    json!({ "phoneNumber": phone })
}

#[tokio::test]
async fn invalid_phone_number_spends_no_quota() {
    let app = test_app();
    let response = app.post("/auth/phone/start", None, start_body("5551230001")).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["code"], "auth/invalid-phone-number");

    assert_eq!(
        quota::current_count(&app.state.store, &quota::today_key()).unwrap(),
        0
    );
    assert!(app.sms.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn quota_gate_stops_the_eleventh_send() {
    let app = test_app();
    let limit = app.state.config.quota.sms_daily_limit;
    assert_eq!(limit, 10);

    for i in 0..limit {
        let phone = format!("+1555123{:04}", i);
        let response = app.post("/auth/phone/start", None, start_body(&phone)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
    }
    assert_eq!(app.sms.sent.lock().unwrap().len(), limit as usize);

    let rejected = app.post("/auth/phone/start", None, start_body(PHONE)).await;
    assert_eq!(rejected.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.body["code"], "auth/quota-exceeded");

    // Rejection neither incremented the counter nor reached the gateway.
    assert_eq!(
        quota::current_count(&app.state.store, &quota::today_key()).unwrap(),
        limit
    );
    assert_eq!(app.sms.sent.lock().unwrap().len(), limit as usize);

    let status = app.get("/auth/phone/quota", None).await;
    assert_eq!(status.body["remaining"], 0);
    assert_eq!(status.body["limit"], limit);
}

#[tokio::test]
async fn failed_dispatch_still_consumes_quota() {
    let app = test_app();
    app.sms.fail.store(true, Ordering::SeqCst);

    let response = app.post("/auth/phone/start", None, start_body(PHONE)).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

    assert_eq!(
        quota::current_count(&app.state.store, &quota::today_key()).unwrap(),
        1
    );
    let status = app.get("/auth/phone/quota", None).await;
    assert_eq!(status.body["remaining"], 9);
}

#[tokio::test]
async fn otp_verify_creates_account_and_profile() {
    let app = test_app();
    let start = app.post("/auth/phone/start", None, start_body(PHONE)).await;
    assert_eq!(start.status, StatusCode::OK);
    let code = app.sms.sent.lock().unwrap()[0].1.clone();

    let bad = app
        .post(
            "/auth/phone/verify",
            None,
            json!({ "phoneNumber": PHONE, "code": "12" }),
        )
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    assert!(bad.text.contains("valid 6-digit code"));

    let verified = app
        .post(
            "/auth/phone/verify",
            None,
            json!({ "phoneNumber": PHONE, "code": code }),
        )
        .await;
    assert_eq!(verified.status, StatusCode::OK, "{}", verified.text);
    let uid = verified.body["uid"].as_str().unwrap();
    let username = verified.body["username"].as_str().unwrap();
    assert!(username.starts_with(&format!("user_{}", &uid[..5])));

    // The handle went through the normal reservation path.
    assert_eq!(
        app.state
            .store
            .get(&format!("usernames/{}", username))
            .unwrap()
            .unwrap(),
        json!(uid)
    );

    // Codes are single-use.
    let replay = app
        .post(
            "/auth/phone/verify",
            None,
            json!({ "phoneNumber": PHONE, "code": code }),
        )
        .await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert!(replay.text.contains("Invalid Code"));
}

#[tokio::test]
async fn repeat_login_reuses_the_account() {
    let app = test_app();

    app.post("/auth/phone/start", None, start_body(PHONE)).await;
    let code = app.sms.sent.lock().unwrap()[0].1.clone();
    let first = app
        .post(
            "/auth/phone/verify",
            None,
            json!({ "phoneNumber": PHONE, "code": code }),
        )
        .await;

    app.post("/auth/phone/start", None, start_body(PHONE)).await;
    let code = app.sms.sent.lock().unwrap()[1].1.clone();
    let second = app
        .post(
            "/auth/phone/verify",
            None,
            json!({ "phoneNumber": PHONE, "code": code }),
        )
        .await;

    assert_eq!(first.body["uid"], second.body["uid"]);
    assert_eq!(first.body["username"], second.body["username"]);
    assert_eq!(app.state.store.children("users").unwrap().len(), 1);
}
