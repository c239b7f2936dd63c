mod common;

use serde_json::json;

use common::test_app;
use vitrine::store::EventKind;

#[tokio::test]
async fn http_writes_reach_store_subscribers() {
    let app = test_app();
    let (owner_cookie, _) = app.owner_session().await;
    let mut rx = app.state.store.subscribe();

    let created = app
        .post(
            "/codes",
            Some(&owner_cookie),
            json!({ "title": "Hello", "language": "rust", "code": "fn main() {}" }),
        )
        .await;
    let id = created.body["id"].as_str().unwrap().to_string();
    app.delete(&format!("/codes/{}", id), Some(&owner_cookie))
        .await;

    let put = rx.try_recv().unwrap();
    assert_eq!(put.path, format!("codes/{}", id));
    assert_eq!(put.kind, EventKind::Put);

    let delete = rx.try_recv().unwrap();
    assert_eq!(delete.path, format!("codes/{}", id));
    assert_eq!(delete.kind, EventKind::Delete);
}
