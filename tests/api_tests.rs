use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::util::ServiceExt;

// Helper to create test app
fn create_app() -> axum::Router {
    cellarium::create_router()
}

// Helper to get response body as string
async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn put_record_request(uid: &str, name: &str, id: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(format!("/users/{}/collections/{}/{}", uid, name, id))
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_fresh_identity_gets_empty_collection() {
    let app = create_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/nobody/collections/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_unknown_collection_name_is_not_found() {
    let app = create_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/u1/collections/wishlist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_record_then_get_collection() {
    let app = create_app();

    let put_response = app
        .clone()
        .oneshot(put_record_request(
            "u1",
            "active",
            "bottle-1",
            r#"{"name": "Reserva", "quantity": 2}"#,
        ))
        .await
        .unwrap();
    assert_eq!(put_response.status(), StatusCode::NO_CONTENT);

    let get_response = app
        .oneshot(
            Request::builder()
                .uri("/users/u1/collections/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(get_response.status(), StatusCode::OK);
    let body = body_to_string(get_response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["bottle-1"]["name"], "Reserva");
    assert_eq!(json["bottle-1"]["quantity"], 2);
}

#[tokio::test]
async fn test_put_whole_collection_replaces() {
    let app = create_app();

    app.clone()
        .oneshot(put_record_request(
            "u1",
            "active",
            "old",
            r#"{"name": "Old"}"#,
        ))
        .await
        .unwrap();

    let replace_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/users/u1/collections/active")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"new": {"name": "New"}}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(replace_response.status(), StatusCode::NO_CONTENT);

    let get_response = app
        .oneshot(
            Request::builder()
                .uri("/users/u1/collections/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_to_string(get_response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json.get("old").is_none());
    assert_eq!(json["new"]["name"], "New");
}

#[tokio::test]
async fn test_delete_record() {
    let app = create_app();

    app.clone()
        .oneshot(put_record_request(
            "u1",
            "archive",
            "bottle-1",
            r#"{"name": "Done", "rating": 4}"#,
        ))
        .await
        .unwrap();

    let delete_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/users/u1/collections/archive/bottle-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(delete_response.status(), StatusCode::NO_CONTENT);

    // Second delete: already gone
    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/users/u1/collections/archive/bottle-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);

    let get_response = app
        .oneshot(
            Request::builder()
                .uri("/users/u1/collections/archive")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_to_string(get_response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({}));
}

#[tokio::test]
async fn test_identities_are_isolated() {
    let app = create_app();

    app.clone()
        .oneshot(put_record_request(
            "alice",
            "active",
            "bottle-1",
            r#"{"name": "Alice's"}"#,
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/users/bob/collections/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_to_string(response.into_body()).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({}));
}
