use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chat_socket::{AppState, app};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> Router {
    app(AppState::new(100, 16))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn posted_messages_are_listed() {
    let app = test_app();

    let (status, body) = send(&app, get("/api/messages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, posted) = send(
        &app,
        post_json(
            "/api/messages",
            r#"{"username": " alice ", "message": "hello world "}"#,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(posted["username"], "alice");
    assert_eq!(posted["message"], "hello world");
    assert!(posted["id"].is_i64());
    assert!(posted["timestamp"].is_string());

    let (_, listed) = send(&app, get("/api/messages")).await;
    assert_eq!(listed, json!([posted]));
}

#[tokio::test]
async fn message_validation_errors() {
    let app = test_app();

    let cases = [
        (r#"{"username": "alice"}"#, "Username and message are required"),
        (
            r#"{"username": "alice", "message": 5}"#,
            "Username and message must be strings",
        ),
        (
            r#"{"username": "alice", "message": "   "}"#,
            "Username and message cannot be empty",
        ),
        (
            r#"{"username": "abcdefghijklmnopqrstu", "message": "hi"}"#,
            "Username too long (max 20 chars) or message too long (max 1000 chars)",
        ),
    ];

    for (body, error) in cases {
        let (status, response) = send(&app, post_json("/api/messages", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response, json!({ "error": error }), "{body}");
    }

    let (_, listed) = send(&app, get("/api/messages")).await;
    assert_eq!(listed, json!([]));
}

#[tokio::test]
async fn only_the_last_hundred_messages_are_kept() {
    let app = test_app();

    for i in 0..101 {
        let body = json!({ "username": "bob", "message": format!("#{i}") }).to_string();
        let (status, _) = send(&app, post_json("/api/messages", &body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, listed) = send(&app, get("/api/messages")).await;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 100);
    assert_eq!(listed[0]["message"], "#1");
    assert_eq!(listed[99]["message"], "#100");
}

#[tokio::test]
async fn joining_lists_the_user() {
    let app = test_app();

    let (status, user) = send(&app, post_json("/api/users/join", r#"{"username": "carol"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "carol");
    assert!(user["joinedAt"].is_string());

    let (status, users) = send(&app, get("/api/users")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users, json!([user]));
}

#[tokio::test]
async fn join_validation_errors() {
    let app = test_app();

    let cases = [
        (r#"{}"#, "Username is required"),
        (r#"{"username": ["x"]}"#, "Username must be a string"),
        (r#"{"username": "    "}"#, "Username cannot be empty"),
        (r#"{"username": "x"}"#, "Username must be between 2 and 20 characters"),
    ];

    for (body, error) in cases {
        let (status, response) = send(&app, post_json("/api/users/join", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response, json!({ "error": error }), "{body}");
    }
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let app = test_app();

    let (status, body) = send(&app, post_json("/api/messages", "{\"username\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid JSON format" }));
}

#[tokio::test]
async fn body_without_json_content_type_counts_as_empty() {
    let app = test_app();

    let request = Request::post("/api/users/join")
        .body(Body::from(r#"{"username": "dave"}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Username is required" }));
}

#[tokio::test]
async fn unknown_routes_are_json_404s() {
    let app = test_app();

    let (status, body) = send(&app, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));
}

#[tokio::test]
async fn scalar_bodies_are_invalid_json() {
    let app = test_app();

    for (uri, body) in [
        ("/api/users/join", r#""bob""#),
        ("/api/messages", "null"),
        ("/api/messages", "42"),
        ("/api/users/join", "true"),
    ] {
        let (status, response) = send(&app, post_json(uri, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
        assert_eq!(response, json!({ "error": "Invalid JSON format" }), "{uri} {body}");
    }

    let (status, response) = send(&app, post_json("/api/users/join", r#"["bob"]"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response, json!({ "error": "Username is required" }));
}

#[tokio::test]
async fn emoji_count_as_two_towards_length_limits() {
    let app = test_app();

    let (status, user) = send(&app, post_json("/api/users/join", r#"{"username": "😀"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["username"], "😀");

    let body = json!({ "username": "😀".repeat(11) }).to_string();
    let (status, response) = send(&app, post_json("/api/users/join", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response,
        json!({ "error": "Username must be between 2 and 20 characters" })
    );
}

#[tokio::test]
async fn timestamps_have_millisecond_precision() {
    let app = test_app();

    let (_, posted) = send(
        &app,
        post_json("/api/messages", r#"{"username": "alice", "message": "hi"}"#),
    )
    .await;
    let timestamp = posted["timestamp"].as_str().unwrap();

    // 2024-05-01T12:30:05.584Z
    assert_eq!(timestamp.len(), 24, "{timestamp}");
    assert!(timestamp.ends_with('Z'), "{timestamp}");
}
