mod common;

use axum::body::{ to_bytes, Body };
use axum::http::{ Request, StatusCode };
use axum::Router;
use common::Harness;
use role_messenger::models::employee::Role;
use role_messenger::server::api::router;
use serde_json::{ json, Value };
use tower::ServiceExt;

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let (status, body) = call(&app, get("/api/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn requests_without_valid_token_are_unauthorized() {
    let h = Harness::new();
    let app = router(h.state(None), None);

    let (status, _) = call(&app, get("/api/messages/contacts", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, get("/api/messages/contacts", Some("abc.def"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid auth token");
}

#[tokio::test]
async fn send_then_read_through_http() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let employee = h.token("E", Role::Employee);
    let hr = h.token("H", Role::Hr);

    let (status, body) = call(
        &app,
        post("/api/messages", Some(&employee), json!({ "toEmployeeId": "H", "text": "  Need leave approval\u{0000}  " }))
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Message sent");
    assert_eq!(body["data"]["text"], "Need leave approval");
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();

    let (status, body) = call(&app, get("/api/messages/unread-summary", Some(&hr))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalUnread"], 1);
    assert_eq!(body["items"][0]["conversationId"], conversation_id.as_str());

    let (status, body) = call(
        &app,
        get(&format!("/api/messages/thread/{}", conversation_id), Some(&hr))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["fromName"], "Eli");
    assert_eq!(body[0]["seen"], false);

    let (status, body) = call(
        &app,
        post(&format!("/api/messages/{}/mark-seen", conversation_id), Some(&hr), json!({}))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked"], 1);

    let (_, body) = call(&app, get("/api/messages/unread-summary", Some(&hr))).await;
    assert_eq!(body["totalUnread"], 0);

    let (status, body) = call(&app, get("/api/messages/contacts", Some(&employee))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["otherEmployeeId"], "H");
    assert_eq!(body[0]["otherRole"], "hr");
    assert_eq!(body[0]["lastMessage"], "Need leave approval");
}

#[tokio::test]
async fn content_field_is_accepted_as_fallback() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let director = h.token("D", Role::Director);
    let (status, body) = call(
        &app,
        post("/api/messages", Some(&director), json!({ "toEmployeeId": "P", "content": "status?" }))
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["text"], "status?");
}

#[tokio::test]
async fn error_codes_map_to_http_statuses() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let employee = h.token("E", Role::Employee);
    let director = h.token("D", Role::Director);

    let (status, _) = call(&app, post("/api/messages", Some(&employee), json!({ "text": "hi" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, post("/api/messages", Some(&employee), json!({ "toEmployeeId": "H", "text": " \n " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, post("/api/messages", Some(&employee), json!({ "toEmployeeId": "F", "text": "hey" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, post("/api/messages", Some(&employee), json!({ "toEmployeeId": "nobody", "text": "hey" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call(&app, post("/api/messages", Some(&employee), json!({ "toEmployeeId": "H", "text": "private" }))).await;
    let conversation_id = body["conversationId"].as_str().unwrap().to_string();
    let (status, _) = call(&app, get(&format!("/api/messages/thread/{}", conversation_id), Some(&director))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(
        &app,
        post(&format!("/api/messages/{}/mark-seen", conversation_id), Some(&director), json!({}))
    ).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_send_body_is_a_json_400() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let employee = h.token("E", Role::Employee);

    let req = Request::builder()
        .method("POST")
        .uri("/api/messages")
        .header("content-type", "application/json")
        .header("Authorization", format!("Bearer {}", employee))
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request body");

    let req = Request::builder()
        .method("POST")
        .uri("/api/messages")
        .header("Authorization", format!("Bearer {}", employee))
        .body(Body::from(r#"{"toEmployeeId":"H","text":"hi"}"#))
        .unwrap();
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request body");
}

#[tokio::test]
async fn token_signed_by_the_portal_is_accepted() {
    use jsonwebtoken::{ encode, EncodingKey, Header };

    let h = Harness::new();
    let app = router(h.state(None), None);
    let claims = json!({
        "employeeId": "E",
        "role": "employee",
        "iat": chrono::Utc::now().timestamp(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(common::SECRET.as_bytes())).unwrap();

    let (status, _) = call(&app, get("/api/messages/contacts", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn thirty_first_send_gets_429() {
    let h = Harness::new();
    let app = router(h.state(None), None);
    let director = h.token("D", Role::Director);
    for i in 0..30 {
        let (status, _) = call(
            &app,
            post("/api/messages", Some(&director), json!({ "toEmployeeId": "H", "text": format!("memo {}", i) }))
        ).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = call(
        &app,
        post("/api/messages", Some(&director), json!({ "toEmployeeId": "H", "text": "one more" }))
    ).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Rate limit exceeded. Please slow down.");
}

#[tokio::test]
async fn directory_reload_requires_api_key() {
    let h = Harness::new();
    let app = router(h.state(Some("admin-key")), None);

    let (status, _) = call(&app, post("/api/directory/reload", None, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/directory/reload")
        .header("X-API-Key", "admin-key")
        .body(Body::empty())
        .unwrap();
    // the harness directory has no backing file
    let (status, body) = call(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["employees"], 5);
}
