mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
};
use chat_relay_server::utils::ApiError;
use common::{test_app, ScriptedProvider};
use serde_json::{json, Value};
use tower::ServiceExt;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn hi() -> Value {
    json!({"messages": [{"role": "user", "content": "Hi"}]})
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["ok"]));

    let response = app.oneshot(empty_request(Method::GET, "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_readiness() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["ok"]));

    let response = app
        .oneshot(empty_request(Method::GET, "/health/ready"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_json_records_exchange() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["He", "llo"]));

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/chat", hi()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"response": "Hello"}));

    let response = app
        .oneshot(empty_request(Method::GET, "/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"}
            ],
            "exchanges": 1
        })
    );
}

#[tokio::test]
async fn test_chat_rejects_assistant_terminated_list() {
    let (app, state) = test_app(ScriptedProvider::replying(vec!["unused"]));

    let body = json!({"messages": [
        {"role": "user", "content": "Hi"},
        {"role": "assistant", "content": "Hello"}
    ]});
    let response = app
        .oneshot(json_request(Method::POST, "/chat", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "validation_error");
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(state.relay.history().is_empty());
}

#[tokio::test]
async fn test_chat_rejects_unknown_role_and_empty_list() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["unused"]));

    for body in [
        json!({"messages": [{"role": "moderator", "content": "x"}]}),
        json!({"messages": []}),
        json!({"messages": [{"role": "user", "content": ""}]}),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(Method::POST, "/chat", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_chat_rejects_malformed_body() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["unused"]));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_backend_rate_limit_maps_to_429_and_keeps_user_turn() {
    let (app, state) = test_app(ScriptedProvider::failing(|| {
        ApiError::BackendRateLimit("status 429".into())
    }));

    let response = app
        .oneshot(json_request(Method::POST, "/chat", hi()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error"]["type"], "rate_limit_error");

    let turns = state.relay.history().snapshot();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].is_user());
}

#[tokio::test]
async fn test_backend_failures_map_to_statuses() {
    let cases: [(fn() -> ApiError, StatusCode); 4] = [
        (|| ApiError::BackendAuth("401".into()), StatusCode::UNAUTHORIZED),
        (|| ApiError::BackendTimeout("504".into()), StatusCode::GATEWAY_TIMEOUT),
        (|| ApiError::BackendProtocol("empty".into()), StatusCode::BAD_GATEWAY),
        (|| ApiError::Backend("500".into()), StatusCode::BAD_GATEWAY),
    ];

    for (failure, status) in cases {
        let (app, _) = test_app(ScriptedProvider::failing(failure));
        let response = app
            .oneshot(json_request(Method::POST, "/chat", hi()))
            .await
            .unwrap();
        assert_eq!(response.status(), status);
    }
}

#[tokio::test]
async fn test_chat_stream_frames() {
    let (app, state) = test_app(ScriptedProvider::replying(vec!["He", "llo"]));

    let response = app
        .oneshot(json_request(Method::POST, "/chat/stream", hi()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_text(response).await;
    assert_eq!(body, "data: He\n\ndata: llo\n\ndata: [DONE]\n\n");

    let turns = state.relay.history().snapshot();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1].content(), "Hello");
}

#[tokio::test]
async fn test_chat_stream_carriage_returns_survive_framing() {
    let (app, state) = test_app(ScriptedProvider::replying(vec!["line one\r\n", "line two"]));

    let response = app
        .oneshot(json_request(Method::POST, "/chat/stream", hi()))
        .await
        .unwrap();

    // Each fragment is one event; a reader rejoins data lines with '\n'
    let body = body_text(response).await;
    assert_eq!(
        body,
        "data: line one\ndata: \n\ndata: line two\n\ndata: [DONE]\n\n"
    );
    assert!(!body.contains('\r'));

    let turns = state.relay.history().snapshot();
    assert_eq!(turns[1].content(), "line one\r\nline two");
}

#[tokio::test]
async fn test_chat_negotiates_event_stream() {
    let requests = [
        json_request(Method::POST, "/chat?stream=true", hi()),
        json_request(
            Method::POST,
            "/chat",
            json!({"messages": [{"role": "user", "content": "Hi"}], "stream": true}),
        ),
        Request::builder()
            .method(Method::POST)
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .body(Body::from(hi().to_string()))
            .unwrap(),
    ];

    for request in requests {
        let (app, _) = test_app(ScriptedProvider::replying(vec!["ok"]));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.ends_with("data: [DONE]\n\n"));
    }
}

#[tokio::test]
async fn test_chat_stream_validation_is_plain_400() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["unused"]));

    let body = json!({"messages": [{"role": "assistant", "content": "Hello"}]});
    let response = app
        .oneshot(json_request(Method::POST, "/chat/stream", body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "validation_error");
}

#[tokio::test]
async fn test_chat_stream_backend_failure_is_error_event() {
    let (app, _) = test_app(ScriptedProvider::failing(|| {
        ApiError::BackendTimeout("deadline exceeded".into())
    }));

    let response = app
        .oneshot(json_request(Method::POST, "/chat/stream", hi()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_text(response).await;
    assert!(body.starts_with("event: error\ndata: "));
    assert!(body.contains(r#""type":"timeout_error""#));
    assert!(!body.contains("[DONE]"));
}

#[tokio::test]
async fn test_clear_history() {
    let (app, state) = test_app(ScriptedProvider::replying(vec!["Hello"]));

    app.clone()
        .oneshot(json_request(Method::POST, "/chat", hi()))
        .await
        .unwrap();
    assert_eq!(state.relay.history().len(), 2);

    let response = app
        .clone()
        .oneshot(empty_request(Method::DELETE, "/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request(Method::GET, "/history"))
        .await
        .unwrap();
    assert_eq!(
        body_json(response).await,
        json!({"messages": [], "exchanges": 0})
    );
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (app, _) = test_app(ScriptedProvider::replying(vec!["Hello"]));

    app.clone()
        .oneshot(json_request(Method::POST, "/chat", hi()))
        .await
        .unwrap();

    let response = app
        .oneshot(empty_request(Method::GET, "/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    assert!(text.contains(r#"chat_requests_total{mode="json"} 1"#));
    assert!(text.contains("history_turns 2"));
}
