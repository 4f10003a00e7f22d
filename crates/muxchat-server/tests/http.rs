//! Router tests: requests go through `tower::ServiceExt::oneshot`, upstreams
//! are wiremock servers.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use muxchat_relay::Relay;
use muxchat_relay::vendors::openai::{OpenAiClientConfig, OpenAiProvider};
use muxchat_server::{REQUEST_ID_HEADER, router};
use tower::ServiceExt as _;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(openai_base_url: &str) -> Router {
    let provider =
        OpenAiProvider::new(OpenAiClientConfig::new("test-key").base_url(openai_base_url))
            .expect("provider");
    let relay = Relay::builder()
        .register_provider(Arc::new(provider))
        .build()
        .expect("relay");
    router(relay)
}

fn post_chat(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).expect("json")
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/health"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"status": "ok"})
    );
}

#[tokio::test]
async fn chat_streams_text_frames_then_done() {
    let server = MockServer::start().await;
    let upstream = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo!\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(upstream.to_string(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_chat(
            r#"{"messages":[{"role":"user","content":"Hi","id":"m1"}],"model":"gpt-4o"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    assert_eq!(
        body_string(response).await,
        concat!(
            "data: {\"type\":\"text\",\"text\":\"Hel\"}\n\n",
            "data: {\"type\":\"text\",\"text\":\"lo!\"}\n\n",
            "data: [DONE]\n\n",
        )
    );
}

#[tokio::test]
async fn unreachable_upstream_streams_only_done() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let response = app(&format!("http://127.0.0.1:{port}"))
        .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"Hi"}]}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "data: [DONE]\n\n");
}

#[tokio::test]
async fn empty_conversation_is_a_bad_request() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_chat(r#"{"messages":[]}"#))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("empty"));
}

#[tokio::test]
async fn unknown_model_is_a_bad_request() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_chat(
            r#"{"messages":[{"role":"user","content":"Hi"}],"model":"gpt-2"}"#,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().expect("error").contains("gpt-2"));
}

#[tokio::test]
async fn model_without_configured_provider_is_unavailable() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_chat(
            r#"{"messages":[{"role":"user","content":"Hi"}],"model":"gemini-pro"}"#,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn malformed_body_is_rejected_with_json_error() {
    let response = app("http://127.0.0.1:9")
        .oneshot(post_chat(r#"{"messages":[{"role":"robot","content":"Hi"}]}"#))
        .await
        .expect("response");
    assert!(response.status().is_client_error());
    let body = body_json(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn models_lists_catalog_availability() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/models"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let models = body.as_array().expect("array");
    assert_eq!(models.len(), 4);
    let gpt = models
        .iter()
        .find(|m| m["id"] == "gpt-4o")
        .expect("gpt-4o listed");
    assert_eq!(gpt["available"], true);
    assert_eq!(gpt["provider"], "openai");
}

#[tokio::test]
async fn metrics_start_at_zero() {
    let response = app("http://127.0.0.1:9")
        .oneshot(get("/metrics"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["streams_started"], 0);
    assert_eq!(body["protocol_errors"], 0);
    assert_eq!(body["protocol_failures"], 0);
}
