// Direct and proxy transports against an in-process HTTP server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use lumenfe::ai::transport::{
    DirectTransport, InputPart, ProxyTransport, RemoteRequest, ResponsePart, Transport, TransportError,
};
use lumenfe::ai::{EditError, RemoteEditService, TransportErrorKind};

/// What the server saw: request path and query, and the JSON body.
type Seen = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Clone)]
struct Reply {
    status: StatusCode,
    body: Value,
    seen: Seen,
}

async fn respond(State(reply): State<Reply>, uri: Uri, body: String) -> impl IntoResponse {
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    reply.seen.lock().unwrap().push((uri.to_string(), parsed));
    (reply.status, axum::Json(reply.body))
}

/// Serve `body` with `status` for every request. Returns the base URL.
async fn serve(status: StatusCode, body: Value) -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new().fallback(respond).with_state(Reply {
        status,
        body,
        seen: seen.clone(),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn image_reply(bytes: &[u8]) -> Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": BASE64.encode(bytes)}}]},
            "finishReason": "STOP"
        }]
    })
}

fn timeout() -> Duration {
    Duration::from_secs(5)
}

#[tokio::test]
async fn proxy_posts_contents_and_normalizes_reply() {
    let (base, seen) = serve(StatusCode::OK, image_reply(&[1, 2, 3])).await;
    let transport = ProxyTransport::new(&format!("{base}/api/gemini"), timeout()).unwrap();

    let request = RemoteRequest::new("image-model", vec![InputPart::text("remove the background")]);
    let response = transport.send(&request).await.unwrap();
    assert!(matches!(
        &response.candidates[0].parts[0],
        ResponsePart::Image { mime_type, data } if mime_type == "image/png" && data == &vec![1, 2, 3]
    ));

    let seen = seen.lock().unwrap();
    let (path, body) = &seen[0];
    assert_eq!(path, "/api/gemini");
    assert_eq!(body["model"], "image-model");
    assert_eq!(body["task"], "generateContent");
    assert_eq!(body["contents"][0]["parts"][0]["text"], "remove the background");
    assert!(body.get("prompt").is_none());
}

#[tokio::test]
async fn proxy_sends_prompt_for_image_generation() {
    let reply = json!({"generatedImages": [{"image": {"imageBytes": BASE64.encode([5u8, 6])}}]});
    let (base, seen) = serve(StatusCode::OK, reply).await;
    let transport = ProxyTransport::new(&base, timeout()).unwrap();

    let response = transport
        .send(&RemoteRequest::images("imagen", "a red fox", "16:9"))
        .await
        .unwrap();
    assert_eq!(response.candidates.len(), 1);

    let seen = seen.lock().unwrap();
    let body = &seen[0].1;
    assert_eq!(body["task"], "generateImages");
    assert_eq!(body["prompt"], "a red fox");
    assert_eq!(body["config"]["aspectRatio"], "16:9");
    assert!(body.get("contents").is_none());
}

#[tokio::test]
async fn proxy_error_body_becomes_status_error() {
    let (base, _) = serve(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "API key not configured"})).await;
    let transport = ProxyTransport::new(&base, timeout()).unwrap();

    let err = transport
        .send(&RemoteRequest::new("m", vec![InputPart::text("x")]))
        .await
        .unwrap_err();
    match err {
        TransportError::Status { status, ref message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "API key not configured");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        EditError::from(err),
        EditError::Transport {
            kind: TransportErrorKind::Server,
            ..
        }
    ));
}

#[tokio::test]
async fn direct_transport_addresses_model_with_key() {
    let (base, seen) = serve(StatusCode::OK, image_reply(&[9])).await;
    let transport = DirectTransport::new(&format!("{base}/v1beta/"), Some("secret"), timeout()).unwrap();

    let request = RemoteRequest::new("image-model", vec![InputPart::text("x")])
        .with_config(json!({"responseModalities": ["IMAGE"]}));
    transport.send(&request).await.unwrap();

    let seen = seen.lock().unwrap();
    let (path, body) = &seen[0];
    assert_eq!(path, "/v1beta/models/image-model:generateContent?key=secret");
    assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
    assert_eq!(body["contents"][0]["role"], "user");
}

#[tokio::test]
async fn direct_api_error_is_classified_by_reason() {
    let reply = json!({"error": {
        "code": 400,
        "message": "API key not valid. Please pass a valid API key.",
        "status": "INVALID_ARGUMENT",
        "details": [{"reason": "API_KEY_INVALID"}]
    }});
    let (base, _) = serve(StatusCode::BAD_REQUEST, reply).await;
    let transport = Arc::new(DirectTransport::new(&base, Some("bad"), timeout()).unwrap());
    let service = RemoteEditService::new(transport, None, Default::default());

    let err = service
        .invoke(RemoteRequest::new("m", vec![InputPart::text("x")]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EditError::Transport {
            kind: TransportErrorKind::Auth,
            ..
        }
    ));
}

#[tokio::test]
async fn blocked_prompt_over_http_is_a_policy_error() {
    let (base, _) = serve(StatusCode::OK, json!({"promptFeedback": {"blockReason": "SAFETY"}})).await;
    let transport = Arc::new(ProxyTransport::new(&base, timeout()).unwrap());
    let service = RemoteEditService::new(transport, None, Default::default());

    let err = service
        .invoke(RemoteRequest::new("m", vec![InputPart::text("x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, EditError::BlockedByPolicy(ref r) if r == "SAFETY"));
}

#[tokio::test]
async fn direct_image_generation_uses_predict() {
    let reply = json!({"predictions": [{"bytesBase64Encoded": BASE64.encode([4u8]), "mimeType": "image/png"}]});
    let (base, seen) = serve(StatusCode::OK, reply).await;
    let transport = DirectTransport::new(&base, Some("k"), timeout()).unwrap();

    let response = transport
        .send(&RemoteRequest::images("imagen", "a lighthouse", "9:16"))
        .await
        .unwrap();
    assert!(matches!(&response.candidates[0].parts[0], ResponsePart::Image { data, .. } if data == &vec![4]));

    let seen = seen.lock().unwrap();
    let (path, body) = &seen[0];
    assert_eq!(path, "/models/imagen:predict?key=k");
    assert_eq!(body["instances"][0]["prompt"], "a lighthouse");
    assert_eq!(body["parameters"]["aspectRatio"], "9:16");
}
