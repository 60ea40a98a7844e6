// ============================================================================
// TRANSPORTS — request model, normalized response, direct and proxy adapters
// ============================================================================
//
// Both transports accept the same `RemoteRequest` and hand back the same
// `NormalizedResponse`. Every shape difference between the REST API, the
// proxy and the image endpoint is settled here and nowhere downstream.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::api;
use super::video::{VideoOperation, VideoRequest};
use crate::artifact::Artifact;
use crate::cache::sha256_hex;

// ============================================================================
// REQUEST
// ============================================================================

/// One ordered input to a remote call.
#[derive(Clone, Debug)]
pub enum InputPart {
    Text(String),
    Image(Artifact),
    /// Reference to an already uploaded file. Not part of the fingerprint.
    FileUri { uri: String, mime_type: String },
}

impl InputPart {
    pub fn text(text: impl Into<String>) -> Self {
        InputPart::Text(text.into())
    }

    /// Component hashed into the request fingerprint.
    fn fingerprint_component(&self) -> String {
        match self {
            InputPart::Text(text) if text.is_empty() => String::new(),
            InputPart::Text(text) => sha256_hex(text),
            InputPart::Image(artifact) if artifact.is_empty() => String::new(),
            InputPart::Image(artifact) => sha256_hex(artifact.to_base64()),
            InputPart::FileUri { .. } => String::new(),
        }
    }

    fn to_wire(&self) -> api::Part {
        match self {
            InputPart::Text(text) => api::Part {
                text: Some(text.clone()),
                ..Default::default()
            },
            InputPart::Image(artifact) => api::Part {
                inline_data: Some(api::Blob {
                    data: Some(artifact.to_base64()),
                    mime_type: Some(artifact.mime_type().to_string()),
                }),
                ..Default::default()
            },
            InputPart::FileUri { uri, mime_type } => api::Part {
                file_data: Some(api::FileData {
                    file_uri: Some(uri.clone()),
                    mime_type: Some(mime_type.clone()),
                }),
                ..Default::default()
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteTask {
    /// Multimodal `generateContent`.
    GenerateContent,
    /// Text-to-image generation. The prompt is the concatenated text parts,
    /// `config.aspectRatio` selects the shape.
    GenerateImages,
}

impl RemoteTask {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteTask::GenerateContent => "generateContent",
            RemoteTask::GenerateImages => "generateImages",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemoteRequest {
    pub model: String,
    pub parts: Vec<InputPart>,
    pub config: Option<Value>,
    pub task: RemoteTask,
}

impl RemoteRequest {
    pub fn new(model: impl Into<String>, parts: Vec<InputPart>) -> Self {
        Self {
            model: model.into(),
            parts,
            config: None,
            task: RemoteTask::GenerateContent,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn images(model: impl Into<String>, prompt: impl Into<String>, aspect_ratio: &str) -> Self {
        Self {
            model: model.into(),
            parts: vec![InputPart::Text(prompt.into())],
            config: Some(serde_json::json!({ "numberOfImages": 1, "aspectRatio": aspect_ratio })),
            task: RemoteTask::GenerateImages,
        }
    }

    pub fn prompt(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                InputPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn aspect_ratio(&self) -> Option<&str> {
        self.config.as_ref()?.get("aspectRatio")?.as_str()
    }

    /// Stable cache key for this request, a lowercase SHA-256 hex string.
    ///
    /// Content requests hash `model:<part hashes>:<config json>`. Text parts
    /// hash their text, images hash their base64 encoding. Empty parts and
    /// file references contribute nothing. Image generation hashes `model:prompt:aspect`.
    pub fn fingerprint(&self) -> String {
        match self.task {
            RemoteTask::GenerateContent => {
                let parts: String = self.parts.iter().map(InputPart::fingerprint_component).collect();
                let config = self.config.as_ref().map(Value::to_string).unwrap_or_default();
                sha256_hex(format!("{}:{}:{}", self.model, parts, config))
            }
            RemoteTask::GenerateImages => sha256_hex(format!(
                "{}:{}:{}",
                self.model,
                self.prompt(),
                self.aspect_ratio().unwrap_or("1:1")
            )),
        }
    }

    fn contents(&self) -> Vec<api::Content> {
        vec![api::Content {
            parts: Some(self.parts.iter().map(InputPart::to_wire).collect()),
            role: Some("user".to_string()),
        }]
    }
}

// ============================================================================
// NORMALIZED RESPONSE
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePart {
    Image { mime_type: String, data: Vec<u8> },
    Text(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedCandidate {
    pub parts: Vec<ResponsePart>,
    pub finish_reason: Option<String>,
    /// Category of the first safety rating marked as blocked.
    pub blocked_category: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedResponse {
    pub candidates: Vec<NormalizedCandidate>,
    pub block_reason: Option<String>,
}

impl NormalizedResponse {
    pub fn image(mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            candidates: vec![NormalizedCandidate {
                parts: vec![ResponsePart::Image {
                    mime_type: mime_type.to_string(),
                    data,
                }],
                finish_reason: Some("STOP".to_string()),
                blocked_category: None,
            }],
            block_reason: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            candidates: vec![NormalizedCandidate {
                parts: vec![ResponsePart::Text(text.to_string())],
                finish_reason: Some("STOP".to_string()),
                blocked_category: None,
            }],
            block_reason: None,
        }
    }

    pub fn blocked(reason: &str) -> Self {
        Self {
            candidates: Vec::new(),
            block_reason: Some(reason.to_string()),
        }
    }

    /// Concatenated text of the first candidate.
    pub fn first_text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

fn decode_inline(data: &str) -> Option<Vec<u8>> {
    match BASE64.decode(data.trim()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log_warn!("Dropping inline part with invalid base64: {}", e);
            None
        }
    }
}

impl From<api::GenerateContentResponse> for NormalizedResponse {
    fn from(resp: api::GenerateContentResponse) -> Self {
        let mut candidates: Vec<NormalizedCandidate> = resp
            .candidates
            .unwrap_or_default()
            .into_iter()
            .map(|cand| {
                let parts = cand
                    .content
                    .and_then(|c| c.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| {
                        if let Some(blob) = p.inline_data
                            && let Some(data) = blob.data
                        {
                            return Some(ResponsePart::Image {
                                mime_type: blob.mime_type.unwrap_or_default(),
                                data: decode_inline(&data)?,
                            });
                        }
                        p.text.map(ResponsePart::Text)
                    })
                    .collect();
                let blocked_category = cand
                    .safety_ratings
                    .unwrap_or_default()
                    .into_iter()
                    .find(|r| r.blocked == Some(true))
                    .and_then(|r| r.category);
                NormalizedCandidate {
                    parts,
                    finish_reason: cand.finish_reason,
                    blocked_category,
                }
            })
            .collect();

        // A relayed image-generation result becomes one image candidate
        if let Some(images) = resp.generated_images {
            let parts: Vec<ResponsePart> = images
                .into_iter()
                .filter_map(|g| {
                    let image = g.image?;
                    Some(ResponsePart::Image {
                        mime_type: image.mime_type.unwrap_or_else(|| "image/png".to_string()),
                        data: decode_inline(&image.image_bytes?)?,
                    })
                })
                .collect();
            if !parts.is_empty() {
                candidates.push(NormalizedCandidate {
                    parts,
                    finish_reason: None,
                    blocked_category: None,
                });
            }
        }

        Self {
            candidates,
            block_reason: resp.prompt_feedback.and_then(|f| f.block_reason),
        }
    }
}

impl From<api::PredictResponse> for NormalizedResponse {
    fn from(resp: api::PredictResponse) -> Self {
        let predictions = resp.predictions.unwrap_or_default();
        let mut parts = Vec::new();
        let mut filtered = None;
        for p in predictions {
            match p.bytes_base64_encoded.as_deref().and_then(decode_inline) {
                Some(data) => parts.push(ResponsePart::Image {
                    mime_type: p.mime_type.unwrap_or_else(|| "image/png".to_string()),
                    data,
                }),
                None => filtered = filtered.or(p.rai_filtered_reason),
            }
        }
        if parts.is_empty() && filtered.is_none() {
            return Self::default();
        }
        let finish_reason = parts.is_empty().then(|| "SAFETY".to_string());
        Self {
            candidates: vec![NormalizedCandidate {
                parts,
                finish_reason,
                blocked_category: filtered,
            }],
            block_reason: None,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("API key is not configured")]
    MissingCredentials,
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

// ============================================================================
// TRANSPORT SEAM
// ============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, request: &RemoteRequest) -> Result<NormalizedResponse, TransportError>;

    async fn start_video(&self, _request: &VideoRequest) -> Result<VideoOperation, TransportError> {
        Err(TransportError::Unsupported("video generation"))
    }

    async fn poll_video(&self, _operation: &VideoOperation) -> Result<VideoOperation, TransportError> {
        Err(TransportError::Unsupported("video generation"))
    }

    async fn download(&self, _uri: &str) -> Result<Artifact, TransportError> {
        Err(TransportError::Unsupported("downloads"))
    }
}

fn build_client(timeout: Duration) -> Result<Client, TransportError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(TransportError::from)
}

/// Send and parse a JSON body, turning non-success statuses into
/// `TransportError::Status` with whatever message the body carries.
async fn send_json<T: DeserializeOwned>(
    builder: RequestBuilder,
    error_message: fn(&str) -> Option<String>,
) -> Result<T, TransportError> {
    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| fallback_message(status, &body));
        return Err(TransportError::Status {
            status: status.as_u16(),
            message,
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("Backend error: {}", status.canonical_reason().unwrap_or("unknown status"))
    } else {
        body.to_string()
    }
}

/// `STATUS: message [REASON...]` from an API error body. Reasons carry
/// markers such as `API_KEY_INVALID` that classification relies on.
fn api_error_message(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<api::ApiErrorBody>(body).ok()?.error?;
    let mut pieces = Vec::new();
    if let Some(status) = detail.status {
        pieces.push(status);
    }
    if let Some(message) = detail.message {
        pieces.push(message);
    }
    for d in detail.details.unwrap_or_default() {
        if let Some(reason) = d.get("reason").and_then(Value::as_str) {
            pieces.push(reason.to_string());
        }
    }
    (!pieces.is_empty()).then(|| pieces.join(": "))
}

/// `{"error": "..."}` from the proxy. Object errors fall back to the API form.
fn proxy_error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<api::ProxyErrorBody>(body).ok()?.error? {
        Value::String(s) => Some(s),
        Value::Null => None,
        _ => api_error_message(body),
    }
}

// ============================================================================
// DIRECT TRANSPORT
// ============================================================================

/// Talks to the public REST API with an API key.
pub struct DirectTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DirectTransport {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self, TransportError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(TransportError::MissingCredentials)?;
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn send(&self, request: &RemoteRequest) -> Result<NormalizedResponse, TransportError> {
        match request.task {
            RemoteTask::GenerateContent => {
                let body = api::GenerateContentRequest {
                    contents: request.contents(),
                    generation_config: request.config.clone(),
                };
                let builder = self
                    .client
                    .post(self.model_url(&request.model, "generateContent"))
                    .query(&[("key", &self.api_key)])
                    .json(&body);
                let resp: api::GenerateContentResponse = send_json(builder, api_error_message).await?;
                Ok(resp.into())
            }
            RemoteTask::GenerateImages => {
                let body = api::PredictRequest {
                    instances: vec![api::PredictInstance {
                        prompt: request.prompt(),
                    }],
                    parameters: api::PredictParameters {
                        sample_count: 1,
                        aspect_ratio: request.aspect_ratio().map(str::to_string),
                    },
                };
                let builder = self
                    .client
                    .post(self.model_url(&request.model, "predict"))
                    .query(&[("key", &self.api_key)])
                    .json(&body);
                let resp: api::PredictResponse = send_json(builder, api_error_message).await?;
                Ok(resp.into())
            }
        }
    }

    async fn start_video(&self, request: &VideoRequest) -> Result<VideoOperation, TransportError> {
        let body = api::VideoPredictRequest {
            instances: vec![api::VideoInstance {
                prompt: request.prompt.clone(),
                image: request.image.as_ref().map(|a| api::VideoImage {
                    bytes_base64_encoded: a.to_base64(),
                    mime_type: a.mime_type().to_string(),
                }),
            }],
            parameters: api::VideoParameters {
                aspect_ratio: request.aspect_ratio.clone(),
                resolution: request.resolution.clone(),
                sample_count: 1,
            },
        };
        let builder = self
            .client
            .post(self.model_url(&request.model, "predictLongRunning"))
            .query(&[("key", &self.api_key)])
            .json(&body);
        let op: api::Operation = send_json(builder, api_error_message).await?;
        Ok(op.into())
    }

    async fn poll_video(&self, operation: &VideoOperation) -> Result<VideoOperation, TransportError> {
        let url = format!("{}/{}", self.base_url, operation.name.trim_start_matches('/'));
        let builder = self.client.get(url).query(&[("key", &self.api_key)]);
        let op: api::Operation = send_json(builder, api_error_message).await?;
        Ok(op.into())
    }

    async fn download(&self, uri: &str) -> Result<Artifact, TransportError> {
        let sep = if uri.contains('?') { '&' } else { '?' };
        let url = format!("{uri}{sep}key={}", self.api_key);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: format!("Failed to download video: {}", status.canonical_reason().unwrap_or("")),
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("video/mp4")
            .to_string();
        let bytes = response.bytes().await?;
        Ok(Artifact::new("generated-video.mp4", mime, bytes.to_vec()))
    }
}

// ============================================================================
// PROXY TRANSPORT
// ============================================================================

/// Posts `{model, contents|prompt, config, task}` to a local endpoint that
/// holds the credentials.
pub struct ProxyTransport {
    client: Client,
    endpoint: String,
}

impl ProxyTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl Transport for ProxyTransport {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn send(&self, request: &RemoteRequest) -> Result<NormalizedResponse, TransportError> {
        let (contents, prompt) = match request.task {
            RemoteTask::GenerateContent => (Some(request.contents()), None),
            RemoteTask::GenerateImages => (None, Some(request.prompt())),
        };
        let body = api::ProxyRequest {
            model: &request.model,
            contents,
            prompt,
            config: request.config.as_ref(),
            task: request.task.as_str(),
        };
        let builder = self.client.post(&self.endpoint).json(&body);
        let resp: api::GenerateContentResponse = send_json(builder, proxy_error_message).await?;
        Ok(resp.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> Artifact {
        Artifact::new("a.png", "image/png", vec![1u8, 2, 3])
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let a = RemoteRequest::new("m", vec![InputPart::text("x")]);
        let b = RemoteRequest::new("m", vec![InputPart::text("x")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let other_model = RemoteRequest::new("n", vec![InputPart::text("x")]);
        let other_text = RemoteRequest::new("m", vec![InputPart::text("y")]);
        let with_config = a.clone().with_config(serde_json::json!({"temperature": 0}));
        assert_ne!(a.fingerprint(), other_model.fingerprint());
        assert_ne!(a.fingerprint(), other_text.fingerprint());
        assert_ne!(a.fingerprint(), with_config.fingerprint());
    }

    #[test]
    fn fingerprint_matches_documented_layout() {
        let req = RemoteRequest::new("m", vec![InputPart::text("x"), InputPart::Image(png())]);
        let expected = sha256_hex(format!("m:{}{}:", sha256_hex("x"), sha256_hex("AQID")));
        assert_eq!(req.fingerprint(), expected);
    }

    #[test]
    fn empty_text_contributes_nothing() {
        let empty = RemoteRequest::new("m", vec![InputPart::Image(png()), InputPart::text("")]);
        let expected = sha256_hex(format!("m:{}:", sha256_hex("AQID")));
        assert_eq!(empty.fingerprint(), expected);
        let bare = RemoteRequest::new("m", vec![InputPart::Image(png())]);
        assert_eq!(empty.fingerprint(), bare.fingerprint());
    }

    #[test]
    fn part_order_matters() {
        let ab = RemoteRequest::new("m", vec![InputPart::text("a"), InputPart::text("b")]);
        let ba = RemoteRequest::new("m", vec![InputPart::text("b"), InputPart::text("a")]);
        assert_ne!(ab.fingerprint(), ba.fingerprint());
    }

    #[test]
    fn file_references_do_not_contribute() {
        let plain = RemoteRequest::new("m", vec![InputPart::text("a")]);
        let with_file = RemoteRequest::new(
            "m",
            vec![
                InputPart::text("a"),
                InputPart::FileUri {
                    uri: "files/1".into(),
                    mime_type: "image/png".into(),
                },
            ],
        );
        assert_eq!(plain.fingerprint(), with_file.fingerprint());
    }

    #[test]
    fn image_generation_key_uses_prompt_and_aspect() {
        let req = RemoteRequest::images("imagen", "a cat", "16:9");
        assert_eq!(req.fingerprint(), sha256_hex("imagen:a cat:16:9"));
    }

    #[test]
    fn normalizes_content_response() {
        let json = r#"{
            "candidates": [{
                "content": {"parts": [
                    {"text": "thinking", "thought": true},
                    {"text": "done"},
                    {"inlineData": {"mimeType": "image/png", "data": "AQID"}}
                ]},
                "finishReason": "STOP",
                "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "blocked": false}]
            }],
            "promptFeedback": {}
        }"#;
        let resp: api::GenerateContentResponse = serde_json::from_str(json).unwrap();
        let norm = NormalizedResponse::from(resp);
        assert!(norm.block_reason.is_none());
        let cand = &norm.candidates[0];
        assert_eq!(
            cand.parts,
            vec![
                ResponsePart::Text("done".into()),
                ResponsePart::Image {
                    mime_type: "image/png".into(),
                    data: vec![1, 2, 3]
                }
            ]
        );
        assert!(cand.blocked_category.is_none());
    }

    #[test]
    fn normalizes_blocked_rating_category() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY",
            "safetyRatings": [{"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "blocked": true}]}]}"#;
        let resp: api::GenerateContentResponse = serde_json::from_str(json).unwrap();
        let norm = NormalizedResponse::from(resp);
        assert_eq!(norm.candidates[0].blocked_category.as_deref(), Some("HARM_CATEGORY_DANGEROUS_CONTENT"));
        assert!(norm.candidates[0].parts.is_empty());
    }

    #[test]
    fn normalizes_generated_images_shape() {
        let json = r#"{"generatedImages": [{"image": {"imageBytes": "AQID"}}]}"#;
        let resp: api::GenerateContentResponse = serde_json::from_str(json).unwrap();
        let norm = NormalizedResponse::from(resp);
        assert_eq!(norm.candidates.len(), 1);
        assert!(matches!(&norm.candidates[0].parts[0], ResponsePart::Image { mime_type, .. } if mime_type == "image/png"));
    }

    #[test]
    fn normalizes_predict_response() {
        let ok: api::PredictResponse =
            serde_json::from_str(r#"{"predictions": [{"bytesBase64Encoded": "AQID", "mimeType": "image/jpeg"}]}"#)
                .unwrap();
        let norm = NormalizedResponse::from(ok);
        assert!(matches!(&norm.candidates[0].parts[0], ResponsePart::Image { data, .. } if data == &vec![1, 2, 3]));

        let filtered: api::PredictResponse =
            serde_json::from_str(r#"{"predictions": [{"raiFilteredReason": "celebrity"}]}"#).unwrap();
        let norm = NormalizedResponse::from(filtered);
        assert_eq!(norm.candidates[0].finish_reason.as_deref(), Some("SAFETY"));
        assert_eq!(norm.candidates[0].blocked_category.as_deref(), Some("celebrity"));

        let empty: api::PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(NormalizedResponse::from(empty).candidates.is_empty());
    }

    #[test]
    fn api_error_bodies_keep_reason_markers() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT",
            "details": [{"@type": "type.googleapis.com/google.rpc.ErrorInfo", "reason": "API_KEY_INVALID"}]}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("INVALID_ARGUMENT: API key not valid.: API_KEY_INVALID")
        );
        assert_eq!(api_error_message("not json"), None);
        assert_eq!(proxy_error_message(r#"{"error": "API key not configured"}"#).as_deref(), Some("API key not configured"));
        assert_eq!(
            fallback_message(StatusCode::BAD_GATEWAY, ""),
            "Backend error: Bad Gateway"
        );
    }

    #[test]
    fn direct_transport_requires_a_key() {
        assert!(matches!(
            DirectTransport::new("https://x", None, Duration::from_secs(1)),
            Err(TransportError::MissingCredentials)
        ));
        assert!(matches!(
            DirectTransport::new("https://x", Some("  "), Duration::from_secs(1)),
            Err(TransportError::MissingCredentials)
        ));
    }
}
