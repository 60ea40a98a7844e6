// ============================================================================
// REMOTE EDIT SERVICE — cache-first invocation and response interpretation
// ============================================================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{EditError, MissingInput};
use super::prompts::RemoteOp;
use super::transport::{
    DirectTransport, InputPart, NormalizedResponse, ProxyTransport, RemoteRequest, ResponsePart, Transport,
    TransportError,
};
use super::video::{CancelToken, PollPolicy, PollState, VideoRequest, run_video_job};
use crate::artifact::Artifact;
use crate::cache::{CachePolicy, CacheStore};
use crate::components::mask::BoundingBox;
use crate::components::tools::{ToolId, ToolParams};
use crate::settings::{EditorSettings, TransportKind};

/// Model identifiers per kind of call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSet {
    pub image: String,
    pub text: String,
    pub fast_text: String,
    pub imagen: String,
    pub video: String,
}

impl ModelSet {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            image: settings.image_model.clone(),
            text: settings.text_model.clone(),
            fast_text: settings.fast_text_model.clone(),
            imagen: settings.imagen_model.clone(),
            video: settings.video_model.clone(),
        }
    }
}

impl Default for ModelSet {
    fn default() -> Self {
        Self::from_settings(&EditorSettings::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultSource {
    Remote,
    Cache,
}

#[derive(Clone, Debug)]
pub struct EditResult {
    pub artifact: Artifact,
    pub source: ResultSource,
    pub fingerprint: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptCheck {
    pub is_specific: bool,
    pub suggestion: String,
}

/// A tool picked for a free-text request, with the arguments to run it with.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSuggestion {
    pub tool: ToolId,
    pub args: ToolParams,
}

/// Tools a free-text request can be routed to: (tool, what it does, arguments).
const SUGGESTIBLE: &[(ToolId, &str, &str)] = &[
    (
        ToolId::PhotoRestoration,
        "restore an old or damaged photo",
        "colorize (boolean): true when the user asks for color; defaults to true",
    ),
    (ToolId::RemoveBg, "remove the background", ""),
    (
        ToolId::Style,
        "apply an artistic style",
        "prompt (string, required): the style, e.g. anime, Van Gogh, cyberpunk",
    ),
    (ToolId::Upscale, "increase the resolution", "factor (number): 2, 4 or 8; defaults to 4"),
    (ToolId::ImageGen, "generate a new image from text", "prompt (string, required)"),
    (ToolId::GenerativeEdit, "change a marked area", "prompt (string, required)"),
    (ToolId::ObjectRemover, "erase an unwanted object", ""),
    (ToolId::Relight, "change the lighting", "prompt (string, required)"),
    (ToolId::AiAdjust, "adjust colors and light from a description", "prompt (string, required)"),
    (ToolId::Crop, "crop the image", ""),
];

pub struct RemoteEditService {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<CacheStore>>,
    models: ModelSet,
}

impl RemoteEditService {
    pub fn new(transport: Arc<dyn Transport>, cache: Option<Arc<CacheStore>>, models: ModelSet) -> Self {
        Self {
            transport,
            cache,
            models,
        }
    }

    /// Build the configured transport and open the cache. A cache that
    /// cannot be opened on disk degrades to memory.
    pub fn from_settings(settings: &EditorSettings, use_cache: bool) -> Result<Self, TransportError> {
        let transport: Arc<dyn Transport> = match settings.transport {
            TransportKind::Direct => Arc::new(DirectTransport::new(
                &settings.api_base_url,
                settings.api_key.as_deref(),
                settings.request_timeout(),
            )?),
            TransportKind::Proxy => Arc::new(ProxyTransport::new(
                &settings.proxy_endpoint,
                settings.request_timeout(),
            )?),
        };

        let cache = use_cache.then(|| {
            let policy = CachePolicy {
                max_entries: settings.cache_max_entries.max(1),
                ttl: settings.cache_ttl(),
            };
            let store = match &settings.cache_dir {
                Some(dir) => CacheStore::open(dir, policy).unwrap_or_else(|e| {
                    log_warn!("Cache at {} unavailable ({}), using memory", dir.display(), e);
                    CacheStore::in_memory(policy)
                }),
                None => CacheStore::in_memory(policy),
            };
            Arc::new(store)
        });

        log_info!(
            "Remote edits via {} transport, cache {}",
            transport.name(),
            if cache.is_some() { "on" } else { "off" }
        );
        Ok(Self::new(transport, cache, ModelSet::from_settings(settings)))
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn cache(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    // ========================================================================
    // IMAGE EDITS
    // ========================================================================

    /// Produce an image for `request`, from the cache when possible.
    ///
    /// Failures are logged in full here; callers only translate them.
    pub async fn invoke(&self, request: RemoteRequest) -> Result<EditResult, EditError> {
        let fingerprint = request.fingerprint();

        if let Some(artifact) = self.cached(&fingerprint, &request.model).await {
            return Ok(EditResult {
                artifact,
                source: ResultSource::Cache,
                fingerprint,
            });
        }

        let response = match self.transport.send(&request).await {
            Ok(r) => r,
            Err(e) => {
                log_err!("{} request to {} failed: {}", self.transport.name(), request.model, e);
                return Err(e.into());
            }
        };

        let artifact = match Self::interpret(&response, &fingerprint) {
            Ok(a) => a,
            Err(e) => {
                log_err!("Unusable response from {}: {}", request.model, e);
                return Err(e);
            }
        };

        self.remember(&fingerprint, &artifact).await;

        Ok(EditResult {
            artifact,
            source: ResultSource::Remote,
            fingerprint,
        })
    }

    /// Cache lookup. Read failures are logged and count as a miss.
    async fn cached(&self, fingerprint: &str, model: &str) -> Option<Artifact> {
        let cache = self.cache.as_ref()?;
        match cache.fetch(fingerprint).await {
            Ok(Some(artifact)) => {
                log_info!("Cache hit for {} ({})", model, &fingerprint[..12]);
                Some(artifact)
            }
            Ok(None) => None,
            Err(e) => {
                log_warn!("Cache read failed for {}: {}", &fingerprint[..12], e);
                None
            }
        }
    }

    /// Store a successful result. Write failures are logged, never raised.
    async fn remember(&self, fingerprint: &str, artifact: &Artifact) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.store(fingerprint, artifact.clone()).await
        {
            log_warn!("Cache write failed for {}: {}", &fingerprint[..12], e);
        }
    }

    /// Decide what a response means. The first matching rule wins:
    /// block reason, no candidate, image part, safety finish, text, nothing.
    pub fn interpret(response: &NormalizedResponse, fingerprint: &str) -> Result<Artifact, EditError> {
        if let Some(reason) = &response.block_reason {
            return Err(EditError::BlockedByPolicy(reason.clone()));
        }

        let Some(candidate) = response.candidates.first() else {
            return Err(EditError::EmptyResponse);
        };

        let image = candidate.parts.iter().find_map(|p| match p {
            ResponsePart::Image { mime_type, data } if mime_type.starts_with("image/") => Some((mime_type, data)),
            _ => None,
        });
        if let Some((mime_type, data)) = image {
            let stem: String = fingerprint.chars().take(12).collect();
            let name = format!("result-{}.{}", stem, crate::io::extension_for_mime(mime_type));
            return Ok(Artifact::new(name, mime_type.clone(), data.clone()));
        }

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            let reason = candidate.blocked_category.clone().unwrap_or_else(|| "SAFETY".to_string());
            return Err(EditError::BlockedByPolicy(reason));
        }

        let text = candidate.parts.iter().find_map(|p| match p {
            ResponsePart::Text(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
            _ => None,
        });
        if let Some(text) = text {
            return Err(EditError::UnexpectedTextResponse(text));
        }

        Err(EditError::NoUsableContent)
    }

    pub async fn apply(&self, op: &RemoteOp, base: &Artifact, mask: Option<&Artifact>) -> Result<EditResult, EditError> {
        let request = op.build(base, mask, &self.models.image)?;
        self.invoke(request).await
    }

    /// Text-to-image.
    pub async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> Result<EditResult, EditError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditError::MissingInput(MissingInput::Prompt));
        }
        self.invoke(RemoteRequest::images(&self.models.imagen, prompt, aspect_ratio))
            .await
    }

    // ========================================================================
    // TEXT CALLS (never cached)
    // ========================================================================

    async fn text_call(&self, request: RemoteRequest) -> Result<String, EditError> {
        let response = self.transport.send(&request).await.map_err(|e| {
            log_err!("{} text request to {} failed: {}", self.transport.name(), request.model, e);
            EditError::from(e)
        })?;
        if let Some(reason) = response.block_reason {
            return Err(EditError::BlockedByPolicy(reason));
        }
        response.first_text().ok_or(EditError::NoUsableContent)
    }

    /// Ask a question about an image.
    pub async fn analyze(&self, image: &Artifact, question: &str) -> Result<String, EditError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EditError::MissingInput(MissingInput::Prompt));
        }
        let request = RemoteRequest::new(
            &self.models.text,
            vec![InputPart::Image(image.clone()), InputPart::text(question)],
        )
        .with_config(serde_json::json!({ "thinkingConfig": { "thinkingBudget": 32768 } }));
        self.text_call(request).await
    }

    /// Locate objects. Entries without a complete numeric box are dropped and
    /// an unparseable answer yields no objects.
    pub async fn detect_objects(&self, image: &Artifact, what: Option<&str>) -> Result<Vec<DetectedObject>, EditError> {
        let what = what.map(str::trim).filter(|w| !w.is_empty()).unwrap_or("all main objects");
        let instruction = format!(
            "Detect the following objects in the image: {what}. For each object give a 'label' and a 'box' \
             with normalized coordinates x_min, y_min, x_max, y_max. Return a JSON array of objects."
        );
        let request = RemoteRequest::new(
            &self.models.text,
            vec![InputPart::Image(image.clone()), InputPart::Text(instruction)],
        )
        .with_config(serde_json::json!({ "responseMimeType": "application/json" }));

        let text = match self.text_call(request).await {
            Ok(t) => t,
            Err(EditError::NoUsableContent) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(parse_detections(&text))
    }

    pub async fn detect_faces(&self, image: &Artifact) -> Result<Vec<DetectedObject>, EditError> {
        self.detect_objects(image, Some("every human face")).await
    }

    /// Judge whether a prompt is specific enough. Never fails: any error
    /// counts as specific so the edit can proceed.
    pub async fn validate_prompt(&self, prompt: &str, tool: ToolId) -> PromptCheck {
        let instruction = format!(
            "Analyse this user prompt for an AI tool called \"{}\": \"{}\". Is it specific enough to produce a \
             high quality result? Answer with a JSON object with two keys: \"isSpecific\" (boolean) and \
             \"suggestion\" (a string suggesting how to improve the prompt, or a confirmation if it is fine).",
            tool.label(),
            prompt.trim()
        );
        let request = RemoteRequest::new(&self.models.fast_text, vec![InputPart::Text(instruction)])
            .with_config(serde_json::json!({ "responseMimeType": "application/json" }));

        let parsed = match self.text_call(request).await {
            Ok(text) => serde_json::from_str::<PromptCheck>(strip_code_fence(&text)).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        parsed.unwrap_or_else(|e| {
            log_warn!("Prompt validation unavailable: {}", e);
            PromptCheck {
                is_specific: true,
                suggestion: t!("notice.validation_failed"),
            }
        })
    }

    /// Route a free-text request to one tool. `None` when the model finds
    /// no fitting tool or answers with something unusable.
    pub async fn suggest_tool(&self, request: &str) -> Result<Option<ToolSuggestion>, EditError> {
        let request = request.trim();
        if request.is_empty() {
            return Err(EditError::MissingInput(MissingInput::Prompt));
        }
        let catalogue: String = SUGGESTIBLE
            .iter()
            .map(|(tool, what, args)| {
                if args.is_empty() {
                    format!("- {}: {what}.\n", tool.id())
                } else {
                    format!("- {}: {what}. Arguments: {args}.\n", tool.id())
                }
            })
            .collect();
        let instruction = format!(
            "You route requests in an image editor to a single tool. Tools:\n{catalogue}\n\
             Pick the tool that best fulfils the request below and answer with a JSON object \
             {{\"tool\": \"<tool id>\", \"args\": {{...}}}}. Answer {{\"tool\": null}} when no tool fits.\n\n\
             Request: \"{request}\""
        );
        let request = RemoteRequest::new(&self.models.fast_text, vec![InputPart::Text(instruction)])
            .with_config(serde_json::json!({ "responseMimeType": "application/json" }));

        match self.text_call(request).await {
            Ok(text) => Ok(parse_suggestion(&text)),
            Err(EditError::NoUsableContent) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // VIDEO
    // ========================================================================

    pub async fn generate_video(
        &self,
        image: Option<&Artifact>,
        prompt: &str,
        aspect_ratio: &str,
        policy: &PollPolicy,
        cancel: &CancelToken,
        on_progress: impl FnMut(&PollState) + Send,
    ) -> Result<EditResult, EditError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditError::MissingInput(MissingInput::Prompt));
        }
        let mut request = VideoRequest::new(&self.models.video, prompt);
        request.image = image.cloned();
        request.aspect_ratio = aspect_ratio.to_string();
        let fingerprint = request.fingerprint();

        if let Some(artifact) = self.cached(&fingerprint, &request.model).await {
            return Ok(EditResult {
                artifact,
                source: ResultSource::Cache,
                fingerprint,
            });
        }

        let artifact = run_video_job(self.transport.as_ref(), &request, policy, cancel, on_progress).await?;
        self.remember(&fingerprint, &artifact).await;
        Ok(EditResult {
            artifact,
            source: ResultSource::Remote,
            fingerprint,
        })
    }
}

/// Models in JSON mode still sometimes wrap the answer in a markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_suggestion(text: &str) -> Option<ToolSuggestion> {
    let value: Value = match serde_json::from_str(strip_code_fence(text)) {
        Ok(v) => v,
        Err(e) => {
            log_warn!("Could not parse tool suggestion: {}", e);
            return None;
        }
    };
    let name = value.get("tool")?.as_str()?;
    let Some(tool) = SUGGESTIBLE
        .iter()
        .map(|(tool, _, _)| *tool)
        .find(|t| name.parse::<ToolId>().is_ok_and(|parsed| parsed == *t))
    else {
        log_warn!("Suggested tool '{}' is not routable", name);
        return None;
    };
    let mut args: ToolParams = value
        .get("args")
        .and_then(Value::as_object)
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    if let Some(style) = args.remove("stylePrompt") {
        args.entry("prompt".to_string()).or_insert(style);
    }
    Some(ToolSuggestion { tool, args })
}

fn parse_detections(text: &str) -> Vec<DetectedObject> {
    let value: Value = match serde_json::from_str(strip_code_fence(text)) {
        Ok(v) => v,
        Err(e) => {
            log_warn!("Could not parse detection response: {}", e);
            return Vec::new();
        }
    };
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| {
            let bbox = item.get("box")?;
            let coord = |k: &str| bbox.get(k).and_then(Value::as_f64);
            let bbox = BoundingBox {
                x_min: coord("x_min")? as f32,
                y_min: coord("y_min")? as f32,
                x_max: coord("x_max")? as f32,
                y_max: coord("y_max")? as f32,
            };
            let label = item.get("label").and_then(Value::as_str).unwrap_or_default().to_string();
            Some(DetectedObject { label, bbox })
        })
        .collect()
}
