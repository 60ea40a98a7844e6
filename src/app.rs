// ============================================================================
// EDITOR ORCHESTRATOR — validate, invoke, then commit or fail
// ============================================================================
//
// Every tool runs the same sequence:
//
//   Idle → Validating → Invoking → Committing | Preview | Failed → Idle
//
// Validating captures the current entry id, artifact and mask under the
// project lock. Invoking runs without the lock. Committing takes the lock
// again and only appends if the current entry is still the captured one, so
// two tools that resolve out of order cannot overwrite each other. A tool
// cannot be started twice while it is still running.
// ============================================================================

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};

use image::GrayImage;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::ai::{
    CancelToken, DetectedObject, EditError, MissingInput, PollPolicy, PollState, PromptCheck, RemoteEditService,
    RemoteOp, ResultSource, ToolSuggestion, TransportErrorKind,
};
use crate::artifact::{Artifact, ArtifactError};
use crate::components::history::{HistoryError, HistoryListing};
use crate::components::tools::{ToolId, ToolParams};
use crate::ops::{self, CompositeError, FontResolver, LocalOp};
use crate::params;
use crate::project::{Preview, Project};
use crate::settings::EditorSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A message for the user, already localized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// How a remote tool finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Committed { entry: Uuid, source: ResultSource },
    /// Held as a preview until accepted or discarded.
    Previewing { source: ResultSource },
}

impl Outcome {
    pub fn source(&self) -> ResultSource {
        match self {
            Outcome::Committed { source, .. } | Outcome::Previewing { source } => *source,
        }
    }
}

/// What a tool reads from the project before it runs.
struct Inputs {
    base_id: Uuid,
    base: Artifact,
    mask: Option<GrayImage>,
}

/// Keeps `tool` in the running set until dropped, on every exit path.
struct InFlight<'a> {
    running: &'a StdMutex<HashSet<ToolId>>,
    tool: ToolId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.running).remove(&self.tool);
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn history_error(e: HistoryError) -> EditError {
    match e {
        HistoryError::Empty => EditError::MissingInput(MissingInput::Image),
        HistoryError::Conflict { .. } => EditError::Conflict,
    }
}

fn artifact_error(e: ArtifactError) -> EditError {
    EditError::Compositing(CompositeError::Artifact(e))
}

pub struct EditorApp {
    project: Mutex<Project>,
    service: Option<RemoteEditService>,
    fonts: Arc<FontResolver>,
    poll_policy: PollPolicy,
    running: StdMutex<HashSet<ToolId>>,
    notices: StdMutex<Vec<Notice>>,
}

impl EditorApp {
    /// `service` is `None` when no remote backend is configured; local tools
    /// still work.
    pub fn new(service: Option<RemoteEditService>, fonts: FontResolver, max_history: usize) -> Self {
        Self {
            project: Mutex::new(Project::new_untitled(1, max_history)),
            service,
            fonts: Arc::new(fonts),
            poll_policy: PollPolicy::default(),
            running: StdMutex::new(HashSet::new()),
            notices: StdMutex::new(Vec::new()),
        }
    }

    pub fn from_settings(settings: &EditorSettings, use_cache: bool) -> Self {
        let service = match RemoteEditService::from_settings(settings, use_cache) {
            Ok(service) => Some(service),
            Err(e) => {
                log_warn!("Remote tools unavailable: {}", e);
                None
            }
        };
        Self::new(service, FontResolver::new(settings.font_dirs.clone()), settings.max_history)
            .with_poll_policy(PollPolicy::from_settings(settings))
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn service(&self) -> Option<&RemoteEditService> {
        self.service.as_ref()
    }

    fn remote(&self) -> Result<&RemoteEditService, EditError> {
        self.service
            .as_ref()
            .ok_or_else(|| EditError::transport(TransportErrorKind::Auth, "no remote service configured"))
    }

    // ========================================================================
    // PROJECT ACCESS
    // ========================================================================

    /// Start a new editing session on `artifact`.
    pub async fn load_image(&self, artifact: Artifact) -> Result<Uuid, EditError> {
        let name = artifact.name().to_string();
        let id = self.project.lock().await.load(artifact).map_err(artifact_error)?;
        log_info!("Loaded {}", name);
        Ok(id)
    }

    /// Run `f` with exclusive access to the project.
    pub async fn with_project<R>(&self, f: impl FnOnce(&mut Project) -> R) -> R {
        f(&mut *self.project.lock().await)
    }

    pub async fn current_artifact(&self) -> Option<Artifact> {
        self.project.lock().await.history.current_artifact().cloned()
    }

    pub async fn history(&self) -> Vec<HistoryListing> {
        self.project.lock().await.history.tool_history()
    }

    pub async fn undo(&self) -> Option<String> {
        let mut project = self.project.lock().await;
        let undone = project.history.undo();
        project.sync_mask_size();
        undone
    }

    pub async fn redo(&self) -> Option<String> {
        let mut project = self.project.lock().await;
        let redone = project.history.redo();
        project.sync_mask_size();
        redone
    }

    pub async fn jump_to(&self, index: usize) -> bool {
        let mut project = self.project.lock().await;
        let moved = project.history.jump_to(index);
        project.sync_mask_size();
        moved
    }

    pub async fn set_active_tool(&self, tool: Option<ToolId>) {
        self.project.lock().await.set_active_tool(tool);
    }

    pub async fn preview(&self) -> Option<Preview> {
        self.project.lock().await.preview.clone()
    }

    pub fn is_running(&self, tool: ToolId) -> bool {
        lock(&self.running).contains(&tool)
    }

    /// Drain pending notices, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *lock(&self.notices))
    }

    fn notify(&self, level: NoticeLevel, message: String) {
        lock(&self.notices).push(Notice { level, message });
    }

    fn notify_source(&self, source: ResultSource) {
        if source == ResultSource::Cache {
            self.notify(NoticeLevel::Info, t!("notice.cache_hit"));
        }
    }

    /// Log a failure in full and raise its user-facing message.
    fn report<T>(&self, what: impl fmt::Display, result: Result<T, EditError>) -> Result<T, EditError> {
        if let Err(e) = &result {
            log_err!("{} failed: {}", what, e);
            self.notify(NoticeLevel::Error, e.user_message());
        }
        result
    }

    // ========================================================================
    // WORKFLOW STEPS
    // ========================================================================

    fn begin(&self, tool: ToolId) -> Result<InFlight<'_>, EditError> {
        if !lock(&self.running).insert(tool) {
            return Err(EditError::Busy(tool));
        }
        Ok(InFlight {
            running: &self.running,
            tool,
        })
    }

    async fn capture(&self, wants_mask: bool, requires_mask: bool) -> Result<Inputs, EditError> {
        let project = self.project.lock().await;
        let entry = project
            .history
            .current()
            .ok_or(EditError::MissingInput(MissingInput::Image))?;
        let mask = if wants_mask { project.mask.to_mask() } else { None };
        if requires_mask && mask.is_none() {
            return Err(EditError::MissingInput(MissingInput::Mask));
        }
        Ok(Inputs {
            base_id: entry.id(),
            base: entry.artifact().clone(),
            mask,
        })
    }

    async fn commit(
        &self,
        base: Uuid,
        artifact: Artifact,
        tool: ToolId,
        params: ToolParams,
        consumed_mask: bool,
    ) -> Result<Uuid, EditError> {
        let mut project = self.project.lock().await;
        let entry = project
            .history
            .commit_if_current(base, artifact, tool, params)
            .map_err(history_error)?;
        project.after_commit(consumed_mask);
        drop(project);

        log_info!("Committed {}", tool);
        self.notify(NoticeLevel::Success, t!("notice.applied", tool = tool.label()));
        Ok(entry)
    }

    // ========================================================================
    // TOOLS
    // ========================================================================

    /// Run a remote edit on the current artifact. Two-phase tools stop at
    /// the preview.
    pub async fn run_remote(&self, op: RemoteOp) -> Result<Outcome, EditError> {
        let tool = op.tool();
        let result = async {
            let _running = self.begin(tool)?;
            op.validate()?;
            let service = self.remote()?;
            let inputs = self.capture(op.uses_mask(), op.requires_mask()).await?;
            let mask = inputs
                .mask
                .as_ref()
                .map(|m| Artifact::from_gray("mask.png", m))
                .transpose()
                .map_err(artifact_error)?;

            let result = service.apply(&op, &inputs.base, mask.as_ref()).await?;
            self.notify_source(result.source);
            let used_mask = mask.is_some();

            if tool.is_two_phase() {
                self.project.lock().await.preview = Some(Preview {
                    tool,
                    params: op.params(),
                    result: result.artifact,
                    base: inputs.base_id,
                    original: inputs.base,
                    source: result.source,
                    used_mask,
                });
                log_info!("{} preview ready", tool);
                return Ok(Outcome::Previewing { source: result.source });
            }

            let entry = self
                .commit(inputs.base_id, result.artifact, tool, op.params(), used_mask)
                .await?;
            Ok(Outcome::Committed {
                entry,
                source: result.source,
            })
        }
        .await;
        self.report(tool, result)
    }

    /// Run a local edit. Filters are scoped by the mask when one is painted.
    pub async fn run_local(&self, op: LocalOp) -> Result<Uuid, EditError> {
        let key = op.tool(false);
        let result = async {
            let _running = self.begin(key)?;
            if let LocalOp::Text(overlay) = &op
                && overlay.content.trim().is_empty()
            {
                return Err(EditError::InvalidParameter("text overlay is empty".to_string()));
            }
            let inputs = self.capture(op.uses_mask(), false).await?;
            let consumed_mask = inputs.mask.is_some();
            let tool = op.tool(consumed_mask);

            let fonts = Arc::clone(&self.fonts);
            let job = op.clone();
            let base = inputs.base;
            let mask = inputs.mask;
            let artifact = tokio::task::spawn_blocking(move || ops::apply_local(&job, &base, mask.as_ref(), &fonts))
                .await
                .unwrap_or_else(|e| std::panic::resume_unwind(e.into_panic()))?;

            self.commit(inputs.base_id, artifact, tool, op.params(), consumed_mask)
                .await
        }
        .await;
        self.report(key, result)
    }

    /// Upscale, then sharpen the upscaled image, as one history entry.
    pub async fn super_resolution(&self, factor: u32, intensity: u32) -> Result<Uuid, EditError> {
        let tool = ToolId::SuperResolution;
        let result = async {
            let _running = self.begin(tool)?;
            let upscale = RemoteOp::Upscale {
                factor,
                preserve_face: true,
            };
            let sharpen = RemoteOp::Unblur {
                sharpen: intensity,
                denoise: 0,
                model: "soft-focus".to_string(),
            };
            upscale.validate()?;
            sharpen.validate()?;
            let service = self.remote()?;
            let inputs = self.capture(false, false).await?;

            let upscaled = service.apply(&upscale, &inputs.base, None).await?;
            self.notify_source(upscaled.source);
            let sharpened = service.apply(&sharpen, &upscaled.artifact, None).await?;
            self.notify_source(sharpened.source);

            let params = params! { "factor" => factor, "intensity" => intensity };
            self.commit(inputs.base_id, sharpened.artifact, tool, params, false)
                .await
        }
        .await;
        self.report(tool, result)
    }

    /// Text-to-image. The generated image starts a new session.
    pub async fn generate_image(&self, prompt: &str, aspect_ratio: &str) -> Result<Uuid, EditError> {
        let tool = ToolId::ImageGen;
        let result = async {
            let _running = self.begin(tool)?;
            let service = self.remote()?;
            let generated = service.generate_image(prompt, aspect_ratio).await?;
            self.notify_source(generated.source);

            let mut project = self.project.lock().await;
            let entry = project.load(generated.artifact).map_err(artifact_error)?;
            project.mark_dirty();
            drop(project);
            self.notify(NoticeLevel::Success, t!("notice.applied", tool = tool.label()));
            Ok(entry)
        }
        .await;
        self.report(tool, result)
    }

    /// Animate the current artifact (or only the prompt when none is loaded).
    /// The clip is returned, not committed.
    pub async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        cancel: &CancelToken,
        on_progress: impl FnMut(&PollState) + Send,
    ) -> Result<Artifact, EditError> {
        let tool = ToolId::Video;
        let result = async {
            let _running = self.begin(tool)?;
            let service = self.remote()?;
            let image = self.current_artifact().await;
            let clip = service
                .generate_video(image.as_ref(), prompt, aspect_ratio, &self.poll_policy, cancel, on_progress)
                .await?;
            self.notify_source(clip.source);
            Ok(clip.artifact)
        }
        .await;
        self.report(tool, result)
    }

    // ========================================================================
    // PREVIEW
    // ========================================================================

    /// Commit the held preview. `blend` (0-100) mixes it over the original
    /// first; `None` or 100 takes the result as is.
    pub async fn accept_preview(&self, blend: Option<f32>) -> Result<Uuid, EditError> {
        let result = async {
            let mut project = self.project.lock().await;
            let preview = project.preview.take().ok_or(EditError::NoPreview)?;
            let tool = preview.tool;
            let mut params = preview.params;

            let artifact = match blend.filter(|b| *b < 100.0) {
                Some(b) => {
                    let b = b.max(0.0);
                    params.insert("blend".to_string(), serde_json::json!(b));
                    blend_preview(&preview.original, &preview.result, b / 100.0)?
                }
                None => preview.result,
            };

            let entry = project
                .history
                .commit_if_current(preview.base, artifact, tool, params)
                .map_err(history_error)?;
            project.after_commit(preview.used_mask);
            drop(project);

            log_info!("Accepted {} preview", tool);
            self.notify(NoticeLevel::Success, t!("notice.applied", tool = tool.label()));
            Ok(entry)
        }
        .await;
        self.report("preview", result)
    }

    /// Drop the held preview. Returns whether there was one.
    pub async fn discard_preview(&self) -> bool {
        let discarded = self.project.lock().await.preview.take();
        if let Some(preview) = &discarded {
            log_info!("Discarded {} preview", preview.tool);
        }
        discarded.is_some()
    }

    // ========================================================================
    // ASSISTANTS
    // ========================================================================

    pub async fn analyze(&self, question: &str) -> Result<String, EditError> {
        let result = async {
            let service = self.remote()?;
            let image = self
                .current_artifact()
                .await
                .ok_or(EditError::MissingInput(MissingInput::Image))?;
            service.analyze(&image, question).await
        }
        .await;
        self.report("analyze", result)
    }

    pub async fn detect_objects(&self, what: Option<&str>) -> Result<Vec<DetectedObject>, EditError> {
        let result = async {
            let service = self.remote()?;
            let image = self
                .current_artifact()
                .await
                .ok_or(EditError::MissingInput(MissingInput::Image))?;
            service.detect_objects(&image, what).await
        }
        .await;
        self.report("detect", result)
    }

    pub async fn detect_faces(&self) -> Result<Vec<DetectedObject>, EditError> {
        let result = async {
            let service = self.remote()?;
            let image = self
                .current_artifact()
                .await
                .ok_or(EditError::MissingInput(MissingInput::Image))?;
            service.detect_faces(&image).await
        }
        .await;
        self.report("detect", result)
    }

    /// Route a free-text request to a tool. A suggestion that works on the
    /// current image fails when none is loaded.
    pub async fn suggest_tool(&self, request: &str) -> Result<Option<ToolSuggestion>, EditError> {
        let result = async {
            let suggestion = self.remote()?.suggest_tool(request).await?;
            if let Some(found) = &suggestion
                && found.tool.requires_base_image()
                && self.current_artifact().await.is_none()
            {
                return Err(EditError::MissingInput(MissingInput::Image));
            }
            Ok(suggestion)
        }
        .await;
        self.report("suggest", result)
    }

    /// Replace the mask with a detected object's box.
    pub async fn select_object(&self, object: &DetectedObject) -> Result<(), EditError> {
        let mut project = self.project.lock().await;
        let (w, h) = project
            .history
            .current_artifact()
            .ok_or(EditError::MissingInput(MissingInput::Image))?
            .dimensions()
            .map_err(artifact_error)?;
        project.mask.set_from_bounding_box(&object.bbox, w, h);
        Ok(())
    }

    pub async fn validate_prompt(&self, prompt: &str, tool: ToolId) -> PromptCheck {
        match &self.service {
            Some(service) => service.validate_prompt(prompt, tool).await,
            None => PromptCheck {
                is_specific: true,
                suggestion: t!("notice.validation_failed"),
            },
        }
    }
}

fn blend_preview(original: &Artifact, result: &Artifact, amount: f32) -> Result<Artifact, CompositeError> {
    let mixed = ops::canvas_ops::mix(&original.decode_rgba()?, &result.decode_rgba()?, amount);
    Ok(Artifact::from_rgba(result.name(), &mixed)?)
}
