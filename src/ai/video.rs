// ============================================================================
// VIDEO JOBS — long-running generation driven by a bounded polling machine
// ============================================================================
//
//   Pending ──start──▶ Polling{attempt, interval} ──poll──▶ Polling{attempt+1, interval*backoff}
//                            │                                  │
//                            ├─ done + uri ─▶ Done(uri)          ├─ attempts exhausted ─▶ TimedOut
//                            ├─ error ──────▶ Failed(message)    └─ cancel ─────────────▶ Cancelled
//
// The transitions are pure (`PollState::observe`); `run_video_job` only adds
// the sleeping, the transport calls and cancellation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::api;
use super::errors::{EditError, TransportErrorKind};
use super::transport::Transport;
use crate::artifact::Artifact;
use crate::cache::sha256_hex;
use crate::settings::EditorSettings;

#[derive(Clone, Debug)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    /// Optional first frame.
    pub image: Option<Artifact>,
    pub aspect_ratio: String,
    pub resolution: String,
}

impl VideoRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            image: None,
            aspect_ratio: "16:9".to_string(),
            resolution: "720p".to_string(),
        }
    }

    /// Cache key: `model:<first frame hash>:{"prompt","aspectRatio"}`. A job
    /// without a first frame contributes an empty hash.
    pub fn fingerprint(&self) -> String {
        let frame = self
            .image
            .as_ref()
            .filter(|a| !a.is_empty())
            .map(|a| sha256_hex(a.to_base64()))
            .unwrap_or_default();
        let config = serde_json::json!({ "prompt": self.prompt, "aspectRatio": self.aspect_ratio });
        sha256_hex(format!("{}:{}:{}", self.model, frame, config))
    }
}

/// Server-side operation handle, reduced to what the state machine reads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoOperation {
    pub name: String,
    pub done: bool,
    pub uri: Option<String>,
    pub error: Option<String>,
}

impl From<api::Operation> for VideoOperation {
    fn from(op: api::Operation) -> Self {
        let uri = op.video_uri();
        let error = op.error.map(|e| match (e.code, e.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg,
            (Some(code), None) => format!("operation failed with code {code}"),
            (None, None) => "operation failed".to_string(),
        });
        Self {
            name: op.name,
            done: op.done,
            uri,
            error,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Multiplier applied after every poll.
    pub backoff: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            backoff: 1.5,
            max_interval: Duration::from_secs(60),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.video_poll_interval_secs.max(1)),
            max_attempts: settings.video_max_polls.max(1),
            ..Self::default()
        }
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff.max(1.0)).min(self.max_interval.max(self.interval))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PollState {
    Pending,
    Polling { attempt: u32, interval: Duration },
    Done { uri: String },
    Failed { message: String },
    Cancelled,
    TimedOut { attempts: u32 },
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending | PollState::Polling { .. })
    }

    /// How long to wait before the next poll, if another poll is due.
    pub fn wait(&self) -> Option<Duration> {
        match self {
            PollState::Polling { interval, .. } => Some(*interval),
            _ => None,
        }
    }

    /// Transition on a fresh view of the operation.
    pub fn observe(self, op: &VideoOperation, policy: &PollPolicy) -> PollState {
        if self.is_terminal() {
            return self;
        }
        if let Some(message) = &op.error {
            return PollState::Failed {
                message: message.clone(),
            };
        }
        if op.done {
            return match &op.uri {
                Some(uri) => PollState::Done { uri: uri.clone() },
                None => PollState::Failed {
                    message: "video generation finished without a video".to_string(),
                },
            };
        }
        match self {
            PollState::Pending => PollState::Polling {
                attempt: 1,
                interval: policy.interval,
            },
            PollState::Polling { attempt, .. } if attempt >= policy.max_attempts => {
                PollState::TimedOut { attempts: attempt }
            }
            PollState::Polling { attempt, interval } => PollState::Polling {
                attempt: attempt + 1,
                interval: policy.next_interval(interval),
            },
            terminal => terminal,
        }
    }

    pub fn cancel(self) -> PollState {
        if self.is_terminal() { self } else { PollState::Cancelled }
    }
}

/// Shared cancellation flag. Cloning yields another handle to the same flag.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called on any handle.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only errors if it were dropped
        let _ = rx.wait_for(|c| *c).await;
    }
}

/// Start a video job and poll it to completion, then download the result.
///
/// `on_progress` sees every state the job passes through.
pub async fn run_video_job(
    transport: &dyn Transport,
    request: &VideoRequest,
    policy: &PollPolicy,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(&PollState) + Send,
) -> Result<Artifact, EditError> {
    let mut state = PollState::Pending;
    on_progress(&state);

    let mut operation = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(EditError::Cancelled),
        op = transport.start_video(request) => op?,
    };
    log_info!("Video operation started: {}", operation.name);
    state = state.observe(&operation, policy);
    on_progress(&state);

    while let Some(interval) = state.wait() {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            op = async {
                tokio::time::sleep(interval).await;
                transport.poll_video(&operation).await
            } => Some(op),
        };
        match polled {
            Some(op) => {
                operation = op?;
                state = state.observe(&operation, policy);
            }
            None => state = state.cancel(),
        }
        on_progress(&state);
    }

    match state {
        PollState::Done { uri } => {
            log_info!("Video operation {} finished", operation.name);
            Ok(transport.download(&uri).await?)
        }
        PollState::Failed { message } => {
            log_err!("Video operation {} failed: {}", operation.name, message);
            Err(EditError::from_message(&message))
        }
        PollState::TimedOut { attempts } => {
            log_warn!("Video operation {} still running after {} polls", operation.name, attempts);
            Err(EditError::transport(
                TransportErrorKind::Timeout,
                format!("video generation timed out after {attempts} polls"),
            ))
        }
        PollState::Cancelled => {
            log_info!("Video operation {} cancelled", operation.name);
            Err(EditError::Cancelled)
        }
        PollState::Pending | PollState::Polling { .. } => Err(EditError::NoUsableContent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transport::{NormalizedResponse, RemoteRequest, TransportError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pending(name: &str) -> VideoOperation {
        VideoOperation {
            name: name.into(),
            ..Default::default()
        }
    }

    fn done(uri: &str) -> VideoOperation {
        VideoOperation {
            name: "op".into(),
            done: true,
            uri: Some(uri.into()),
            error: None,
        }
    }

    #[test]
    fn interval_backs_off_to_ceiling() {
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            backoff: 2.0,
            max_interval: Duration::from_secs(30),
            max_attempts: 10,
        };
        let mut state = PollState::Pending.observe(&pending("op"), &policy);
        let mut seen = vec![];
        while let Some(i) = state.wait() {
            seen.push(i.as_secs());
            if seen.len() == 4 {
                break;
            }
            state = state.observe(&pending("op"), &policy);
        }
        assert_eq!(seen, vec![10, 20, 30, 30]);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let policy = PollPolicy {
            max_attempts: 3,
            ..PollPolicy::default()
        };
        let mut state = PollState::Pending;
        for _ in 0..10 {
            state = state.observe(&pending("op"), &policy);
        }
        assert_eq!(state, PollState::TimedOut { attempts: 3 });
    }

    #[test]
    fn terminal_states_are_sticky() {
        let policy = PollPolicy::default();
        let done_state = PollState::Pending.observe(&done("https://v"), &policy);
        assert_eq!(done_state, PollState::Done { uri: "https://v".into() });
        assert_eq!(done_state.clone().cancel(), done_state);
        assert_eq!(done_state.clone().observe(&pending("op"), &policy), done_state);

        let failed = PollState::Pending.observe(
            &VideoOperation {
                error: Some("boom".into()),
                ..pending("op")
            },
            &policy,
        );
        assert!(matches!(failed, PollState::Failed { .. }));

        let no_uri = PollState::Pending.observe(
            &VideoOperation {
                done: true,
                ..pending("op")
            },
            &policy,
        );
        assert!(matches!(no_uri, PollState::Failed { .. }));
    }

    #[test]
    fn fingerprint_covers_frame_prompt_and_shape() {
        let bare = VideoRequest::new("veo", "a wave");
        let expected = sha256_hex(r#"veo::{"aspectRatio":"16:9","prompt":"a wave"}"#);
        assert_eq!(bare.fingerprint(), expected);

        let mut framed = bare.clone();
        framed.image = Some(Artifact::new("f.png", "image/png", vec![1u8, 2, 3]));
        let mut tall = bare.clone();
        tall.aspect_ratio = "9:16".into();
        assert_ne!(framed.fingerprint(), bare.fingerprint());
        assert_ne!(tall.fingerprint(), bare.fingerprint());
        assert_eq!(framed.fingerprint(), framed.clone().fingerprint());
    }

    #[test]
    fn operation_conversion_keeps_error_text() {
        let op: api::Operation = serde_json::from_str(
            r#"{"name":"operations/9","done":true,"error":{"code":3,"message":"INVALID_ARGUMENT: prompt"}}"#,
        )
        .unwrap();
        let v = VideoOperation::from(op);
        assert_eq!(v.error.as_deref(), Some("3: INVALID_ARGUMENT: prompt"));
    }

    /// Reports "running" for `polls_before_done` polls, then done.
    struct ScriptedVideo {
        polls_before_done: u32,
        polls: AtomicU32,
        downloads: Mutex<Vec<String>>,
    }

    impl ScriptedVideo {
        fn new(polls_before_done: u32) -> Self {
            Self {
                polls_before_done,
                polls: AtomicU32::new(0),
                downloads: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedVideo {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn send(&self, _request: &RemoteRequest) -> Result<NormalizedResponse, TransportError> {
            Err(TransportError::Unsupported("send"))
        }

        async fn start_video(&self, _request: &VideoRequest) -> Result<VideoOperation, TransportError> {
            Ok(pending("operations/1"))
        }

        async fn poll_video(&self, op: &VideoOperation) -> Result<VideoOperation, TransportError> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n > self.polls_before_done {
                Ok(VideoOperation {
                    name: op.name.clone(),
                    done: true,
                    uri: Some("https://videos/1".into()),
                    error: None,
                })
            } else {
                Ok(op.clone())
            }
        }

        async fn download(&self, uri: &str) -> Result<Artifact, TransportError> {
            self.downloads.lock().unwrap().push(uri.to_string());
            Ok(Artifact::new("v.mp4", "video/mp4", vec![0u8; 4]))
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(10),
            backoff: 1.0,
            max_interval: Duration::from_secs(10),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn job_polls_until_done_then_downloads() {
        let transport = ScriptedVideo::new(2);
        let mut states = vec![];
        let out = run_video_job(
            &transport,
            &VideoRequest::new("veo", "a wave"),
            &fast_policy(10),
            &CancelToken::new(),
            |s| states.push(s.clone()),
        )
        .await
        .unwrap();
        assert_eq!(out.mime_type(), "video/mp4");
        assert_eq!(transport.polls.load(Ordering::SeqCst), 3);
        assert_eq!(*transport.downloads.lock().unwrap(), vec!["https://videos/1".to_string()]);
        assert_eq!(states.first(), Some(&PollState::Pending));
        assert_eq!(states.last(), Some(&PollState::Done { uri: "https://videos/1".into() }));
    }

    #[tokio::test(start_paused = true)]
    async fn job_times_out_when_never_done() {
        let transport = ScriptedVideo::new(u32::MAX);
        let err = run_video_job(
            &transport,
            &VideoRequest::new("veo", "a wave"),
            &fast_policy(3),
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EditError::Transport { kind: TransportErrorKind::Timeout, .. }));
        assert!(transport.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_between_polls() {
        let transport = Arc::new(ScriptedVideo::new(u32::MAX));
        let token = CancelToken::new();
        let job = {
            let transport = transport.clone();
            let token = token.clone();
            tokio::spawn(async move {
                run_video_job(
                    transport.as_ref(),
                    &VideoRequest::new("veo", "a wave"),
                    &fast_policy(100),
                    &token,
                    |_| {},
                )
                .await
            })
        };
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        assert!(token.is_cancelled());
        let err = job.await.unwrap().unwrap_err();
        assert!(matches!(err, EditError::Cancelled));
        assert!(transport.polls.load(Ordering::SeqCst) <= 3);
        assert!(transport.downloads.lock().unwrap().is_empty());
    }
}
