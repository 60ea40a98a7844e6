// ============================================================================
// AI MODULE — remote edits through a generative image endpoint
// ============================================================================
//
//   api.rs       — wire types for the endpoint's JSON bodies
//   transport.rs — direct and proxy transports, normalized responses
//   errors.rs    — failure taxonomy and user-facing messages
//   prompts.rs   — per-tool request builders
//   service.rs   — cache-first invocation and response interpretation
//   video.rs     — long-running video jobs as a polling state machine
// ============================================================================

pub mod api;
pub mod errors;
pub mod prompts;
pub mod service;
pub mod transport;
pub mod video;

pub use errors::{EditError, MissingInput, TransportErrorKind};
pub use prompts::{EditMode, RemoteOp, TryOnLook};
pub use service::{
    DetectedObject, EditResult, ModelSet, PromptCheck, RemoteEditService, ResultSource, ToolSuggestion,
};
pub use transport::{InputPart, NormalizedResponse, RemoteRequest, Transport, TransportError};
pub use video::{CancelToken, PollPolicy, PollState};
