// ============================================================================
// EDIT ERRORS — failure taxonomy and user-facing messages
// ============================================================================

use std::fmt;

use thiserror::Error;

use super::transport::TransportError;
use crate::components::tools::ToolId;
use crate::ops::CompositeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingInput {
    /// No current artifact to edit.
    Image,
    Mask,
    Prompt,
    /// Second image (face source, texture).
    SourceImage,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingInput::Image => "image",
            MissingInput::Mask => "mask",
            MissingInput::Prompt => "prompt",
            MissingInput::SourceImage => "source image",
        })
    }
}

/// What a transport failure means for the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Auth,
    Billing,
    Quota,
    Safety,
    ModelNotFound,
    EntityNotFound,
    Timeout,
    InvalidArgument,
    Server,
    Network,
    Unknown,
}

impl TransportErrorKind {
    fn message_key(self) -> Option<&'static str> {
        Some(match self {
            TransportErrorKind::Auth => "error.auth",
            TransportErrorKind::Billing => "error.billing",
            TransportErrorKind::Quota => "error.quota",
            TransportErrorKind::Safety => "error.safety",
            TransportErrorKind::ModelNotFound => "error.model_not_found",
            TransportErrorKind::EntityNotFound => "error.entity_not_found",
            TransportErrorKind::Timeout => "error.timeout",
            TransportErrorKind::InvalidArgument => "error.invalid_argument",
            TransportErrorKind::Server => "error.server",
            TransportErrorKind::Network => "error.network",
            TransportErrorKind::Unknown => return None,
        })
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("missing required {0}")]
    MissingInput(MissingInput),
    #[error("blocked by safety policy: {0}")]
    BlockedByPolicy(String),
    #[error("the model returned an empty response")]
    EmptyResponse,
    #[error("the model returned no usable content")]
    NoUsableContent,
    #[error("the model answered with text instead of an image: {0}")]
    UnexpectedTextResponse(String),
    #[error("{kind:?} error: {detail}")]
    Transport { kind: TransportErrorKind, detail: String },
    #[error("compositing failed: {0}")]
    Compositing(#[from] CompositeError),
    #[error("{0} is already running")]
    Busy(ToolId),
    #[error("history moved while the operation was running")]
    Conflict,
    #[error("operation cancelled")]
    Cancelled,
    #[error("there is no preview to accept")]
    NoPreview,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl EditError {
    pub fn transport(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        EditError::Transport {
            kind,
            detail: detail.into(),
        }
    }

    /// Classify a raw error message the way the endpoint words its failures.
    pub fn from_message(message: &str) -> Self {
        EditError::transport(classify(message), message)
    }

    /// The single localized line shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            EditError::MissingInput(MissingInput::Image) => t!("error.missing_image"),
            EditError::MissingInput(MissingInput::Mask) => t!("error.missing_mask"),
            EditError::MissingInput(MissingInput::Prompt) => t!("error.missing_prompt"),
            EditError::MissingInput(MissingInput::SourceImage) => t!("error.missing_source"),
            EditError::BlockedByPolicy(reason) => t!("error.blocked", reason = reason),
            EditError::EmptyResponse => t!("error.empty_response"),
            EditError::NoUsableContent => t!("error.no_content"),
            EditError::UnexpectedTextResponse(text) => t!("error.text_response", text = text),
            EditError::Transport { kind, detail } => match kind.message_key() {
                Some(key) => t!(key),
                None => t!("error.unexpected", detail = detail),
            },
            EditError::Compositing(e) => t!("error.compositing", detail = e),
            EditError::Busy(tool) => t!("error.busy", tool = tool.label()),
            EditError::Conflict => t!("error.conflict"),
            EditError::Cancelled => t!("error.cancelled"),
            EditError::NoPreview => t!("error.no_preview"),
            EditError::InvalidParameter(detail) => t!("error.invalid_parameter", detail = detail),
        }
    }
}

/// Map an error message to a kind by the markers the API and SDK put in it.
/// First match wins.
pub fn classify(message: &str) -> TransportErrorKind {
    let m = message.to_lowercase();
    let has = |needle: &str| m.contains(needle);

    if has("api_key_invalid") || has("permission_denied") {
        TransportErrorKind::Auth
    } else if has("billing not enabled") {
        TransportErrorKind::Billing
    } else if has("quota") || has("resource_exhausted") || has("rate limit") {
        TransportErrorKind::Quota
    } else if has("[safety]") || has("blocked") {
        TransportErrorKind::Safety
    } else if has("model_not_found") {
        TransportErrorKind::ModelNotFound
    } else if has("requested entity was not found") {
        TransportErrorKind::EntityNotFound
    } else if has("deadline_exceeded") || has("timed out") {
        TransportErrorKind::Timeout
    } else if has("invalid_argument") {
        TransportErrorKind::InvalidArgument
    } else if has("server error") || has("internal error") || has("500") || has("503") {
        TransportErrorKind::Server
    } else {
        TransportErrorKind::Unknown
    }
}

/// Fallback when the message carries no marker.
fn kind_for_status(status: u16) -> TransportErrorKind {
    match status {
        401 | 403 => TransportErrorKind::Auth,
        404 => TransportErrorKind::EntityNotFound,
        408 | 504 => TransportErrorKind::Timeout,
        400 => TransportErrorKind::InvalidArgument,
        429 => TransportErrorKind::Quota,
        500..=599 => TransportErrorKind::Server,
        _ => TransportErrorKind::Unknown,
    }
}

impl From<TransportError> for EditError {
    fn from(err: TransportError) -> Self {
        let detail = err.to_string();
        let kind = match &err {
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::MissingCredentials => TransportErrorKind::Auth,
            TransportError::Status { status, message } => match classify(message) {
                TransportErrorKind::Unknown => kind_for_status(*status),
                kind => kind,
            },
            TransportError::Network(message) => match classify(message) {
                TransportErrorKind::Unknown => TransportErrorKind::Network,
                kind => kind,
            },
            TransportError::Decode(_) | TransportError::Unsupported(_) => TransportErrorKind::Unknown,
        };
        EditError::Transport { kind, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_follows_marker_order() {
        use TransportErrorKind::*;
        let cases = [
            ("INVALID_ARGUMENT: API key not valid.: API_KEY_INVALID", Auth),
            ("PERMISSION_DENIED: caller lacks access", Auth),
            ("Billing not enabled for this project", Billing),
            ("RESOURCE_EXHAUSTED: Quota exceeded", Quota),
            ("Rate limit reached", Quota),
            ("[SAFETY] content was blocked", Safety),
            ("models/foo MODEL_NOT_FOUND", ModelNotFound),
            ("Requested entity was not found.", EntityNotFound),
            ("DEADLINE_EXCEEDED", Timeout),
            ("The operation timed out", Timeout),
            ("INVALID_ARGUMENT: bad mime", InvalidArgument),
            ("HTTP 503: unavailable", Server),
            ("Internal error encountered.", Server),
            ("something odd", Unknown),
        ];
        for (msg, kind) in cases {
            assert_eq!(classify(msg), kind, "{msg}");
        }
    }

    #[test]
    fn transport_errors_fall_back_to_status() {
        let e = EditError::from(TransportError::Status {
            status: 429,
            message: "slow down".into(),
        });
        assert!(matches!(e, EditError::Transport { kind: TransportErrorKind::Quota, .. }));

        let e = EditError::from(TransportError::Status {
            status: 400,
            message: "RESOURCE_EXHAUSTED".into(),
        });
        assert!(matches!(e, EditError::Transport { kind: TransportErrorKind::Quota, .. }));

        let e = EditError::from(TransportError::Timeout);
        assert!(matches!(e, EditError::Transport { kind: TransportErrorKind::Timeout, .. }));

        let e = EditError::from(TransportError::Network("connection refused".into()));
        assert!(matches!(e, EditError::Transport { kind: TransportErrorKind::Network, .. }));
    }

    #[test]
    fn every_error_has_a_translated_message() {
        crate::i18n::set_language("en");
        let errors = [
            EditError::MissingInput(MissingInput::Image),
            EditError::MissingInput(MissingInput::Mask),
            EditError::MissingInput(MissingInput::Prompt),
            EditError::MissingInput(MissingInput::SourceImage),
            EditError::BlockedByPolicy("SAFETY".into()),
            EditError::EmptyResponse,
            EditError::NoUsableContent,
            EditError::UnexpectedTextResponse("I cannot".into()),
            EditError::transport(TransportErrorKind::Quota, "q"),
            EditError::transport(TransportErrorKind::Network, "n"),
            EditError::Busy(ToolId::Upscale),
            EditError::Conflict,
            EditError::Cancelled,
            EditError::NoPreview,
            EditError::InvalidParameter("factor".into()),
        ];
        for e in errors {
            let msg = e.user_message();
            assert!(!msg.starts_with("error."), "untranslated: {msg}");
            assert!(!msg.contains('{'), "unfilled placeholder: {msg}");
        }
        assert!(EditError::UnexpectedTextResponse("try again".into()).user_message().contains("try again"));
        assert!(EditError::transport(TransportErrorKind::Unknown, "weird").user_message().contains("weird"));
    }
}
