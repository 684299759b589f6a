//! Session stage events delivered to the target context.

use serde::{Deserialize, Serialize};
use sotto_types::SessionId;

use crate::error::WireError;

/// The stage a session has reached.
///
/// Stages advance strictly forward within one session:
///
/// ```text
/// loading ──► active ──► processing ──► done
///    │           │            │
///    └───────────┴────────────┴───────► error
/// ```
///
/// A superseded session stops emitting events instead of reaching a
/// terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Preparation accepted, capture resource being readied.
    Loading,
    /// Capture is running.
    Active,
    /// Captured payload handed to the worker.
    Processing,
    /// Worker result delivered; carries the result text.
    Done,
    /// The session failed; carries the serialized error.
    Error,
}

impl Stage {
    /// Returns `true` for [`Stage::Done`] and [`Stage::Error`].
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Active => "active",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Payload of the `onSessionEvent` notification.
///
/// Sent by the orchestrator to the target context at each stage
/// change, keyed by session so the peer can track overlapping runs.
///
/// # Example
///
/// ```
/// use sotto_types::SessionId;
/// use sotto_wire::{SessionEvent, Stage};
///
/// let id = SessionId::new();
/// let done = SessionEvent::done(id, "hello world");
/// assert_eq!(done.stage, Stage::Done);
/// assert_eq!(done.text.as_deref(), Some("hello world"));
/// assert!(done.stage.is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// The session this event belongs to.
    pub session_id: SessionId,
    /// The stage reached.
    #[serde(rename = "type")]
    pub stage: Stage,
    /// Result text, present on [`Stage::Done`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Serialized failure, present on [`Stage::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl SessionEvent {
    /// Creates a bare stage event with no text or error.
    #[must_use]
    pub fn stage(session_id: SessionId, stage: Stage) -> Self {
        Self {
            session_id,
            stage,
            text: None,
            error: None,
        }
    }

    /// Creates the terminal success event carrying the result text.
    #[must_use]
    pub fn done(session_id: SessionId, text: impl Into<String>) -> Self {
        Self {
            session_id,
            stage: Stage::Done,
            text: Some(text.into()),
            error: None,
        }
    }

    /// Creates the terminal failure event carrying the serialized error.
    #[must_use]
    pub fn error(session_id: SessionId, error: WireError) -> Self {
        Self {
            session_id,
            stage: Stage::Error,
            text: None,
            error: Some(error),
        }
    }
}
