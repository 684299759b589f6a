//! Serializable error representation and envelope decode errors.

use serde::{Deserialize, Serialize};
use sotto_types::ErrorCode;

/// An error in the form that crosses the message boundary.
///
/// Failures inside a session or a handler cannot travel as native
/// error types, so they are flattened to `{name, message, stack}`
/// before being put on the wire. `stack` carries the source chain
/// when one exists.
///
/// # Example
///
/// ```
/// use sotto_wire::WireError;
///
/// let err = WireError::new("NoTargetError", "no valid destination selected");
/// assert_eq!(err.name, "NoTargetError");
/// assert_eq!(format!("{err}"), "NoTargetError: no valid destination selected");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Error class name (an error code or a peer-defined name).
    pub name: String,
    /// Human-readable description.
    pub message: String,
    /// Source chain, one cause per line, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl WireError {
    /// Creates a wire error from a name and message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Flattens a native error into wire form.
    ///
    /// `name` becomes the error class; the error's `Display` output
    /// becomes the message; the `source()` chain, when present, is
    /// joined into `stack`.
    #[must_use]
    pub fn from_error(name: impl Into<String>, err: &dyn std::error::Error) -> Self {
        let mut stack = Vec::new();
        let mut cause = err.source();
        while let Some(c) = cause {
            stack.push(format!("caused by: {c}"));
            cause = c.source();
        }
        Self {
            name: name.into(),
            message: err.to_string(),
            stack: if stack.is_empty() {
                None
            } else {
                Some(stack.join("\n"))
            },
        }
    }
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl std::error::Error for WireError {}

/// Errors produced while decoding an envelope from its wire form.
///
/// # Error Codes
///
/// | Variant | Code | Recoverable |
/// |---------|------|-------------|
/// | `UnknownType` | `WIRE_UNKNOWN_TYPE` | no |
/// | `MissingId` | `WIRE_MISSING_ID` | no |
/// | `MissingMethod` | `WIRE_MISSING_METHOD` | no |
/// | `BadArgs` | `WIRE_BAD_ARGS` | no |
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnvelopeError {
    /// The `type` field is not request, notification, or response.
    #[error("unknown message type '{found}'")]
    UnknownType {
        /// The unrecognized type string.
        found: String,
    },

    /// A request or response arrived without a correlation id.
    #[error("{kind} message is missing its id")]
    MissingId {
        /// Which message type lacked the id.
        kind: &'static str,
    },

    /// A request or notification arrived without a method name.
    #[error("{kind} message is missing its method")]
    MissingMethod {
        /// Which message type lacked the method.
        kind: &'static str,
    },

    /// A known method arrived with arguments it cannot carry.
    #[error("malformed arguments for '{method}': {reason}")]
    BadArgs {
        /// The method whose arguments failed to decode.
        method: String,
        /// Decoder error text.
        reason: String,
    },
}

impl ErrorCode for EnvelopeError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "WIRE_UNKNOWN_TYPE",
            Self::MissingId { .. } => "WIRE_MISSING_ID",
            Self::MissingMethod { .. } => "WIRE_MISSING_METHOD",
            Self::BadArgs { .. } => "WIRE_BAD_ARGS",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
