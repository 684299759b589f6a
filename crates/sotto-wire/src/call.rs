//! The method catalog.
//!
//! Every method that crosses the messaging layer is a [`Call`]
//! variant, so handlers match the catalog exhaustively instead of
//! dispatching on raw strings. Methods that arrive from outside the
//! catalog decode as [`Call::Other`] and flow through the unhandled
//! path rather than failing the decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sotto_types::SessionId;

use crate::error::EnvelopeError;
use crate::event::SessionEvent;

/// Arguments of `prepareToSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareArgs {
    session_id: SessionId,
}

/// Arguments of `runWork`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkArgs {
    payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    transferable_data: Option<Value>,
}

/// A method invocation, request or notification.
///
/// # Catalog
///
/// | Variant | Wire method | Direction | Kind |
/// |---------|-------------|-----------|------|
/// | [`AreYouThere`](Self::AreYouThere) | `areYouThere` | controller → target/worker | request |
/// | [`SessionEvent`](Self::SessionEvent) | `onSessionEvent` | controller → target | notification |
/// | [`PrepareToSession`](Self::PrepareToSession) | `prepareToSession` | controller → target | request |
/// | [`RunWork`](Self::RunWork) | `runWork` | controller → worker | request |
/// | [`Ready`](Self::Ready) | `onReady` | target/worker → controller | notification |
/// | [`Other`](Self::Other) | anything else | any | either |
///
/// # Example
///
/// ```
/// use sotto_wire::Call;
///
/// let call = Call::AreYouThere(None);
/// assert_eq!(call.method(), "areYouThere");
///
/// let stray = Call::from_wire("unknownMethod", None).unwrap();
/// assert!(matches!(stray, Call::Other { .. }));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Liveness probe; answered with `true` by a living endpoint.
    AreYouThere(Option<Value>),
    /// Stage change notification for a session.
    SessionEvent(SessionEvent),
    /// Asks the target to get ready to receive a session's result.
    PrepareToSession {
        /// The session being prepared.
        session_id: SessionId,
    },
    /// Hands a captured payload to the worker.
    RunWork {
        /// The captured payload.
        payload: Value,
        /// Side data the worker may consume without copying.
        transferable_data: Option<Value>,
    },
    /// Announcement from a freshly initialized target or worker.
    Ready,
    /// A method outside the catalog; reported as unhandled downstream.
    Other {
        /// The wire method name.
        method: String,
        /// Raw arguments, if any.
        args: Option<Value>,
    },
}

impl Call {
    /// Returns the wire method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::AreYouThere(_) => "areYouThere",
            Self::SessionEvent(_) => "onSessionEvent",
            Self::PrepareToSession { .. } => "prepareToSession",
            Self::RunWork { .. } => "runWork",
            Self::Ready => "onReady",
            Self::Other { method, .. } => method,
        }
    }

    /// Decodes a call from its wire method name and arguments.
    ///
    /// Unknown method names decode as [`Call::Other`]; malformed
    /// arguments for a known method are a decode error.
    pub fn from_wire(method: &str, args: Option<Value>) -> Result<Self, EnvelopeError> {
        let bad_args = |err: serde_json::Error| EnvelopeError::BadArgs {
            method: method.to_string(),
            reason: err.to_string(),
        };
        Ok(match method {
            "areYouThere" => Self::AreYouThere(args),
            "onSessionEvent" => {
                let event = serde_json::from_value(args.unwrap_or(Value::Null)).map_err(bad_args)?;
                Self::SessionEvent(event)
            }
            "prepareToSession" => {
                let PrepareArgs { session_id } =
                    serde_json::from_value(args.unwrap_or(Value::Null)).map_err(bad_args)?;
                Self::PrepareToSession { session_id }
            }
            "runWork" => {
                let WorkArgs {
                    payload,
                    transferable_data,
                } = serde_json::from_value(args.unwrap_or(Value::Null)).map_err(bad_args)?;
                Self::RunWork {
                    payload,
                    transferable_data,
                }
            }
            "onReady" => Self::Ready,
            other => Self::Other {
                method: other.to_string(),
                args,
            },
        })
    }

    /// Encodes the call as its wire method name and arguments.
    pub fn to_wire(&self) -> Result<(String, Option<Value>), serde_json::Error> {
        Ok(match self {
            Self::AreYouThere(args) => ("areYouThere".to_string(), args.clone()),
            Self::SessionEvent(event) => (
                "onSessionEvent".to_string(),
                Some(serde_json::to_value(event)?),
            ),
            Self::PrepareToSession { session_id } => (
                "prepareToSession".to_string(),
                Some(serde_json::to_value(PrepareArgs {
                    session_id: *session_id,
                })?),
            ),
            Self::RunWork {
                payload,
                transferable_data,
            } => (
                "runWork".to_string(),
                Some(serde_json::to_value(WorkArgs {
                    payload: payload.clone(),
                    transferable_data: transferable_data.clone(),
                })?),
            ),
            Self::Ready => ("onReady".to_string(), None),
            Self::Other { method, args } => (method.clone(), args.clone()),
        })
    }
}
