//! The routed message frame.
//!
//! Every message is one flat JSON object addressed from one endpoint
//! to another:
//!
//! ```json
//! { "from": "controller", "to": "target", "type": "request",
//!   "id": "4bf1…", "method": "prepareToSession", "args": { "sessionId": "9a20…" } }
//! ```
//!
//! The `type` field picks the [`Body`] kind; the remaining fields are
//! present or absent per kind. In memory the frame is a tagged enum
//! so a request cannot be constructed without an id nor a response
//! with a method. The flat wire shape is bridged through a raw struct
//! on (de)serialization.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use sotto_types::{EndpointId, RequestId};

use crate::call::Call;
use crate::error::{EnvelopeError, WireError};

/// How a request ended: a result value or a wire-shaped error.
pub type Outcome = Result<Value, WireError>;

/// The payload of an [`Envelope`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// A call expecting exactly one [`Response`](Self::Response) back.
    Request {
        /// Correlation id echoed by the response.
        id: RequestId,
        /// The invoked method.
        call: Call,
    },
    /// A fire-and-forget call.
    Notification {
        /// The invoked method.
        call: Call,
    },
    /// The completion of an earlier request.
    Response {
        /// Correlation id of the request being answered.
        id: RequestId,
        /// Result value or error.
        outcome: Outcome,
    },
}

impl Body {
    /// Returns the wire name of the body kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Notification { .. } => "notification",
            Self::Response { .. } => "response",
        }
    }
}

/// One message between two endpoints.
///
/// # Example
///
/// ```
/// use sotto_types::RequestId;
/// use sotto_wire::{Body, Call, Envelope};
///
/// let env = Envelope::request("controller", "worker", RequestId::new(), Call::AreYouThere(None));
/// let json = serde_json::to_string(&env).unwrap();
/// let back: Envelope = serde_json::from_str(&json).unwrap();
/// assert_eq!(back, env);
/// assert!(matches!(back.body, Body::Request { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawEnvelope")]
pub struct Envelope {
    /// Sender identity.
    pub from: EndpointId,
    /// Receiver identity.
    pub to: EndpointId,
    /// The payload.
    pub body: Body,
}

impl Envelope {
    /// Builds a request envelope.
    #[must_use]
    pub fn request(
        from: impl Into<EndpointId>,
        to: impl Into<EndpointId>,
        id: RequestId,
        call: Call,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            body: Body::Request { id, call },
        }
    }

    /// Builds a notification envelope.
    #[must_use]
    pub fn notification(
        from: impl Into<EndpointId>,
        to: impl Into<EndpointId>,
        call: Call,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            body: Body::Notification { call },
        }
    }

    /// Builds the response to a request, with `from`/`to` swapped
    /// relative to the request envelope.
    #[must_use]
    pub fn response(request: &Envelope, id: RequestId, outcome: Outcome) -> Self {
        Self {
            from: request.to.clone(),
            to: request.from.clone(),
            body: Body::Response { id, outcome },
        }
    }
}

/// The flat wire shape. All kind-dependent fields are optional here;
/// [`TryFrom`] enforces which ones each kind requires.
#[derive(Serialize, Deserialize)]
struct RawEnvelope {
    from: EndpointId,
    to: EndpointId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WireError>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        let body = match raw.kind.as_str() {
            "request" => {
                let id = raw.id.ok_or(EnvelopeError::MissingId { kind: "request" })?;
                let method = raw
                    .method
                    .ok_or(EnvelopeError::MissingMethod { kind: "request" })?;
                Body::Request {
                    id,
                    call: Call::from_wire(&method, raw.args)?,
                }
            }
            "notification" => {
                let method = raw.method.ok_or(EnvelopeError::MissingMethod {
                    kind: "notification",
                })?;
                Body::Notification {
                    call: Call::from_wire(&method, raw.args)?,
                }
            }
            "response" => {
                let id = raw.id.ok_or(EnvelopeError::MissingId { kind: "response" })?;
                // A bare response carries neither key; it reads as Ok(null).
                let outcome = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Body::Response { id, outcome }
            }
            other => {
                return Err(EnvelopeError::UnknownType {
                    found: other.to_string(),
                })
            }
        };
        Ok(Self {
            from: raw.from,
            to: raw.to,
            body,
        })
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut raw = RawEnvelope {
            from: self.from.clone(),
            to: self.to.clone(),
            kind: self.body.kind().to_string(),
            id: None,
            method: None,
            args: None,
            result: None,
            error: None,
        };
        match &self.body {
            Body::Request { id, call } => {
                let (method, args) = call.to_wire().map_err(serde::ser::Error::custom)?;
                raw.id = Some(*id);
                raw.method = Some(method);
                raw.args = args;
            }
            Body::Notification { call } => {
                let (method, args) = call.to_wire().map_err(serde::ser::Error::custom)?;
                raw.method = Some(method);
                raw.args = args;
            }
            Body::Response { id, outcome } => {
                raw.id = Some(*id);
                match outcome {
                    // Ok(null) stays a bare response on the wire.
                    Ok(Value::Null) => {}
                    Ok(value) => raw.result = Some(value.clone()),
                    Err(error) => raw.error = Some(error.clone()),
                }
            }
        }
        raw.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_wire_shape_is_flat() {
        let id = RequestId::new();
        let env = Envelope::request("controller", "worker", id, Call::AreYouThere(None));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({
                "from": "controller",
                "to": "worker",
                "type": "request",
                "id": id.uuid().to_string(),
                "method": "areYouThere",
            })
        );
    }

    #[test]
    fn notification_has_no_id() {
        let env = Envelope::notification("target", "controller", Call::Ready);
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["method"], "onReady");
        assert!(value.get("id").is_none());
    }

    #[test]
    fn response_swaps_from_and_to() {
        let id = RequestId::new();
        let req = Envelope::request("controller", "worker", id, Call::AreYouThere(None));
        let resp = Envelope::response(&req, id, Ok(json!(true)));
        assert_eq!(resp.from, EndpointId::new("worker"));
        assert_eq!(resp.to, EndpointId::new("controller"));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["result"], json!(true));
        assert!(value.get("error").is_none());
        assert!(value.get("method").is_none());
    }

    #[test]
    fn null_result_is_omitted_from_the_wire() {
        let id = RequestId::new();
        let req = Envelope::request("a", "b", id, Call::Ready);
        let resp = Envelope::response(&req, id, Ok(Value::Null));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn bare_response_reads_as_ok_null() {
        let id = RequestId::new();
        let json = json!({
            "from": "worker",
            "to": "controller",
            "type": "response",
            "id": id.uuid().to_string(),
        });
        let env: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(
            env.body,
            Body::Response {
                id,
                outcome: Ok(Value::Null)
            }
        );
    }

    #[test]
    fn error_response_round_trips() {
        let id = RequestId::new();
        let req = Envelope::request("controller", "target", id, Call::AreYouThere(None));
        let resp = Envelope::response(
            &req,
            id,
            Err(WireError::new("NoTargetError", "no valid destination selected")),
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"]["name"], "NoTargetError");
        assert!(value.get("result").is_none());
        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn unknown_method_still_parses() {
        let json = json!({
            "from": "peer",
            "to": "controller",
            "type": "notification",
            "method": "somethingNew",
            "args": {"x": 1},
        });
        let env: Envelope = serde_json::from_value(json).unwrap();
        let Body::Notification { call } = env.body else {
            panic!("expected notification");
        };
        assert_eq!(call.method(), "somethingNew");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = json!({
            "from": "a",
            "to": "b",
            "type": "broadcast",
            "method": "x",
        });
        let err = serde_json::from_value::<Envelope>(json).unwrap_err();
        assert!(err.to_string().contains("broadcast"));
    }

    #[test]
    fn request_without_id_is_rejected() {
        let json = json!({
            "from": "a",
            "to": "b",
            "type": "request",
            "method": "areYouThere",
        });
        assert!(serde_json::from_value::<Envelope>(json).is_err());
    }

    #[test]
    fn full_round_trip_through_text() {
        let id = RequestId::new();
        let env = Envelope::request(
            "controller",
            "worker",
            id,
            Call::RunWork {
                payload: json!({"pcm": [1, 2, 3]}),
                transferable_data: None,
            },
        );
        let text = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, env);
    }
}
