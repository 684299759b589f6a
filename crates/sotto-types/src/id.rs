//! Identifier types for sotto.
//!
//! Endpoints are addressed by name; sessions and requests carry
//! UUID-based identifiers safe to transmit across contexts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a logical participant in the messaging layer.
///
/// An endpoint is a named execution context: the controller, a session
/// peer, a worker. Messages declare a source and destination endpoint,
/// and a dispatcher is bound to exactly one (local, peer) pair.
///
/// Endpoint names are plain strings on the wire:
///
/// ```
/// use sotto_types::EndpointId;
///
/// let controller = EndpointId::new("controller");
/// assert_eq!(controller.as_str(), "controller");
/// assert_eq!(format!("{controller}"), "controller");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// Creates an endpoint identity from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the endpoint name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EndpointId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one run of the session workflow.
///
/// Allocated when the orchestrator starts a session and carried in
/// every `prepareToSession` request and `onSessionEvent` notification,
/// so a peer can keep per-session bookkeeping across overlapping runs.
///
/// # Example
///
/// ```
/// use sotto_types::SessionId;
///
/// let a = SessionId::new();
/// let b = SessionId::new();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

#[allow(clippy::new_without_default)] // Default intentionally not implemented - sessions are minted by the orchestrator
impl SessionId {
    /// Creates a new [`SessionId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Correlation identifier pairing a request with its response.
///
/// Unique among the outstanding requests of one dispatcher instance;
/// once the matching response arrives the id may be reused.
///
/// # Example
///
/// ```
/// use sotto_types::RequestId;
///
/// let id = RequestId::new();
/// assert!(format!("{id}").starts_with("req:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

#[allow(clippy::new_without_default)] // Default intentionally not implemented - ids are allocated per outbound request
impl RequestId {
    /// Creates a new [`RequestId`] with a random UUID v4.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "req:{}", self.0)
    }
}
