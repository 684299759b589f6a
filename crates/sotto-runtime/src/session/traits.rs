//! Collaborator seams driven by the session workflow.
//!
//! The workflow itself owns only sequencing. Everything with a real
//! effect sits behind one of these traits so the demo wiring and the
//! tests can substitute their own endpoints and devices.

use async_trait::async_trait;
use serde_json::Value;
use sotto_types::{EndpointId, SessionId};

use super::error::SessionError;

/// Handle to a shared capture device.
///
/// Devices are pooled: sessions borrow one through a lease and hand
/// it back when done, so back-to-back sessions reuse the same warm
/// device instead of re-opening it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable identity, for logs and the capture provider.
    pub id: String,
}

impl Device {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Brings an unreachable peer back up.
///
/// Implementations must register the peer's fresh link with the peer
/// table; the relaunched endpoint announces itself with `onReady`
/// once it is listening.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    async fn launch(&self, peer: &EndpointId) -> Result<(), SessionError>;
}

/// An in-flight capture on a leased device.
///
/// Dropping a recording without calling [`finish`](Self::finish)
/// aborts the capture and discards whatever was recorded.
#[async_trait]
pub trait Recording: Send + 'static {
    /// Resolves when the capture ends on its own. May never resolve;
    /// the workflow races it against the session control.
    async fn completed(&mut self);

    /// Stops capturing and hands back the captured payload.
    async fn finish(self: Box<Self>) -> Result<Value, SessionError>;
}

/// Starts captures on devices handed out by the pool.
#[async_trait]
pub trait CaptureProvider: Send + Sync + 'static {
    async fn begin(
        &self,
        device: &Device,
        session: SessionId,
    ) -> Result<Box<dyn Recording>, SessionError>;
}
