//! Request/notification/response dispatch over one channel.
//!
//! A [`Dispatcher`] is bound to exactly one `(local, peer)` identity
//! pair. Inbound envelopes outside that binding are refused; within
//! it, requests and notifications are handed to the installed
//! [`Handlers`] table (each invocation spawned independently, so one
//! slow handler never blocks the receive loop) and responses resolve
//! the pending call registered when the request went out.
//!
//! Pending calls are registered *before* transmission, so a response
//! racing back faster than the caller can start waiting is still
//! delivered. A caller that stops waiting deregisters its slot; a
//! response that then arrives is logged as stray and dropped.
//!
//! Two protocol anomalies are load-bearing and stay as they are:
//!
//! - A request for a method the handler table does not cover is
//!   reported and left *unanswered*. The remote pending call never
//!   resolves. Callers that must not hang (the liveness probe) rely
//!   on closed-channel errors instead of a timeout.
//! - There is no request timeout. Cancellation is the caller dropping
//!   the request future.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sotto_types::{EndpointId, ErrorCode, RequestId};
use sotto_wire::{Body, Call, Envelope, Outcome, WireError};
use tokio::sync::oneshot;

use crate::channel::{ChannelError, Link, Receiver, Sender};

/// What a request handler decided.
#[derive(Debug)]
pub enum Reply {
    /// Answer the request with this result.
    Value(Value),
    /// Answer the request with this error.
    Error(WireError),
    /// The method is not handled; the request stays unanswered.
    Unhandled,
}

/// Method handlers for one endpoint, replaceable between sessions.
///
/// Defaults leave every request unanswered and every notification
/// dropped, each with a diagnostic.
#[async_trait]
pub trait Handlers: Send + Sync + 'static {
    /// Handles an inbound request.
    async fn handle_request(&self, call: Call) -> Reply {
        tracing::warn!(method = call.method(), "request method not covered by this table");
        Reply::Unhandled
    }

    /// Handles an inbound notification. Failures stay local.
    async fn handle_notification(&self, call: Call) {
        tracing::warn!(method = call.method(), "notification method not covered by this table");
    }
}

/// Failures surfaced to request/notify callers.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The channel to the peer is gone.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// The peer answered with an error.
    #[error("{method} refused by peer: {error}")]
    Rejected {
        /// Method of the refused request.
        method: String,
        /// The peer's error, as it crossed the wire.
        error: WireError,
    },
    /// The response slot vanished before a response was delivered.
    #[error("response for {id} was dropped before delivery")]
    ResponseLost {
        /// Correlation id of the abandoned request.
        id: RequestId,
    },
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Channel(inner) => inner.code(),
            Self::Rejected { .. } => "DISPATCH_REJECTED",
            Self::ResponseLost { .. } => "DISPATCH_RESPONSE_LOST",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Channel(inner) => inner.is_recoverable(),
            Self::Rejected { .. } | Self::ResponseLost { .. } => false,
        }
    }
}

type PendingMap = Mutex<HashMap<RequestId, oneshot::Sender<Outcome>>>;

/// Deregisters a pending call when the caller stops waiting.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

/// One endpoint's dispatcher over one channel.
pub struct Dispatcher {
    local: EndpointId,
    peer: EndpointId,
    tx: Sender,
    pending: PendingMap,
    handlers: RwLock<Option<Arc<dyn Handlers>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Binds a dispatcher to its side of `link`. The caller owns the
    /// receive loop: feed the returned [`Receiver`] through
    /// [`Dispatcher::run`] or deliver envelopes with
    /// [`Dispatcher::dispatch`] directly.
    #[must_use]
    pub fn new(link: Link) -> (Arc<Self>, Receiver) {
        let local = link.local().clone();
        let peer = link.peer().clone();
        let (tx, rx) = link.split();
        (
            Arc::new(Self {
                local,
                peer,
                tx,
                pending: Mutex::new(HashMap::new()),
                handlers: RwLock::new(None),
            }),
            rx,
        )
    }

    /// Binds a dispatcher and spawns its receive loop. The loop ends
    /// when the peer's sending half is dropped.
    #[must_use]
    pub fn spawn(link: Link) -> Arc<Self> {
        let (this, rx) = Self::new(link);
        tokio::spawn(Arc::clone(&this).run(rx));
        this
    }

    /// This endpoint's identity.
    #[must_use]
    pub fn local(&self) -> &EndpointId {
        &self.local
    }

    /// The bound peer's identity.
    #[must_use]
    pub fn peer(&self) -> &EndpointId {
        &self.peer
    }

    /// Installs or replaces the handler table.
    pub fn set_handlers(&self, handlers: Arc<dyn Handlers>) {
        *self.handlers.write() = Some(handlers);
    }

    /// Receives envelopes until the channel closes.
    pub async fn run(self: Arc<Self>, mut rx: Receiver) {
        while let Some(envelope) = rx.recv().await {
            self.dispatch(envelope);
        }
        tracing::debug!(local = %self.local, peer = %self.peer, "receive loop ended");
    }

    /// Delivers one inbound envelope. Returns whether the envelope
    /// matched this dispatcher's binding and was consumed.
    pub fn dispatch(self: &Arc<Self>, envelope: Envelope) -> bool {
        if envelope.from != self.peer || envelope.to != self.local {
            tracing::trace!(
                from = %envelope.from,
                to = %envelope.to,
                local = %self.local,
                "envelope outside this binding; ignored"
            );
            return false;
        }
        tracing::debug!(peer = %self.peer, kind = envelope.body.kind(), "inbound");
        match envelope.body {
            Body::Request { id, call } => self.accept_request(id, call),
            Body::Notification { call } => self.accept_notification(call),
            Body::Response { id, outcome } => self.accept_response(id, outcome),
        }
        true
    }

    /// Sends a request and waits for its response. No timeout: drop
    /// the future to stop waiting.
    pub async fn request(&self, call: Call) -> Result<Value, DispatchError> {
        let id = RequestId::new();
        let method = call.method().to_string();
        let (slot_tx, slot_rx) = oneshot::channel();
        // Registered before transmission so an instant response still
        // finds its slot.
        self.pending.lock().insert(id, slot_tx);
        let _pending = PendingGuard {
            pending: &self.pending,
            id,
        };

        tracing::debug!(peer = %self.peer, %id, method = %method, "request");
        self.tx
            .send(Envelope::request(
                self.local.clone(),
                self.peer.clone(),
                id,
                call,
            ))
            .await?;

        match slot_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(DispatchError::Rejected { method, error }),
            Err(_) => Err(DispatchError::ResponseLost { id }),
        }
    }

    /// Sends a fire-and-forget notification.
    pub async fn notify(&self, call: Call) -> Result<(), ChannelError> {
        tracing::debug!(peer = %self.peer, method = call.method(), "notify");
        self.tx
            .send(Envelope::notification(
                self.local.clone(),
                self.peer.clone(),
                call,
            ))
            .await
    }

    fn accept_request(self: &Arc<Self>, id: RequestId, call: Call) {
        let Some(handlers) = self.handlers.read().clone() else {
            tracing::warn!(
                method = call.method(),
                %id,
                "no handler table installed; request left unanswered"
            );
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let method = call.method().to_string();
            match handlers.handle_request(call).await {
                Reply::Value(value) => this.respond(id, &method, Ok(value)).await,
                Reply::Error(error) => this.respond(id, &method, Err(error)).await,
                Reply::Unhandled => {
                    // No response on purpose; the caller's pending
                    // call stays open. See the module docs.
                    tracing::warn!(method = %method, %id, "no handler for request; no response sent");
                }
            }
        });
    }

    fn accept_notification(&self, call: Call) {
        let Some(handlers) = self.handlers.read().clone() else {
            tracing::warn!(
                method = call.method(),
                "no handler table installed; notification dropped"
            );
            return;
        };
        tokio::spawn(async move { handlers.handle_notification(call).await });
    }

    fn accept_response(&self, id: RequestId, outcome: Outcome) {
        match self.pending.lock().remove(&id) {
            Some(slot) => {
                if slot.send(outcome).is_err() {
                    tracing::debug!(%id, "caller stopped waiting before its response arrived");
                }
            }
            None => tracing::warn!(%id, "stray response; no pending call with this id"),
        }
    }

    async fn respond(&self, id: RequestId, method: &str, outcome: Outcome) {
        let envelope = Envelope {
            from: self.local.clone(),
            to: self.peer.clone(),
            body: Body::Response { id, outcome },
        };
        if let Err(err) = self.tx.send(envelope).await {
            tracing::warn!(%id, method, error = %err, "response could not be delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::link;
    use serde_json::json;
    use sotto_types::assert_error_codes;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Script {
        notes: mpsc::UnboundedSender<String>,
        tag: &'static str,
    }

    #[async_trait]
    impl Handlers for Script {
        async fn handle_request(&self, call: Call) -> Reply {
            match call {
                Call::AreYouThere(_) => Reply::Value(json!(self.tag)),
                Call::Other { method, args } if method == "echo" => {
                    let n = args.as_ref().and_then(|a| a["n"].as_u64()).unwrap_or(0);
                    if n == 1 {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Reply::Value(json!(n))
                }
                Call::Other { method, .. } if method == "boom" => {
                    Reply::Error(WireError::new("BoomError", "kaboom"))
                }
                _ => Reply::Unhandled,
            }
        }

        async fn handle_notification(&self, call: Call) {
            let _ = self.notes.send(call.method().to_string());
        }
    }

    fn wired() -> (
        Arc<Dispatcher>,
        Arc<Dispatcher>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (left, right) = link("left", "right");
        let left = Dispatcher::spawn(left);
        let right = Dispatcher::spawn(right);
        let (notes, seen) = mpsc::unbounded_channel();
        right.set_handlers(Arc::new(Script { notes, tag: "first" }));
        (left, right, seen)
    }

    fn other(method: &str, args: Option<Value>) -> Call {
        Call::Other {
            method: method.to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn request_resolves_with_the_peer_reply() {
        let (left, _right, _seen) = wired();
        let result = left.request(Call::AreYouThere(None)).await.unwrap();
        assert_eq!(result, json!("first"));
    }

    #[tokio::test]
    async fn peer_error_surfaces_as_rejected() {
        let (left, _right, _seen) = wired();
        let err = left.request(other("boom", None)).await.unwrap_err();
        let DispatchError::Rejected { method, error } = err else {
            panic!("expected Rejected, got {err:?}");
        };
        assert_eq!(method, "boom");
        assert_eq!(error.name, "BoomError");
    }

    #[tokio::test]
    async fn concurrent_requests_correlate_by_id() {
        let (left, _right, _seen) = wired();
        // n == 1 answers slower, so responses return out of order.
        let (one, two) = tokio::join!(
            left.request(other("echo", Some(json!({"n": 1})))),
            left.request(other("echo", Some(json!({"n": 2})))),
        );
        assert_eq!(one.unwrap(), json!(1));
        assert_eq!(two.unwrap(), json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unhandled_request_is_never_answered_and_table_survives() {
        let (left, _right, _seen) = wired();
        let waited = timeout(Duration::from_secs(60), left.request(other("nope", None))).await;
        assert!(waited.is_err(), "unhandled request must stay pending");

        // The dispatcher and its table keep working afterwards.
        let result = left.request(Call::AreYouThere(None)).await.unwrap();
        assert_eq!(result, json!("first"));
        assert!(left.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn handler_table_is_replaceable() {
        let (left, right, _seen) = wired();
        assert_eq!(left.request(Call::AreYouThere(None)).await.unwrap(), json!("first"));

        let (notes, _seen2) = mpsc::unbounded_channel();
        right.set_handlers(Arc::new(Script {
            notes,
            tag: "second",
        }));
        assert_eq!(
            left.request(Call::AreYouThere(None)).await.unwrap(),
            json!("second")
        );
    }

    #[tokio::test]
    async fn notifications_reach_the_handler() {
        let (left, _right, mut seen) = wired();
        left.notify(Call::Ready).await.unwrap();
        assert_eq!(seen.recv().await.unwrap(), "onReady");
    }

    #[tokio::test]
    async fn stray_response_is_a_logged_no_op() {
        let (left, _right, _seen) = wired();
        let stray = Envelope {
            from: EndpointId::new("right"),
            to: EndpointId::new("left"),
            body: Body::Response {
                id: RequestId::new(),
                outcome: Ok(json!(42)),
            },
        };
        assert!(left.dispatch(stray));
        // Still fully operational.
        assert_eq!(left.request(Call::AreYouThere(None)).await.unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn envelopes_outside_the_binding_are_refused() {
        let (left, _right, _seen) = wired();
        let foreign = Envelope::notification("stranger", "left", Call::Ready);
        assert!(!left.dispatch(foreign));
        let misdelivered = Envelope::notification("right", "someone-else", Call::Ready);
        assert!(!left.dispatch(misdelivered));
    }

    #[tokio::test]
    async fn send_failure_deregisters_the_pending_call() {
        let (left_link, right_link) = link("left", "right");
        let left = Dispatcher::spawn(left_link);
        drop(right_link);

        let err = left.request(Call::AreYouThere(None)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Channel(ChannelError::Closed { .. })));
        assert!(left.pending.lock().is_empty());
    }

    #[test]
    fn error_codes_are_namespaced() {
        assert_error_codes(
            &[
                DispatchError::Rejected {
                    method: "x".into(),
                    error: WireError::new("E", "m"),
                },
                DispatchError::ResponseLost { id: RequestId::new() },
            ],
            "DISPATCH_",
        );
    }
}
