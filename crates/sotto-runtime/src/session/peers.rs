//! Peer table: who is reachable, and how to bring them back.
//!
//! Every remote endpoint the controller talks to is registered here
//! with its dispatcher and a readiness latch. Before a session uses a
//! peer, [`Peers::ensure_available`] probes it with `areYouThere` and,
//! if the probe fails, relaunches it and waits for its `onReady`
//! announcement before probing once more. One relaunch per ensure;
//! a second failure is reported to the caller.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sotto_types::EndpointId;
use sotto_wire::Call;
use tokio::sync::Notify;

use crate::dispatch::{Dispatcher, Handlers};

use super::error::SessionError;
use super::traits::Launcher;

/// Armed-then-awaited readiness signal.
///
/// `reset` arms the latch, `open` trips it. Opening before anyone
/// waits is fine; the state is a flag, not an event.
struct Latch {
    set: AtomicBool,
    notify: Notify,
}

impl Latch {
    fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Trips the latch. Returns whether it was newly opened.
    fn open(&self) -> bool {
        let newly = !self.set.swap(true, Ordering::AcqRel);
        self.notify.notify_waiters();
        newly
    }

    fn reset(&self) {
        self.set.store(false, Ordering::Release);
    }

    async fn wait(&self) {
        loop {
            // Register before checking so an open between the check
            // and the await still wakes us.
            let notified = self.notify.notified();
            if self.set.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

struct PeerEntry {
    dispatcher: Arc<Dispatcher>,
    ready: Arc<Latch>,
}

/// Registry of the endpoints this process can send to.
#[derive(Default)]
pub struct Peers {
    entries: Mutex<HashMap<EndpointId, PeerEntry>>,
}

impl Peers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer, or swaps in a fresh dispatcher for one that
    /// already exists. The readiness latch survives the swap so an
    /// ensure in flight keeps observing the same latch the relaunch
    /// will trip.
    pub fn register(&self, peer: EndpointId, dispatcher: Arc<Dispatcher>) {
        match self.entries.lock().entry(peer) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().dispatcher = dispatcher;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PeerEntry {
                    dispatcher,
                    ready: Arc::new(Latch::new()),
                });
            }
        }
    }

    /// The registered dispatcher for `peer`, if any.
    #[must_use]
    pub fn get(&self, peer: &EndpointId) -> Option<Arc<Dispatcher>> {
        self.entries
            .lock()
            .get(peer)
            .map(|entry| Arc::clone(&entry.dispatcher))
    }

    /// Records an `onReady` announcement from `peer`.
    pub fn mark_ready(&self, peer: &EndpointId) {
        let latch = self
            .entries
            .lock()
            .get(peer)
            .map(|entry| Arc::clone(&entry.ready));
        match latch {
            Some(latch) => {
                if !latch.open() {
                    tracing::debug!(%peer, "repeated ready announcement");
                }
            }
            None => tracing::warn!(%peer, "ready announcement from an unregistered peer"),
        }
    }

    /// Handlers for the controller side of a peer link: accepts the
    /// peer's `onReady` and reports anything else.
    #[must_use]
    pub fn ready_handlers(self: &Arc<Self>, peer: EndpointId) -> Arc<dyn Handlers> {
        Arc::new(ReadyHandlers {
            peers: Arc::clone(self),
            peer,
        })
    }

    /// Returns a dispatcher for `peer` that answered a liveness probe.
    ///
    /// A peer that fails the first probe gets one relaunch: the latch
    /// is armed, the launcher runs, and the probe is retried after the
    /// peer announces ready. The wait for `onReady` is unbounded; a
    /// launcher that reports success but never produces the
    /// announcement leaves the session parked.
    pub async fn ensure_available(
        &self,
        peer: &EndpointId,
        launcher: &dyn Launcher,
    ) -> Result<Arc<Dispatcher>, SessionError> {
        let (dispatcher, latch) = self.parts(peer)?;
        match probe(&dispatcher).await {
            Ok(()) => return Ok(dispatcher),
            Err(reason) => {
                tracing::info!(%peer, %reason, "peer not answering; relaunching");
            }
        }

        // Arm before launching so a fast announcement cannot be missed.
        latch.reset();
        launcher.launch(peer).await?;
        latch.wait().await;

        // The launcher usually registered a fresh link; re-read it.
        let (dispatcher, _) = self.parts(peer)?;
        probe(&dispatcher)
            .await
            .map_err(|reason| SessionError::PeerUnavailable {
                peer: peer.clone(),
                reason,
            })?;
        Ok(dispatcher)
    }

    fn parts(&self, peer: &EndpointId) -> Result<(Arc<Dispatcher>, Arc<Latch>), SessionError> {
        self.entries
            .lock()
            .get(peer)
            .map(|entry| (Arc::clone(&entry.dispatcher), Arc::clone(&entry.ready)))
            .ok_or_else(|| SessionError::UnknownPeer { peer: peer.clone() })
    }
}

async fn probe(dispatcher: &Dispatcher) -> Result<(), String> {
    match dispatcher.request(Call::AreYouThere(None)).await {
        Ok(answer) if answer.as_bool().unwrap_or(false) => Ok(()),
        Ok(answer) => Err(format!("probe answered {answer}")),
        Err(err) => Err(err.to_string()),
    }
}

struct ReadyHandlers {
    peers: Arc<Peers>,
    peer: EndpointId,
}

#[async_trait]
impl Handlers for ReadyHandlers {
    async fn handle_notification(&self, call: Call) {
        match call {
            Call::Ready => self.peers.mark_ready(&self.peer),
            other => {
                tracing::warn!(method = other.method(), "unexpected notification at controller");
            }
        }
    }
}
