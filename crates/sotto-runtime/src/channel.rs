//! In-memory transport between two endpoints.
//!
//! A [`link`] is a pair of bounded queues, one per direction. Delivery
//! is in order within one direction; nothing is ordered across links.
//! Either side may drop its half at any time, after which sends from
//! the surviving side fail with [`ChannelError::Closed`].

use sotto_types::{EndpointId, ErrorCode};
use sotto_wire::Envelope;
use tokio::sync::mpsc;

/// Messages buffered per direction before senders wait.
pub const CHANNEL_CAPACITY: usize = 64;

/// Transport failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The peer dropped its receiving half; the message was not
    /// delivered. Recoverable by relaunching the peer on a fresh link.
    #[error("link to {to} is closed")]
    Closed {
        /// The unreachable endpoint.
        to: EndpointId,
    },
}

impl ErrorCode for ChannelError {
    fn code(&self) -> &'static str {
        match self {
            Self::Closed { .. } => "CHANNEL_CLOSED",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// Sending half of one direction. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Sender {
    peer: EndpointId,
    tx: mpsc::Sender<Envelope>,
}

impl Sender {
    /// Queues an envelope toward the peer, waiting when the peer is
    /// slow to drain its queue.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.tx.send(envelope).await.map_err(|_| {
            tracing::warn!(to = %self.peer, "channel closed; message dropped");
            ChannelError::Closed {
                to: self.peer.clone(),
            }
        })
    }
}

/// Receiving half of one direction.
#[derive(Debug)]
pub struct Receiver {
    rx: mpsc::Receiver<Envelope>,
}

impl Receiver {
    /// Waits for the next envelope; `None` once the sending side is
    /// gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// One endpoint's view of a duplex link.
#[derive(Debug)]
pub struct Link {
    local: EndpointId,
    peer: EndpointId,
    sender: Sender,
    receiver: Receiver,
}

impl Link {
    /// This side's identity.
    #[must_use]
    pub fn local(&self) -> &EndpointId {
        &self.local
    }

    /// The identity on the other side.
    #[must_use]
    pub fn peer(&self) -> &EndpointId {
        &self.peer
    }

    /// Splits the link into its directional halves.
    #[must_use]
    pub fn split(self) -> (Sender, Receiver) {
        (self.sender, self.receiver)
    }
}

/// Builds a duplex link between two endpoints, returning one [`Link`]
/// per side.
///
/// # Example
///
/// ```
/// # use sotto_runtime::channel::link;
/// # use sotto_wire::{Call, Envelope};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (a, b) = link("controller", "worker");
/// let (a_tx, _a_rx) = a.split();
/// let (_b_tx, mut b_rx) = b.split();
///
/// a_tx.send(Envelope::notification("controller", "worker", Call::Ready))
///     .await
///     .unwrap();
/// assert!(b_rx.recv().await.is_some());
/// # }
/// ```
#[must_use]
pub fn link(a: impl Into<EndpointId>, b: impl Into<EndpointId>) -> (Link, Link) {
    let a = a.into();
    let b = b.into();
    let (a_to_b_tx, a_to_b_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (b_to_a_tx, b_to_a_rx) = mpsc::channel(CHANNEL_CAPACITY);
    (
        Link {
            local: a.clone(),
            peer: b.clone(),
            sender: Sender {
                peer: b.clone(),
                tx: a_to_b_tx,
            },
            receiver: Receiver { rx: b_to_a_rx },
        },
        Link {
            local: b,
            peer: a.clone(),
            sender: Sender {
                peer: a,
                tx: b_to_a_tx,
            },
            receiver: Receiver { rx: a_to_b_rx },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_types::assert_error_codes;
    use sotto_wire::Call;

    fn ping(n: u64) -> Envelope {
        Envelope::notification(
            "a",
            "b",
            Call::Other {
                method: format!("ping{n}"),
                args: None,
            },
        )
    }

    #[tokio::test]
    async fn delivery_preserves_order() {
        let (a, b) = link("a", "b");
        let (tx, _) = a.split();
        let (_, mut rx) = b.split();

        for n in 0..3 {
            tx.send(ping(n)).await.unwrap();
        }
        for n in 0..3 {
            let env = rx.recv().await.unwrap();
            let sotto_wire::Body::Notification { call } = env.body else {
                panic!("expected notification");
            };
            assert_eq!(call.method(), format!("ping{n}"));
        }
    }

    #[tokio::test]
    async fn directions_are_independent() {
        let (a, b) = link("a", "b");
        let (a_tx, mut a_rx) = a.split();
        let (b_tx, mut b_rx) = b.split();

        a_tx.send(ping(1)).await.unwrap();
        b_tx.send(ping(2)).await.unwrap();
        assert!(b_rx.recv().await.is_some());
        assert!(a_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn send_to_dropped_receiver_fails_closed() {
        let (a, b) = link("a", "b");
        let (tx, _) = a.split();
        drop(b);

        let err = tx.send(ping(0)).await.unwrap_err();
        assert_eq!(
            err,
            ChannelError::Closed {
                to: EndpointId::new("b")
            }
        );
    }

    #[tokio::test]
    async fn recv_ends_after_sender_drops() {
        let (a, b) = link("a", "b");
        let (tx, _) = a.split();
        let (_, mut rx) = b.split();

        tx.send(ping(0)).await.unwrap();
        drop(tx);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn error_codes_are_namespaced() {
        assert_error_codes(
            &[ChannelError::Closed {
                to: EndpointId::new("b"),
            }],
            "CHANNEL_",
        );
    }
}
