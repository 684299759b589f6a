//! Reference-counted keep-alive resource pool.
//!
//! A [`KeepAlive`] holds at most one shared resource and lends it out
//! as cloneable handles behind [`Lease`]s. The resource is created
//! lazily on the first acquire and torn down only after the last
//! lease has been gone for a full grace period, so rapid
//! release-then-reacquire cycles reuse the live instance instead of
//! thrashing create/destroy.
//!
//! ```text
//!              acquire                acquire (reuse)
//!    ┌─────┐ ─────────▶ ┌──────────┐ ◀──────────────┐
//!    │IDLE │            │ ACQUIRED │ refs++ / refs--│
//!    └─────┘ ◀─┐        └──────────┘ ─────────────┐ │
//!       ▲      │grace         │ release, refs == 0│ │
//!       │      │elapsed       ▼                   │ │
//!       │      └────── ┌───────────┐ ◀────────────┘ │
//!       │              │ KEEPALIVE │ ───────────────┘
//!       └─ destroy ────└───────────┘
//! ```
//!
//! Driven by one [`StateMachine`] per pool, which serializes every
//! lifecycle decision:
//!
//! - creation runs at most once per IDLE→ACQUIRED cycle, shared by
//!   all concurrent acquirers; a failed creation is latched for that
//!   cycle and every acquirer of the cycle sees the same error
//! - destruction runs at most once per created resource, and only
//!   after the reference count stayed zero for the whole grace period
//! - an acquire during the grace period aborts the pending
//!   destruction and reuses the instance
//! - grace timers carry the epoch of the KEEPALIVE entry that armed
//!   them; a timer superseded by reuse is ignored even if its abort
//!   raced the firing

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sotto_types::ErrorCode;
use tokio::sync::OnceCell;
use tokio::task::AbortHandle;

use crate::fsm::{Behavior, FsmError, StateMachine, Step};

/// Creates and destroys the pooled resource.
///
/// `create` may be expensive and may fail; both outcomes are shared
/// with every acquirer of the cycle. `destroy` failures are logged
/// and the resource is dropped regardless.
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource, lent out as cloned handles.
    type Resource: Clone + Send + Sync + 'static;

    /// Brings a fresh resource up.
    async fn create(&self) -> Result<Self::Resource, PoolError>;

    /// Tears a resource down after its grace period expired.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), PoolError>;
}

/// Pool failures. Cloneable because a failed creation is latched and
/// handed to several acquirers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The factory could not produce a resource.
    #[error("resource creation failed: {reason}")]
    CreateFailed {
        /// Factory-provided failure description.
        reason: String,
    },
    /// The factory could not tear a resource down.
    #[error("resource destruction failed: {reason}")]
    DestroyFailed {
        /// Factory-provided failure description.
        reason: String,
    },
    /// The pool's state machine refused the drive.
    #[error(transparent)]
    Machine(#[from] FsmError),
}

impl PoolError {
    /// Wraps a factory creation failure.
    pub fn create_failed(reason: impl std::fmt::Display) -> Self {
        Self::CreateFailed {
            reason: reason.to_string(),
        }
    }

    /// Wraps a factory destruction failure.
    pub fn destroy_failed(reason: impl std::fmt::Display) -> Self {
        Self::DestroyFailed {
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for PoolError {
    fn code(&self) -> &'static str {
        match self {
            Self::CreateFailed { .. } => "POOL_CREATE_FAILED",
            Self::DestroyFailed { .. } => "POOL_DESTROY_FAILED",
            Self::Machine(inner) => inner.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // The next cycle starts from a fresh slot.
            Self::CreateFailed { .. } | Self::DestroyFailed { .. } => true,
            Self::Machine(inner) => inner.is_recoverable(),
        }
    }
}

/// Lifecycle of the pooled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// No resource; the slot is empty.
    Idle,
    /// At least one lease is out.
    Acquired,
    /// No leases; the grace timer decides the resource's fate.
    KeepAlive,
}

#[derive(Debug)]
enum PoolEvent {
    Acquire,
    Release,
    GraceElapsed { epoch: u64 },
}

type Slot<R> = Arc<OnceCell<Result<R, PoolError>>>;

struct PoolBehavior<R> {
    refs: usize,
    // Bumped on each KEEPALIVE entry; timers from earlier entries are
    // stale and must not destroy anything.
    epoch: u64,
    slot: Slot<R>,
    reaper: Option<AbortHandle>,
    // Retired resource handed from the grace transition to the
    // destroy step outside the lock.
    doomed: Option<Result<R, PoolError>>,
}

impl<R: Clone + Send + Sync + 'static> Behavior for PoolBehavior<R> {
    type State = PoolState;
    type Event = PoolEvent;

    fn on_event(&mut self, state: PoolState, event: PoolEvent) -> Step<PoolState> {
        match (state, event) {
            (PoolState::Idle, PoolEvent::Acquire) => {
                self.slot = Arc::new(OnceCell::new());
                self.refs = 1;
                Step::Goto(PoolState::Acquired)
            }
            (PoolState::Acquired, PoolEvent::Acquire) => {
                self.refs += 1;
                Step::Stay
            }
            (PoolState::KeepAlive, PoolEvent::Acquire) => {
                if let Some(reaper) = self.reaper.take() {
                    reaper.abort();
                }
                self.refs = 1;
                // Same slot: the live resource is reused.
                Step::Goto(PoolState::Acquired)
            }
            (PoolState::Acquired, PoolEvent::Release) => {
                self.refs = self.refs.saturating_sub(1);
                if self.refs == 0 {
                    self.epoch += 1;
                    Step::Goto(PoolState::KeepAlive)
                } else {
                    Step::Stay
                }
            }
            (PoolState::Idle | PoolState::KeepAlive, PoolEvent::Release) => {
                tracing::warn!(state = ?state, "stray release ignored");
                Step::Stay
            }
            (PoolState::KeepAlive, PoolEvent::GraceElapsed { epoch }) if epoch == self.epoch => {
                let retired = std::mem::replace(&mut self.slot, Arc::new(OnceCell::new()));
                self.doomed = Arc::try_unwrap(retired).ok().and_then(OnceCell::into_inner);
                self.reaper = None;
                Step::Goto(PoolState::Idle)
            }
            (_, PoolEvent::GraceElapsed { epoch }) => {
                tracing::trace!(state = ?state, epoch, "stale grace timer ignored");
                Step::Stay
            }
        }
    }
}

struct KeepAliveInner<R: Clone + Send + Sync + 'static> {
    factory: Arc<dyn ResourceFactory<Resource = R>>,
    machine: StateMachine<PoolBehavior<R>>,
    grace: Duration,
}

/// Shared handle to one resource pool. Clones refer to the same pool.
///
/// Must live inside a Tokio runtime: releasing the last lease spawns
/// the grace timer task.
pub struct KeepAlive<R: Clone + Send + Sync + 'static> {
    inner: Arc<KeepAliveInner<R>>,
}

impl<R: Clone + Send + Sync + 'static> Clone for KeepAlive<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Clone + Send + Sync + 'static> std::fmt::Debug for KeepAlive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAlive")
            .field("name", &self.inner.machine.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> KeepAlive<R> {
    /// Builds an idle pool around `factory`.
    #[must_use]
    pub fn new(
        name: &'static str,
        factory: Arc<dyn ResourceFactory<Resource = R>>,
        grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(KeepAliveInner {
                factory,
                grace,
                machine: StateMachine::new(
                    name,
                    PoolState::Idle,
                    PoolBehavior {
                        refs: 0,
                        epoch: 0,
                        slot: Arc::new(OnceCell::new()),
                        reaper: None,
                        doomed: None,
                    },
                ),
            }),
        }
    }

    /// The pool's current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        self.inner.machine.state()
    }

    /// Acquires a lease on the shared resource, creating it when the
    /// pool is idle.
    ///
    /// Concurrent acquirers share one creation; when it fails, each
    /// of them gets the same latched error and the failure stands
    /// until the cycle drains. Dropping an `acquire` future mid-create
    /// can hand the creation over to the next acquirer, so callers
    /// cancel cooperatively, not by aborting.
    pub async fn acquire(&self) -> Result<Lease<R>, PoolError> {
        let slot = self
            .inner
            .machine
            .trigger_then(PoolEvent::Acquire, |behavior, _| Arc::clone(&behavior.slot))?;
        let created = slot.get_or_init(|| self.inner.factory.create()).await.clone();
        match created {
            Ok(resource) => Ok(Lease {
                pool: self.clone(),
                resource,
                released: false,
            }),
            Err(err) => {
                tracing::warn!(
                    pool = self.inner.machine.name(),
                    error = %err,
                    "acquire failed"
                );
                self.release_ref();
                Err(err)
            }
        }
    }

    fn release_ref(&self) {
        let driven = self
            .inner
            .machine
            .trigger_then(PoolEvent::Release, |behavior, state| {
                if state == PoolState::KeepAlive {
                    let pool = self.clone();
                    let epoch = behavior.epoch;
                    let grace = self.inner.grace;
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(grace).await;
                        pool.grace_elapsed(epoch).await;
                    });
                    behavior.reaper = Some(timer.abort_handle());
                }
            });
        if let Err(err) = driven {
            tracing::error!(
                pool = self.inner.machine.name(),
                error = %err,
                "release could not be driven"
            );
        }
    }

    async fn grace_elapsed(&self, epoch: u64) {
        let doomed = self
            .inner
            .machine
            .trigger_then(PoolEvent::GraceElapsed { epoch }, |behavior, _| {
                behavior.doomed.take()
            });
        let doomed = match doomed {
            Ok(doomed) => doomed,
            Err(err) => {
                tracing::error!(
                    pool = self.inner.machine.name(),
                    error = %err,
                    "grace timer could not be driven"
                );
                None
            }
        };
        if let Some(Ok(resource)) = doomed {
            tracing::info!(pool = self.inner.machine.name(), "destroying idle resource");
            if let Err(err) = self.inner.factory.destroy(resource).await {
                tracing::warn!(
                    pool = self.inner.machine.name(),
                    error = %err,
                    "resource destruction failed"
                );
            }
        }
    }
}

/// Consume-once hold on the pooled resource.
///
/// Dropping the lease releases it; [`Lease::release`] does the same
/// but reads better at deliberate release points. Either way the
/// reference count drops exactly once per lease.
#[must_use = "a lease releases its resource when dropped"]
pub struct Lease<R: Clone + Send + Sync + 'static> {
    pool: KeepAlive<R>,
    resource: R,
    released: bool,
}

impl<R: Clone + Send + Sync + 'static> Lease<R> {
    /// The shared resource handle.
    #[must_use]
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// Releases the lease now.
    pub fn release(mut self) {
        self.released = true;
        self.pool.release_ref();
    }
}

impl<R: Clone + Send + Sync + 'static> std::fmt::Debug for Lease<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("pool", &self.pool.inner.machine.name())
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl<R: Clone + Send + Sync + 'static> Drop for Lease<R> {
    fn drop(&mut self) {
        if !self.released {
            self.pool.release_ref();
        }
    }
}
