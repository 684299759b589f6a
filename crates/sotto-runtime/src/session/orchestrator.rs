//! The session orchestrator.
//!
//! At most one session runs at a time. Starting a new one while a
//! session is active cancels the current session and queues the new
//! target; the queued session starts only once the old one has fully
//! settled, so two sessions never hold a device lease concurrently.
//!
//! ```text
//!              start                    start (cancel + queue)
//!      IDLE ----------> ACTIVE -----------------------> DRAINING
//!        ^                |  ^                             |   ^
//!        |       finished |  |     finished, queued target |   | start
//!        +----------------+  +-----------------------------+   +--(replace
//!            (no queue)                                          queued)
//! ```

use std::sync::Arc;

use sotto_types::{EndpointId, ErrorCode, SessionId};

use crate::fsm::{Behavior, FsmError, StateMachine, Step};

use super::control::{Control, ControlHandle};
use super::workflow::{run_session, SessionCtx, SessionDeps};

/// Orchestration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No session.
    Idle,
    /// One session running.
    Active,
    /// Current session cancelled, waiting for it to settle before
    /// starting the queued one.
    Draining,
}

/// How a `start` call was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A session spawned immediately under this id.
    Started(SessionId),
    /// An active session is draining; the target will start after it.
    Queued,
}

#[derive(Debug)]
enum OrchEvent {
    Start { target: EndpointId },
    Finish,
    SessionFinished { session: SessionId },
}

/// A session picked during a transition, to be spawned by the driver
/// right after, still inside the same exclusive drive.
type Launch = (SessionId, EndpointId, ControlHandle);

struct Running {
    session: SessionId,
    control: Control,
}

#[derive(Default)]
struct OrchBehavior {
    current: Option<Running>,
    queued: Option<EndpointId>,
    launch: Option<Launch>,
}

impl OrchBehavior {
    fn begin(&mut self, target: EndpointId) -> Step<Phase> {
        let session = SessionId::new();
        let (control, handle) = Control::new();
        self.current = Some(Running { session, control });
        self.launch = Some((session, target, handle));
        Step::Goto(Phase::Active)
    }
}

impl Behavior for OrchBehavior {
    type State = Phase;
    type Event = OrchEvent;

    fn on_event(&mut self, state: Phase, event: OrchEvent) -> Step<Phase> {
        match (state, event) {
            (Phase::Idle, OrchEvent::Start { target }) => self.begin(target),
            (Phase::Active, OrchEvent::Start { target }) => {
                if let Some(running) = &self.current {
                    tracing::info!(
                        session = %running.session,
                        new_target = %target,
                        "session superseded; draining"
                    );
                    running.control.cancel();
                }
                self.queued = Some(target);
                Step::Goto(Phase::Draining)
            }
            (Phase::Draining, OrchEvent::Start { target }) => {
                tracing::debug!(new_target = %target, "queued target replaced");
                self.queued = Some(target);
                Step::Stay
            }
            (Phase::Active | Phase::Draining, OrchEvent::SessionFinished { session }) => {
                match &self.current {
                    Some(running) if running.session == session => {}
                    _ => {
                        tracing::warn!(%session, "finish for a session that is not current");
                        return Step::Stay;
                    }
                }
                self.current = None;
                match self.queued.take() {
                    Some(target) => self.begin(target),
                    None => Step::Goto(Phase::Idle),
                }
            }
            (Phase::Idle, OrchEvent::SessionFinished { .. }) => Step::Unhandled,
            (Phase::Active, OrchEvent::Finish) => {
                if let Some(running) = &self.current {
                    running.control.finish();
                }
                Step::Stay
            }
            (Phase::Draining, OrchEvent::Finish) => {
                tracing::debug!("finish while draining; session is already cancelled");
                Step::Stay
            }
            (Phase::Idle, OrchEvent::Finish) => {
                tracing::warn!("finish with no session running");
                Step::Stay
            }
        }
    }

    fn on_enter(&mut self, state: Phase) {
        tracing::debug!(phase = ?state, "orchestrator phase");
    }
}

struct OrchInner {
    machine: StateMachine<OrchBehavior>,
    deps: SessionDeps,
}

/// Entry point for session control. Clones share one machine.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchInner>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            inner: Arc::new(OrchInner {
                machine: StateMachine::new("orchestrator", Phase::Idle, OrchBehavior::default()),
                deps,
            }),
        }
    }

    /// The current orchestration phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.machine.state()
    }

    /// Starts a session toward `target`, superseding any session that
    /// is already running.
    pub fn start(&self, target: impl Into<EndpointId>) -> Result<StartOutcome, FsmError> {
        let target = target.into();
        let launch = self
            .inner
            .machine
            .trigger_then(OrchEvent::Start { target }, |behavior, _| {
                behavior.launch.take()
            })?;
        Ok(match launch {
            Some(launch) => StartOutcome::Started(self.spawn(launch)),
            None => StartOutcome::Queued,
        })
    }

    /// Asks the running session to stop capturing and deliver what it
    /// has. A no-op outside of a running session.
    pub fn finish(&self) -> Result<(), FsmError> {
        self.inner.machine.trigger(OrchEvent::Finish).map(|_| ())
    }

    fn session_finished(&self, session: SessionId) {
        let next = self
            .inner
            .machine
            .trigger_then(OrchEvent::SessionFinished { session }, |behavior, _| {
                behavior.launch.take()
            });
        match next {
            Ok(Some(launch)) => {
                self.spawn(launch);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(%session, code = err.code(), error = %err, "finish rejected");
            }
        }
    }

    fn spawn(&self, (session, target, control): Launch) -> SessionId {
        let ctx = SessionCtx {
            session,
            target,
            control,
            deps: self.inner.deps.clone(),
        };
        let guard = FinishGuard {
            orchestrator: self.clone(),
            session,
        };
        tokio::spawn(async move {
            run_session(ctx).await;
            drop(guard);
        });
        session
    }
}

/// Reports the session as finished on every exit path of its task,
/// panics included.
struct FinishGuard {
    orchestrator: Orchestrator,
    session: SessionId,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.orchestrator.session_finished(self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{KeepAlive, PoolError, ResourceFactory};
    use crate::session::control::Command;
    use crate::session::error::SessionError;
    use crate::session::peers::Peers;
    use crate::session::traits::{CaptureProvider, Device, Launcher, Recording};
    use async_trait::async_trait;
    use std::time::Duration;

    fn machine() -> StateMachine<OrchBehavior> {
        StateMachine::new("orchestrator-test", Phase::Idle, OrchBehavior::default())
    }

    fn start(target: &str) -> OrchEvent {
        OrchEvent::Start {
            target: EndpointId::new(target),
        }
    }

    #[test]
    fn start_from_idle_arms_a_launch() {
        let machine = machine();
        let launch = machine
            .trigger_then(start("ctx1"), |behavior, _| behavior.launch.take())
            .unwrap();
        let (_, target, handle) = launch.expect("launch armed");
        assert_eq!(machine.state(), Phase::Active);
        assert_eq!(target, EndpointId::new("ctx1"));
        assert_eq!(handle.current(), Command::Run);
    }

    #[test]
    fn supersession_cancels_and_queues() {
        let machine = machine();
        let (first, _, first_handle) = machine
            .trigger_then(start("ctx1"), |behavior, _| behavior.launch.take())
            .unwrap()
            .unwrap();

        assert_eq!(machine.trigger(start("ctx2")).unwrap(), Phase::Draining);
        assert!(first_handle.is_cancelled());

        let next = machine
            .trigger_then(OrchEvent::SessionFinished { session: first }, |b, _| {
                b.launch.take()
            })
            .unwrap();
        let (second, target, handle) = next.expect("queued session starts");
        assert_eq!(machine.state(), Phase::Active);
        assert_eq!(target, EndpointId::new("ctx2"));
        assert_ne!(first, second);
        assert_eq!(handle.current(), Command::Run);
    }

    #[test]
    fn later_starts_replace_the_queued_target() {
        let machine = machine();
        let (first, _, _) = machine
            .trigger_then(start("ctx1"), |behavior, _| behavior.launch.take())
            .unwrap()
            .unwrap();
        machine.trigger(start("ctx2")).unwrap();
        assert_eq!(machine.trigger(start("ctx3")).unwrap(), Phase::Draining);

        let next = machine
            .trigger_then(OrchEvent::SessionFinished { session: first }, |b, _| {
                b.launch.take()
            })
            .unwrap();
        let (_, target, _) = next.expect("queued session starts");
        assert_eq!(target, EndpointId::new("ctx3"));
    }

    #[test]
    fn a_stale_finish_is_ignored() {
        let machine = machine();
        machine
            .trigger_then(start("ctx1"), |behavior, _| behavior.launch.take())
            .unwrap();

        let observed = machine
            .trigger_then(
                OrchEvent::SessionFinished {
                    session: SessionId::new(),
                },
                |behavior, state| (state, behavior.current.is_some(), behavior.launch.is_none()),
            )
            .unwrap();
        assert_eq!(observed, (Phase::Active, true, true));
    }

    #[test]
    fn finish_for_an_idle_orchestrator_is_a_contract_violation() {
        let err = machine()
            .trigger(OrchEvent::SessionFinished {
                session: SessionId::new(),
            })
            .unwrap_err();
        assert!(matches!(err, FsmError::UnhandledEvent { .. }));
    }

    #[test]
    fn finish_signals_the_running_session() {
        let machine = machine();
        let (_, _, handle) = machine
            .trigger_then(start("ctx1"), |behavior, _| behavior.launch.take())
            .unwrap()
            .unwrap();

        assert_eq!(machine.trigger(OrchEvent::Finish).unwrap(), Phase::Active);
        assert_eq!(handle.current(), Command::Finish);

        // Idle finish is merely logged.
        let idle = self::machine();
        assert_eq!(idle.trigger(OrchEvent::Finish).unwrap(), Phase::Idle);
    }

    struct NoLaunch;

    #[async_trait]
    impl Launcher for NoLaunch {
        async fn launch(&self, peer: &EndpointId) -> Result<(), SessionError> {
            Err(SessionError::LaunchFailed {
                peer: peer.clone(),
                reason: "not wired in this test".into(),
            })
        }
    }

    struct NoCapture;

    #[async_trait]
    impl CaptureProvider for NoCapture {
        async fn begin(
            &self,
            _device: &Device,
            _session: sotto_types::SessionId,
        ) -> Result<Box<dyn Recording>, SessionError> {
            Err(SessionError::CaptureFailed {
                reason: "not wired in this test".into(),
            })
        }
    }

    struct OneDevice;

    #[async_trait]
    impl ResourceFactory for OneDevice {
        type Resource = Device;

        async fn create(&self) -> Result<Device, PoolError> {
            Ok(Device::new("mic-0"))
        }

        async fn destroy(&self, _resource: Device) -> Result<(), PoolError> {
            Ok(())
        }
    }

    fn stub_deps() -> SessionDeps {
        SessionDeps {
            peers: Arc::new(Peers::new()),
            launcher: Arc::new(NoLaunch),
            capture: Arc::new(NoCapture),
            devices: KeepAlive::new("devices", Arc::new(OneDevice), Duration::from_secs(10)),
            worker: EndpointId::new("worker"),
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn failed_sessions_free_the_orchestrator() {
        let orchestrator = Orchestrator::new(stub_deps());
        let outcome = orchestrator.start("ctx1").unwrap();
        assert!(matches!(outcome, StartOutcome::Started(_)));
        assert_eq!(orchestrator.phase(), Phase::Active);

        settle().await;
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn queued_target_runs_after_the_drain() {
        let orchestrator = Orchestrator::new(stub_deps());
        orchestrator.start("ctx1").unwrap();
        assert_eq!(orchestrator.start("ctx2").unwrap(), StartOutcome::Queued);
        assert_eq!(orchestrator.phase(), Phase::Draining);

        settle().await;
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }
}
