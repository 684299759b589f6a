//! Reentrancy-guarded finite-state-machine engine.
//!
//! Every stateful component in the runtime (resource pool, session
//! orchestrator) drives its lifecycle through a [`StateMachine`]: a
//! shared handle over a [`Behavior`] that decides transitions and
//! receives entry hooks.
//!
//! ```text
//!   trigger(event)
//!        │
//!        ▼
//!   ┌─ exclusive drive ───────────────────────────────┐
//!   │ on_event(state, event) ──▶ Stay | Goto | Unhandled
//!   │        Goto(next): state = next; on_enter(next)  │
//!   │ after(behavior, state)    (trigger_then only)    │
//!   └──────────────────────────────────────────────────┘
//! ```
//!
//! Drives are serialized: concurrent triggers from other tasks wait
//! their turn. A trigger issued from *inside* a running hook of the
//! same machine would deadlock on that serialization, so it is
//! detected and refused with [`FsmError::ReentrantTrigger`] before it
//! can touch state. An event the behavior does not handle in the
//! current state is a contract violation, reported as
//! [`FsmError::UnhandledEvent`] with the state untouched.
//!
//! # Example
//!
//! ```
//! use sotto_runtime::fsm::{Behavior, StateMachine, Step};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Gate {
//!     Closed,
//!     Open,
//! }
//!
//! #[derive(Debug)]
//! enum Push {
//!     Open,
//!     Close,
//! }
//!
//! struct GateKeeper {
//!     opened: u32,
//! }
//!
//! impl Behavior for GateKeeper {
//!     type State = Gate;
//!     type Event = Push;
//!
//!     fn on_event(&mut self, state: Gate, event: Push) -> Step<Gate> {
//!         match (state, event) {
//!             (Gate::Closed, Push::Open) => Step::Goto(Gate::Open),
//!             (Gate::Open, Push::Close) => Step::Goto(Gate::Closed),
//!             _ => Step::Unhandled,
//!         }
//!     }
//!
//!     fn on_enter(&mut self, state: Gate) {
//!         if state == Gate::Open {
//!             self.opened += 1;
//!         }
//!     }
//! }
//!
//! let gate = StateMachine::new("gate", Gate::Closed, GateKeeper { opened: 0 });
//! assert_eq!(gate.trigger(Push::Open).unwrap(), Gate::Open);
//! assert!(gate.trigger(Push::Open).is_err());
//! assert_eq!(gate.state(), Gate::Open);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sotto_types::ErrorCode;

/// What a [`Behavior`] decides for one `(state, event)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<S> {
    /// Keep the current state; no entry hook runs.
    Stay,
    /// Transition to the given state and run its entry hook.
    /// Naming the current state is equivalent to [`Step::Stay`].
    Goto(S),
    /// The pair is outside the behavior's contract.
    Unhandled,
}

/// Per-instance transition logic and state-scoped storage.
///
/// The behavior owns whatever fields its states need across
/// transitions (reference counts, timer handles, queued work). Hooks
/// run under the machine's exclusive drive, so they may mutate those
/// fields freely but must not call back into the same machine.
pub trait Behavior: Send + 'static {
    /// The state space.
    type State: Copy + Eq + std::fmt::Debug + Send;
    /// Events driven through [`StateMachine::trigger`].
    type Event: std::fmt::Debug + Send;

    /// Decides the step for an event arriving in `state`.
    fn on_event(&mut self, state: Self::State, event: Self::Event) -> Step<Self::State>;

    /// Runs after the machine enters `state`, including the initial
    /// state at construction.
    fn on_enter(&mut self, state: Self::State) {
        let _ = state;
    }
}

/// Contract violations of the engine itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// A hook of this machine triggered the machine again.
    #[error("{machine}: trigger from inside a running hook of the same machine")]
    ReentrantTrigger {
        /// Machine name as given to [`StateMachine::new`].
        machine: &'static str,
    },
    /// The behavior returned [`Step::Unhandled`].
    #[error("{machine}: no transition for {event} in state {state}")]
    UnhandledEvent {
        /// Machine name as given to [`StateMachine::new`].
        machine: &'static str,
        /// Debug rendering of the state the event arrived in.
        state: String,
        /// Debug rendering of the rejected event.
        event: String,
    },
}

impl ErrorCode for FsmError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReentrantTrigger { .. } => "FSM_REENTRANT_TRIGGER",
            Self::UnhandledEvent { .. } => "FSM_UNHANDLED_EVENT",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

struct Core<B: Behavior> {
    state: B::State,
    behavior: B,
}

struct Inner<B: Behavior> {
    name: &'static str,
    // Thread id of the in-flight drive, 0 when idle. Only ever
    // compared against the caller's own id, so Relaxed suffices.
    driver: AtomicU64,
    core: Mutex<Core<B>>,
}

/// Shared handle to one state machine instance.
///
/// Clones refer to the same instance, so timer tasks and finish
/// guards can drive a machine owned elsewhere.
pub struct StateMachine<B: Behavior> {
    inner: Arc<Inner<B>>,
}

impl<B: Behavior> Clone for StateMachine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Behavior> std::fmt::Debug for StateMachine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Clears the driver mark when a drive ends, even by panic.
struct DriveGuard<'a>(&'a AtomicU64);

impl Drop for DriveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

fn current_tid() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TID: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TID.with(|tid| *tid)
}

impl<B: Behavior> StateMachine<B> {
    /// Builds a machine in `initial` and runs that state's entry hook.
    #[must_use]
    pub fn new(name: &'static str, initial: B::State, mut behavior: B) -> Self {
        behavior.on_enter(initial);
        Self {
            inner: Arc::new(Inner {
                name,
                driver: AtomicU64::new(0),
                core: Mutex::new(Core {
                    state: initial,
                    behavior,
                }),
            }),
        }
    }

    /// The machine name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> B::State {
        self.inner.core.lock().state
    }

    /// Drives one event and returns the resulting state.
    pub fn trigger(&self, event: B::Event) -> Result<B::State, FsmError> {
        self.trigger_then(event, |_, state| state)
    }

    /// Drives one event, then runs `after` on the behavior inside the
    /// same exclusive drive.
    ///
    /// `after` is the way side effects decided during a transition
    /// (work to spawn, resources to retire) leave the machine without
    /// a gap another drive could slip into. It only runs when the
    /// event was handled.
    pub fn trigger_then<T>(
        &self,
        event: B::Event,
        after: impl FnOnce(&mut B, B::State) -> T,
    ) -> Result<T, FsmError> {
        let tid = current_tid();
        if self.inner.driver.load(Ordering::Relaxed) == tid {
            return Err(FsmError::ReentrantTrigger {
                machine: self.inner.name,
            });
        }
        let mut core = self.inner.core.lock();
        self.inner.driver.store(tid, Ordering::Relaxed);
        let _drive = DriveGuard(&self.inner.driver);

        let from = core.state;
        let event_repr = format!("{event:?}");
        let core = &mut *core;
        match core.behavior.on_event(from, event) {
            Step::Stay => {}
            Step::Goto(next) if next == from => {}
            Step::Goto(next) => {
                tracing::debug!(
                    machine = self.inner.name,
                    from = ?from,
                    to = ?next,
                    "transition"
                );
                core.state = next;
                core.behavior.on_enter(next);
            }
            Step::Unhandled => {
                return Err(FsmError::UnhandledEvent {
                    machine: self.inner.name,
                    state: format!("{from:?}"),
                    event: event_repr,
                });
            }
        }
        let state = core.state;
        Ok(after(&mut core.behavior, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_types::assert_error_codes;
    use std::sync::OnceLock;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum S {
        A,
        B,
    }

    #[derive(Debug)]
    enum E {
        Flip,
        Nop,
        Bad,
    }

    struct Flipper {
        entries: Vec<S>,
    }

    impl Behavior for Flipper {
        type State = S;
        type Event = E;

        fn on_event(&mut self, state: S, event: E) -> Step<S> {
            match event {
                E::Flip => Step::Goto(match state {
                    S::A => S::B,
                    S::B => S::A,
                }),
                E::Nop => Step::Stay,
                E::Bad => Step::Unhandled,
            }
        }

        fn on_enter(&mut self, state: S) {
            self.entries.push(state);
        }
    }

    fn flipper() -> StateMachine<Flipper> {
        StateMachine::new("flip", S::A, Flipper { entries: vec![] })
    }

    #[test]
    fn entry_hook_runs_at_construction() {
        let machine = flipper();
        let entries = machine.trigger_then(E::Nop, |b, _| b.entries.clone()).unwrap();
        assert_eq!(entries, vec![S::A]);
        assert_eq!(machine.state(), S::A);
    }

    #[test]
    fn transition_runs_entry_hook_once() {
        let machine = flipper();
        assert_eq!(machine.trigger(E::Flip).unwrap(), S::B);
        let entries = machine.trigger_then(E::Nop, |b, _| b.entries.clone()).unwrap();
        assert_eq!(entries, vec![S::A, S::B]);
    }

    #[test]
    fn stay_does_not_rerun_entry_hook() {
        let machine = flipper();
        machine.trigger(E::Nop).unwrap();
        machine.trigger(E::Nop).unwrap();
        let entries = machine.trigger_then(E::Nop, |b, _| b.entries.clone()).unwrap();
        assert_eq!(entries, vec![S::A]);
    }

    #[test]
    fn unhandled_event_is_a_typed_error_and_state_survives() {
        let machine = flipper();
        machine.trigger(E::Flip).unwrap();
        let err = machine.trigger(E::Bad).unwrap_err();
        assert_eq!(
            err,
            FsmError::UnhandledEvent {
                machine: "flip",
                state: "B".to_string(),
                event: "Bad".to_string(),
            }
        );
        assert_eq!(machine.state(), S::B);
    }

    #[test]
    fn trigger_then_sees_the_post_transition_state() {
        let machine = flipper();
        let seen = machine.trigger_then(E::Flip, |_, state| state).unwrap();
        assert_eq!(seen, S::B);
    }

    #[test]
    fn concurrent_triggers_serialize() {
        let machine = flipper();
        std::thread::scope(|scope| {
            for _ in 0..2 {
                let machine = machine.clone();
                scope.spawn(move || {
                    for _ in 0..50 {
                        machine.trigger(E::Flip).unwrap();
                    }
                });
            }
        });
        // 100 flips, each one a transition, plus the initial entry.
        let entries = machine.trigger_then(E::Nop, |b, _| b.entries.len()).unwrap();
        assert_eq!(entries, 101);
        assert_eq!(machine.state(), S::A);
    }

    struct Reentrant {
        handle: OnceLock<StateMachine<Reentrant>>,
        observed: Option<FsmError>,
    }

    impl Behavior for Reentrant {
        type State = S;
        type Event = E;

        fn on_event(&mut self, state: S, event: E) -> Step<S> {
            match event {
                E::Flip => Step::Goto(match state {
                    S::A => S::B,
                    S::B => S::A,
                }),
                _ => Step::Stay,
            }
        }

        fn on_enter(&mut self, _state: S) {
            if let Some(machine) = self.handle.get() {
                self.observed = machine.trigger(E::Nop).err();
            }
        }
    }

    #[test]
    fn reentrant_trigger_fails_fast_without_corrupting_state() {
        let machine = StateMachine::new(
            "reentrant",
            S::A,
            Reentrant {
                handle: OnceLock::new(),
                observed: None,
            },
        );
        machine
            .trigger_then(E::Nop, |b, _| {
                let _ = b.handle.set(machine.clone());
            })
            .unwrap();

        // The transition itself succeeds; the nested trigger from the
        // entry hook is the one that must be refused.
        assert_eq!(machine.trigger(E::Flip).unwrap(), S::B);
        let observed = machine.trigger_then(E::Nop, |b, _| b.observed.clone()).unwrap();
        assert_eq!(
            observed,
            Some(FsmError::ReentrantTrigger {
                machine: "reentrant"
            })
        );
        assert_eq!(machine.state(), S::B);
    }

    #[test]
    fn error_codes_are_namespaced() {
        assert_error_codes(
            &[
                FsmError::ReentrantTrigger { machine: "m" },
                FsmError::UnhandledEvent {
                    machine: "m",
                    state: "A".into(),
                    event: "Bad".into(),
                },
            ],
            "FSM_",
        );
    }
}
