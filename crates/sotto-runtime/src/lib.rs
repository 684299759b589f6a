//! Messaging and session runtime for `sotto` endpoints.
//!
//! This crate holds everything between the wire format and a frontend:
//! paired in-process channels, per-link dispatchers with request
//! correlation, a small synchronous state machine engine, a keep-alive
//! resource pool built on it, and the session orchestrator that drives
//! one capture-and-transcribe session at a time.
//!
//! ```text
//!                      ┌───────────────────────────────┐
//!                      │          Orchestrator         │
//!                      │   IDLE / ACTIVE / DRAINING    │
//!                      └──────┬─────────────────┬──────┘
//!                    spawns   │                 │ cancels / finishes
//!                             ▼                 ▼
//!                      ┌─────────────────────────────┐
//!        ┌─────────────│      session workflow       │──────────────┐
//!        │             └──────────────┬──────────────┘              │
//!        │ acquire/release            │ prepare / stage events      │ runWork
//!        ▼                            ▼                             ▼
//! ┌──────────────┐       ┌────────────────────────┐       ┌────────────────┐
//! │  KeepAlive   │       │   Dispatcher (target)  │       │   Dispatcher   │
//! │ device pool  │       │  requests + responses  │       │    (worker)    │
//! └──────────────┘       └───────────┬────────────┘       └───────┬────────┘
//!                                    │ Envelope                   │ Envelope
//!                                    ▼                            ▼
//!                              bounded mpsc links (channel module)
//! ```
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | [`channel`] | Bounded, bidirectional endpoint links |
//! | [`dispatch`] | Request/response correlation and handler tables |
//! | [`fsm`] | Synchronous state machine engine with entry hooks |
//! | [`pool`] | Keep-alive resource pool with a grace period |
//! | [`session`] | Orchestrator, workflow, peer table, control token |
//! | [`config`] | Runtime tunables loaded from TOML |
//!
//! # Concurrency model
//!
//! Handlers and session workflows run as independent tokio tasks and
//! must not assume mutual exclusion with each other. The state
//! machines are the serialization points: every pool or orchestrator
//! step runs exclusively inside a synchronous trigger. Cancellation is
//! cooperative through a watch-based control token, observed at
//! checkpoints rather than preempting work.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod fsm;
pub mod pool;
pub mod session;

pub use channel::{link, ChannelError, Link};
pub use config::{ConfigError, RuntimeConfig};
pub use dispatch::{DispatchError, Dispatcher, Handlers, Reply};
pub use fsm::{Behavior, FsmError, StateMachine, Step};
pub use pool::{KeepAlive, Lease, PoolError, ResourceFactory};
pub use session::{
    CaptureProvider, Command, Control, ControlHandle, Device, Launcher, Orchestrator, Peers,
    Phase, Recording, SessionDeps, SessionError, StartOutcome,
};
