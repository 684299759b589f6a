//! Session orchestration.
//!
//! [`Orchestrator`] owns the one-session-at-a-time policy, the
//! workflow module walks a single session through its stages, and
//! [`Peers`] keeps track of which endpoints can be reached and how to
//! revive them. [`CaptureProvider`], [`Launcher`], and the pool's
//! device factory are the seams where real capture devices and
//! process launchers plug in.

mod control;
mod error;
mod orchestrator;
mod peers;
mod traits;
mod workflow;

pub use control::{Command, Control, ControlHandle};
pub use error::SessionError;
pub use orchestrator::{Orchestrator, Phase, StartOutcome};
pub use peers::Peers;
pub use traits::{CaptureProvider, Device, Launcher, Recording};
pub use workflow::SessionDeps;
