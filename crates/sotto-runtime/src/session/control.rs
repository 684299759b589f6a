//! Cooperative session control.
//!
//! Cancellation and early finish are never preemptive: the workflow
//! observes the latched [`Command`] at its checkpoints and while
//! waiting on capture. Late observers see the current value, not just
//! future changes.

use tokio::sync::watch;

/// The latched command for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Keep going.
    Run,
    /// Stop capturing early; still process and deliver.
    Finish,
    /// Abandon the session silently.
    Cancel,
}

/// Sender side, held by the orchestrator.
///
/// Commands only escalate: `Run` may become `Finish` or `Cancel`,
/// `Finish` may become `Cancel`, and `Cancel` is final.
#[derive(Debug)]
pub struct Control {
    tx: watch::Sender<Command>,
}

/// Observer side, carried by the session workflow.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    rx: watch::Receiver<Command>,
}

impl Control {
    /// Creates a control pair starting at [`Command::Run`].
    #[must_use]
    pub fn new() -> (Self, ControlHandle) {
        let (tx, rx) = watch::channel(Command::Run);
        (Self { tx }, ControlHandle { rx })
    }

    /// Requests an early finish. A no-op unless the session is still
    /// plainly running.
    pub fn finish(&self) {
        self.tx.send_if_modified(|command| {
            if *command == Command::Run {
                *command = Command::Finish;
                true
            } else {
                false
            }
        });
    }

    /// Cancels the session. Wins over finish and stays latched.
    pub fn cancel(&self) {
        self.tx.send_if_modified(|command| {
            if *command == Command::Cancel {
                false
            } else {
                *command = Command::Cancel;
                true
            }
        });
    }
}

impl ControlHandle {
    /// The current command.
    #[must_use]
    pub fn current(&self) -> Command {
        *self.rx.borrow()
    }

    /// Whether the session has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.current() == Command::Cancel
    }

    /// Waits until the command leaves [`Command::Run`] and returns
    /// it. A vanished controller counts as [`Command::Cancel`].
    pub async fn interrupted(&mut self) -> Command {
        match self.rx.wait_for(|command| *command != Command::Run).await {
            Ok(current) => *current,
            Err(_) => Command::Cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_running() {
        let (_control, handle) = Control::new();
        assert_eq!(handle.current(), Command::Run);
        assert!(!handle.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_final() {
        let (control, handle) = Control::new();
        control.cancel();
        control.finish();
        assert_eq!(handle.current(), Command::Cancel);
    }

    #[tokio::test]
    async fn finish_escalates_to_cancel_but_never_back() {
        let (control, handle) = Control::new();
        control.finish();
        assert_eq!(handle.current(), Command::Finish);
        control.cancel();
        assert_eq!(handle.current(), Command::Cancel);
    }

    #[tokio::test]
    async fn late_observers_see_the_latched_value() {
        let (control, handle) = Control::new();
        control.cancel();
        let late = handle.clone();
        assert!(late.is_cancelled());
    }

    #[tokio::test]
    async fn interrupted_resolves_on_finish() {
        let (control, mut handle) = Control::new();
        let waiter = tokio::spawn(async move { handle.interrupted().await });
        control.finish();
        assert_eq!(waiter.await.unwrap(), Command::Finish);
    }

    #[tokio::test]
    async fn a_dropped_controller_reads_as_cancel() {
        let (control, mut handle) = Control::new();
        drop(control);
        assert_eq!(handle.interrupted().await, Command::Cancel);
    }
}
