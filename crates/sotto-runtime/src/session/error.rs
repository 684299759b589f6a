use sotto_types::{EndpointId, ErrorCode};
use sotto_wire::WireError;

use crate::channel::ChannelError;
use crate::dispatch::DispatchError;
use crate::fsm::FsmError;
use crate::pool::PoolError;

/// Why a session could not run to delivery.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The target endpoint was never registered with the peer table.
    #[error("peer {peer} is not registered")]
    UnknownPeer { peer: EndpointId },

    /// The target stayed unreachable even after a relaunch.
    #[error("peer {peer} did not come back: {reason}")]
    PeerUnavailable { peer: EndpointId, reason: String },

    /// The launcher could not bring the target up.
    #[error("launching {peer} failed: {reason}")]
    LaunchFailed { peer: EndpointId, reason: String },

    /// The capture device refused to record.
    #[error("capture failed: {reason}")]
    CaptureFailed { reason: String },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Machine(#[from] FsmError),
}

impl SessionError {
    /// The error name carried on the wire when this failure is
    /// reported to the session's target.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::UnknownPeer { .. } | Self::PeerUnavailable { .. } | Self::LaunchFailed { .. } => {
                "TargetUnreachableError"
            }
            Self::CaptureFailed { .. } => "CaptureError",
            Self::Pool(_) => "DeviceError",
            Self::Dispatch(_) | Self::Channel(_) => "MessagingError",
            Self::Machine(_) => "StateError",
        }
    }

    /// Converts the failure into its wire form. A rejection that
    /// already arrived as a named wire error keeps its original name
    /// instead of being re-wrapped.
    #[must_use]
    pub fn to_wire(&self) -> WireError {
        if let Self::Dispatch(DispatchError::Rejected { error, .. }) = self {
            return error.clone();
        }
        WireError::from_error(self.wire_name(), self)
    }
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownPeer { .. } => "SESSION_UNKNOWN_PEER",
            Self::PeerUnavailable { .. } => "SESSION_PEER_UNAVAILABLE",
            Self::LaunchFailed { .. } => "SESSION_LAUNCH_FAILED",
            Self::CaptureFailed { .. } => "SESSION_CAPTURE_FAILED",
            Self::Pool(err) => err.code(),
            Self::Dispatch(err) => err.code(),
            Self::Channel(err) => err.code(),
            Self::Machine(err) => err.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::UnknownPeer { .. } | Self::CaptureFailed { .. } => false,
            Self::PeerUnavailable { .. } | Self::LaunchFailed { .. } => true,
            Self::Pool(err) => err.is_recoverable(),
            Self::Dispatch(err) => err.is_recoverable(),
            Self::Channel(err) => err.is_recoverable(),
            Self::Machine(err) => err.is_recoverable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_types::assert_error_codes;

    fn peer() -> EndpointId {
        EndpointId::new("ctx1")
    }

    #[test]
    fn own_codes_carry_the_session_prefix() {
        assert_error_codes(
            &[
                SessionError::UnknownPeer { peer: peer() },
                SessionError::PeerUnavailable {
                    peer: peer(),
                    reason: "probe answered false".into(),
                },
                SessionError::LaunchFailed {
                    peer: peer(),
                    reason: "spawn refused".into(),
                },
                SessionError::CaptureFailed {
                    reason: "device busy".into(),
                },
            ],
            "SESSION_",
        );
    }

    #[test]
    fn delegated_codes_keep_their_own_prefix() {
        let err = SessionError::from(FsmError::ReentrantTrigger { machine: "orchestrator" });
        assert_eq!(err.code(), "FSM_REENTRANT_TRIGGER");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn rejections_keep_their_wire_name() {
        let rejected = DispatchError::Rejected {
            method: "prepareToSession".into(),
            error: WireError::new("NoTargetError", "no valid destination selected"),
        };
        let err = SessionError::from(rejected);
        let wire = err.to_wire();
        assert_eq!(wire.name, "NoTargetError");
        assert_eq!(wire.message, "no valid destination selected");
    }

    #[test]
    fn local_failures_are_wrapped_under_a_stable_name() {
        let err = SessionError::CaptureFailed { reason: "device busy".into() };
        let wire = err.to_wire();
        assert_eq!(wire.name, "CaptureError");
        assert!(wire.message.contains("device busy"));
    }
}
