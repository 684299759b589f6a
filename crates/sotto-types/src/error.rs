//! Unified error interface for sotto.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so the
//! dispatcher, orchestrator, and CLI can log and classify failures the
//! same way.
//!
//! # Example
//!
//! ```
//! use sotto_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     PeerGone,
//!     BadPayload,
//! }
//!
//! impl ErrorCode for MyError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::PeerGone => "MY_PEER_GONE",
//!             Self::BadPayload => "MY_BAD_PAYLOAD",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::PeerGone)
//!     }
//! }
//!
//! assert_eq!(MyError::PeerGone.code(), "MY_PEER_GONE");
//! ```

/// Unified error code interface.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**, prefixed with the owning domain
///   (`"WIRE_"`, `"CHANNEL_"`, `"DISPATCH_"`, `"FSM_"`, `"POOL_"`,
///   `"SESSION_"`)
/// - **Stable**: codes are an API contract and do not change once defined
///
/// # Recoverability
///
/// Recoverable means retrying may succeed or the user can act on it
/// (a vanished peer, a refused preparation). Contract violations and
/// malformed input are not recoverable.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether the error is recoverable.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows the workspace conventions.
///
/// # Panics
///
/// Panics with a descriptive message if the code is empty, lacks the
/// expected prefix, or is not UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use sotto_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// struct Late;
///
/// impl ErrorCode for Late {
///     fn code(&self) -> &'static str { "DEMO_LATE" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Late, "DEMO_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");

    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );

    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every variant of an error enum at once.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

/// Checks if a string is UPPER_SNAKE_CASE.
fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }

    if s.starts_with('_') || s.ends_with('_') {
        return false;
    }

    if s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
