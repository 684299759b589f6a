//! Core types for the sotto session runtime.
//!
//! This crate provides the identifier types and the unified error-code
//! interface shared by every layer of the workspace.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  sotto-types   : EndpointId, SessionId, RequestId,       │
//! │                  ErrorCode                    ◄── HERE   │
//! │  sotto-wire    : Envelope, Call, SessionEvent, WireError │
//! ├──────────────────────────────────────────────────────────┤
//! │  sotto-runtime : channel, dispatch, fsm, pool, session   │
//! ├──────────────────────────────────────────────────────────┤
//! │  sotto-cli     : demo wiring + command line              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Identifier Design
//!
//! Endpoints are addressed by **name** (plain strings on the wire, the
//! way the peers address each other). Sessions and requests use random
//! UUIDs: globally unique without coordination, first-class serde
//! support, safe to log.
//!
//! # Example
//!
//! ```
//! use sotto_types::{EndpointId, RequestId, SessionId};
//!
//! let peer = EndpointId::new("session-peer");
//! let session = SessionId::new();
//! let request = RequestId::new();
//!
//! assert_eq!(peer.as_str(), "session-peer");
//! assert_ne!(session, SessionId::new());
//! assert_ne!(request, RequestId::new());
//! ```

mod error;
mod id;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{EndpointId, RequestId, SessionId};
