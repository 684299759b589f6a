//! Wire protocol for `sotto` endpoint messaging.
//!
//! Everything that moves between endpoints is one [`Envelope`]: a flat
//! JSON object naming a sender, a receiver, and one of three body
//! kinds. Requests and responses correlate through a [`RequestId`];
//! notifications are fire-and-forget.
//!
//! ```text
//!   controller                                target
//!       │  {type:"request", id, method, args}   │
//!       ├───────────────────────────────────────▶
//!       │                                       │
//!       │  {type:"response", id, result|error}  │
//!       ◀───────────────────────────────────────┤
//!       │                                       │
//!       │  {type:"notification", method, args}  │
//!       ├───────────────────────────────────────▶
//! ```
//!
//! # Envelope kinds
//!
//! | `type` | Required fields | Optional fields |
//! |--------|-----------------|-----------------|
//! | `request` | `from`, `to`, `id`, `method` | `args` |
//! | `notification` | `from`, `to`, `method` | `args` |
//! | `response` | `from`, `to`, `id` | `result` xor `error` |
//!
//! A response carries at most one of `result` and `error`; a response
//! with neither reads as a `null` result.
//!
//! # Method catalog
//!
//! The methods endpoints exchange are a closed catalog, modeled by
//! [`Call`]. Methods outside the catalog still decode (as
//! [`Call::Other`]) so one stray peer cannot poison a receive loop;
//! they surface through the unhandled path downstream.
//!
//! # Errors on the wire
//!
//! Failures cross endpoints as a [`WireError`]: name, message, and an
//! optional multi-line stack. Local decode failures are
//! [`EnvelopeError`] and never leave the process.
//!
//! [`RequestId`]: sotto_types::RequestId

mod call;
mod envelope;
mod error;
mod event;

pub use call::Call;
pub use envelope::{Body, Envelope, Outcome};
pub use error::{EnvelopeError, WireError};
pub use event::{SessionEvent, Stage};
