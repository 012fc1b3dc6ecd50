//! Error taxonomy for the coupling runtime.
//!
//! Every fault kind the specification distinguishes gets its own variant, so
//! callers can match on the kind rather than parse a message. Every variant
//! carries the offending component/slot name and a short detail string.

use thiserror::Error;

/// The coupling runtime's single error type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CouplingError {
    /// A lifecycle precondition was violated.
    #[error("status error in '{component}': expected one of {expected:?}, found {found}")]
    Status {
        component: String,
        expected: Vec<String>,
        found: String,
    },

    /// A timestamp was not monotone, or a pull landed outside the range an
    /// adapter with a cursor can serve.
    #[error("time error in '{slot}': {detail}")]
    Time { slot: String, detail: String },

    /// A pull happened before the first push, or before info exchange
    /// completed.
    #[error("no data in '{slot}': {detail}")]
    NoData { slot: String, detail: String },

    /// Info missing, incompatible, or changed after being exchanged.
    #[error("metadata error in '{slot}': {detail}")]
    Metadata { slot: String, detail: String },

    /// Unconnected input, double-set input source, or wrong source type.
    #[error("link error in '{slot}': {detail}")]
    Link { slot: String, detail: String },

    /// Fan-out detected below a no-branch adapter.
    #[error("branching error in '{slot}': {detail}")]
    Branching { slot: String, detail: String },

    /// The connect loop made no progress in an entire round.
    #[error("connect deadlock: no component made progress this round")]
    ConnectDeadlock,
}

impl CouplingError {
    /// Whether this error is the kind the connect loop is allowed to
    /// tolerate and retry on.
    pub fn is_no_data(&self) -> bool {
        matches!(self, CouplingError::NoData { .. })
    }
}

/// Convenience alias used throughout the crate.
pub type CouplingResult<T> = Result<T, CouplingError>;
