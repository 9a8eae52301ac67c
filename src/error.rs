//! Error taxonomy for negotiation and the wire protocol.
//!
//! Descriptor and negotiation failures surface to the caller and are
//! retryable; protocol failures are logged and the offending frame is
//! dropped. Nothing in here is ever fatal to the process.

use std::time::Duration;

use crate::descriptor::DescriptorKind;
use crate::negotiator::NegotiationState;

/// A pasted signaling blob could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Not valid JSON, or JSON of the wrong shape.
    #[error("descriptor is not valid session data: {0}")]
    Malformed(#[from] serde_json::Error),
    /// An offer arrived where an answer was expected, or vice versa.
    #[error("expected an {expected} descriptor, got an {got}")]
    UnexpectedKind {
        expected: DescriptorKind,
        got: DescriptorKind,
    },
    /// The answer was produced for a different offer.
    #[error("answer belongs to session {got:#018x}, not {expected:#018x}")]
    SessionMismatch { expected: u64, got: u64 },
    /// A descriptor without candidates can never be connected to.
    #[error("descriptor carries no candidates")]
    NoCandidates,
}

/// Negotiation could not produce a channel. Retryable from a fresh
/// negotiator; the failed one holds no resources worth keeping.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("candidate gathering did not finish within {0:?}")]
    GatheringTimedOut(Duration),
    #[error("no channel established within {0:?}")]
    OpenTimedOut(Duration),
    #[error("every connection attempt failed")]
    Exhausted,
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{op} is not valid in state {state}")]
    InvalidState {
        op: &'static str,
        state: NegotiationState,
    },
}

/// A received frame that does not decode to a known message. The frame is
/// discarded and the session keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame does not match any known message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("cell index {0} is outside the board")]
    CellOutOfRange(u8),
}
