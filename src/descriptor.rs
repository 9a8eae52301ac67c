//! Session descriptors: the text blobs peers hand each other out-of-band.
//!
//! A descriptor is one line of JSON naming the descriptor kind, a session id
//! shared by both sides, and every network candidate the peer can be reached
//! at. The initiator produces an offer, the responder answers it, and each
//! side dials the other's candidates in the order listed.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::DescriptorError;

/// Which negotiation phase produced the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    Offer,
    Answer,
}

impl core::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DescriptorKind::Offer => write!(f, "offer"),
            DescriptorKind::Answer => write!(f, "answer"),
        }
    }
}

/// How a candidate address was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    /// Bound directly on a local interface.
    Host,
    /// Observed from outside by a reflection service.
    Reflexive,
}

/// One address the descriptor's owner is listening on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub addr: SocketAddr,
}

impl Candidate {
    pub fn host(addr: SocketAddr) -> Self {
        Self {
            kind: CandidateKind::Host,
            addr,
        }
    }

    pub fn reflexive(addr: SocketAddr) -> Self {
        Self {
            kind: CandidateKind::Reflexive,
            addr,
        }
    }
}

/// One peer's serialized connection parameters at a point in negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub kind: DescriptorKind,
    /// Random id minted by the initiator; the answer must echo it, which
    /// catches an answer pasted in from some other negotiation.
    pub session: u64,
    /// Reachable addresses, most preferred first.
    pub candidates: Vec<Candidate>,
}

impl SessionDescriptor {
    pub fn offer(session: u64, candidates: Vec<Candidate>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            session,
            candidates,
        }
    }

    pub fn answer(session: u64, candidates: Vec<Candidate>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            session,
            candidates,
        }
    }

    /// Serialize to the single-line text form handed to the other peer.
    pub fn to_blob(&self) -> Result<String, DescriptorError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a pasted blob. Leading and trailing whitespace is forgiven
    /// since the blob usually arrives via clipboard.
    pub fn from_blob(raw: &str) -> Result<Self, DescriptorError> {
        let descriptor: SessionDescriptor = serde_json::from_str(raw.trim())?;
        if descriptor.candidates.is_empty() {
            return Err(DescriptorError::NoCandidates);
        }
        Ok(descriptor)
    }

    /// Reject a descriptor from the wrong negotiation phase.
    pub fn ensure_kind(&self, expected: DescriptorKind) -> Result<(), DescriptorError> {
        if self.kind != expected {
            return Err(DescriptorError::UnexpectedKind {
                expected,
                got: self.kind,
            });
        }
        Ok(())
    }

    /// Reject an answer minted for a different offer.
    pub fn ensure_session(&self, expected: u64) -> Result<(), DescriptorError> {
        if self.session != expected {
            return Err(DescriptorError::SessionMismatch {
                expected,
                got: self.session,
            });
        }
        Ok(())
    }
}
