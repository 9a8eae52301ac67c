//! Commonly used types and utilities for ease of import.

pub use crate::channel::{Channel, MemoryChannel, TcpChannel};
pub use crate::config::NegotiatorConfig;
pub use crate::descriptor::{Candidate, SessionDescriptor};
pub use crate::error::{DescriptorError, NegotiationError, ProtocolError};
pub use crate::game::{GameState, Outcome, Role, Symbol, TurnOwner};
pub use crate::negotiator::{ConnectionNegotiator, NegotiationState};
pub use crate::protocol::Frame;
pub use crate::session::{
    ConnectionStatus, Session, SessionEvent, SessionHandle, SessionSnapshot,
};
