pub mod channel;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod game;
mod logging;
pub mod negotiator;
pub mod prelude;
pub mod protocol;
pub mod reflector;
pub mod session;

pub use channel::{Channel, MemoryChannel, TcpChannel};
pub use config::{NegotiatorConfig, DEFAULT_REFLECTOR};
pub use descriptor::{Candidate, CandidateKind, DescriptorKind, SessionDescriptor};
pub use error::{DescriptorError, NegotiationError, ProtocolError};
pub use game::*;
pub use logging::init_logging;
pub use negotiator::{ConnectionNegotiator, NegotiationState};
pub use protocol::Frame;
pub use session::*;
