//! Wire frames exchanged over an established channel.
//!
//! One JSON object per frame, one frame per message. The shapes on the wire:
//!
//! ```text
//! {"type":"move","idx":4,"sym":"X"}
//! {"type":"intro","name":"alice"}
//! {"type":"reset"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::game::{Symbol, CELL_COUNT};

/// Application-level messages. `Move` carries the sender's symbol explicitly
/// rather than leaving the receiver to infer it from role parity, which keeps
/// the frames meaningful even if an introduction arrives late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// A move played by the sending peer.
    Move { idx: u8, sym: Symbol },
    /// Identity introduction, sent once when the channel opens.
    Intro { name: String },
    /// Clear the game back to its initial state. Never re-sent on receipt.
    Reset,
}

impl Frame {
    /// Serialize to a single-line text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a received text frame. Unknown shapes and out-of-board move
    /// indices are rejected so the session can drop them and keep running.
    pub fn decode(raw: &str) -> Result<Frame, ProtocolError> {
        let frame: Frame = serde_json::from_str(raw)?;
        if let Frame::Move { idx, .. } = frame {
            if idx >= CELL_COUNT {
                return Err(ProtocolError::CellOutOfRange(idx));
            }
        }
        Ok(frame)
    }
}
