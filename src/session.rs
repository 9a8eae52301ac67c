//! The session layer: typed messages over an established channel, applied
//! to one peer's copy of the shared game.
//!
//! A session runs as a single task owning the channel, the game state and
//! the identity pair. Frames and caller commands are handled one at a time
//! in arrival order, so no mutation races another; the two peers converge
//! because both apply the same accepted messages, not because anything is
//! shared. Callers talk to the task through a [`SessionHandle`].

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::game::{Board, GameState, Outcome, Role, Symbol, TurnOwner};
use crate::protocol::Frame;

/// Coarse connection status, mirrored to the caller for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Negotiating,
    Connected,
    Disconnected,
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ConnectionStatus::Negotiating => "negotiating",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        write!(f, "{}", name)
    }
}

/// Display names of the two peers. The remote name stays unset until the
/// peer's introduction frame arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    pub local_name: String,
    pub remote_name: Option<String>,
}

/// State changes surfaced to the caller, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    LocalMoveApplied { idx: u8, sym: Symbol },
    RemoteMoveApplied { idx: u8, sym: Symbol },
    IdentityChanged { local_name: String, remote_name: Option<String> },
    /// Fired when the outcome leaves `InProgress`, once per game until a
    /// reset starts the next one.
    OutcomeChanged(Outcome),
    ResetApplied,
}

/// A point-in-time copy of everything a caller can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub role: Role,
    pub board: Board,
    pub turn: TurnOwner,
    pub outcome: Outcome,
    pub local_name: String,
    pub remote_name: Option<String>,
    pub connected: bool,
}

enum SessionCommand {
    SubmitMove(u8),
    RequestReset,
    SetName(String),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Caller's side of a running session.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionHandle {
    /// Attempt a move in the given cell. Violating turn order or picking an
    /// occupied cell is a silent no-op, exactly like a dead click in a UI.
    pub async fn submit_move(&self, idx: u8) -> anyhow::Result<()> {
        self.send_command(SessionCommand::SubmitMove(idx)).await
    }

    /// Clear the game on both peers and start over.
    pub async fn request_reset(&self) -> anyhow::Result<()> {
        self.send_command(SessionCommand::RequestReset).await
    }

    /// Change the local display name and re-introduce it to the peer.
    pub async fn set_name(&self, name: String) -> anyhow::Result<()> {
        self.send_command(SessionCommand::SetName(name)).await
    }

    /// Observe the current state. Commands are processed in order, so a
    /// snapshot taken after a submit reflects that submit.
    pub async fn snapshot(&self) -> anyhow::Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send_command(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| anyhow::anyhow!("Session ended"))
    }

    /// Stop the session task. The channel drops with it.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
    }

    /// Next state change, or `None` once the session has ended.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    async fn send_command(&self, command: SessionCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("Session ended"))
    }
}

/// What one iteration of the session loop woke up for.
enum Step {
    Frame(anyhow::Result<String>),
    Command(Option<SessionCommand>),
}

/// The session task itself: one channel, one game, one identity pair.
pub struct Session {
    channel: Box<dyn Channel>,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    game: GameState,
    identity: PeerIdentity,
    last_outcome: Outcome,
    connected: bool,
}

impl Session {
    /// Attach to an established channel and start the session task. The
    /// introduction frame goes out immediately; everything after that is
    /// driven by frames and handle commands.
    pub fn spawn(channel: Box<dyn Channel>, role: Role, local_name: String) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let session = Session {
            channel,
            commands: command_rx,
            events: event_tx,
            game: GameState::new(role),
            identity: PeerIdentity {
                local_name,
                remote_name: None,
            },
            last_outcome: Outcome::InProgress,
            connected: true,
        };
        tokio::spawn(session.run());
        SessionHandle {
            commands: command_tx,
            events: event_rx,
        }
    }

    async fn run(mut self) {
        self.emit(SessionEvent::Status(ConnectionStatus::Connected));
        let intro = Frame::Intro {
            name: self.identity.local_name.clone(),
        };
        self.send_frame(&intro).await;

        loop {
            let step = tokio::select! {
                frame = self.channel.recv(), if self.connected => Step::Frame(frame),
                command = self.commands.recv() => Step::Command(command),
            };
            match step {
                Step::Frame(Ok(raw)) => self.handle_frame(&raw),
                Step::Frame(Err(e)) => {
                    debug!("channel lost: {e}");
                    self.emit_disconnected();
                }
                Step::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                // Every handle is gone; nobody is left to observe us.
                Step::Command(None) => break,
            }
        }
    }

    /// Apply one received frame. Malformed frames are dropped and logged;
    /// they never end the session.
    fn handle_frame(&mut self, raw: &str) {
        match Frame::decode(raw) {
            Ok(Frame::Move { idx, sym }) => {
                self.game.apply_remote(idx, sym);
                self.emit(SessionEvent::RemoteMoveApplied { idx, sym });
                self.emit_outcome_change();
            }
            Ok(Frame::Intro { name }) => {
                self.identity.remote_name = Some(name);
                self.emit(SessionEvent::IdentityChanged {
                    local_name: self.identity.local_name.clone(),
                    remote_name: self.identity.remote_name.clone(),
                });
            }
            Ok(Frame::Reset) => {
                // Applied without retransmitting, else two peers would
                // bounce resets at each other forever.
                self.game.reset();
                self.last_outcome = Outcome::InProgress;
                self.emit(SessionEvent::ResetApplied);
            }
            Err(e) => warn!("dropping frame: {e}"),
        }
    }

    /// Returns false when the session should stop.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::SubmitMove(idx) => {
                if !self.connected {
                    debug!(idx, "move ignored, channel closed");
                    return true;
                }
                match self.game.submit_local(idx) {
                    Ok(sym) => {
                        self.send_frame(&Frame::Move { idx, sym }).await;
                        self.emit(SessionEvent::LocalMoveApplied { idx, sym });
                        self.emit_outcome_change();
                    }
                    // Click-guard semantics: rejected attempts change nothing
                    // and surface no error.
                    Err(reason) => debug!(idx, %reason, "move ignored"),
                }
                true
            }
            SessionCommand::RequestReset => {
                if !self.connected {
                    debug!("reset ignored, channel closed");
                    return true;
                }
                self.game.reset();
                self.last_outcome = Outcome::InProgress;
                self.send_frame(&Frame::Reset).await;
                self.emit(SessionEvent::ResetApplied);
                true
            }
            SessionCommand::SetName(name) => {
                if !self.connected {
                    debug!("rename ignored, channel closed");
                    return true;
                }
                self.identity.local_name = name;
                self.send_frame(&Frame::Intro {
                    name: self.identity.local_name.clone(),
                })
                .await;
                self.emit(SessionEvent::IdentityChanged {
                    local_name: self.identity.local_name.clone(),
                    remote_name: self.identity.remote_name.clone(),
                });
                true
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
                true
            }
            SessionCommand::Shutdown => false,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            role: self.game.role(),
            board: *self.game.board(),
            turn: self.game.turn(),
            outcome: self.game.outcome(),
            local_name: self.identity.local_name.clone(),
            remote_name: self.identity.remote_name.clone(),
            connected: self.connected,
        }
    }

    async fn send_frame(&mut self, frame: &Frame) {
        if !self.connected {
            debug!("frame not sent, channel closed");
            return;
        }
        let encoded = match frame.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("frame encode failed: {e}");
                return;
            }
        };
        if let Err(e) = self.channel.send(&encoded).await {
            debug!("send failed: {e}");
            self.emit_disconnected();
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Fire the outcome event when a game just finished. Exactly once per
    /// finished game: repeated evaluation of the same terminal board is
    /// suppressed until a reset.
    fn emit_outcome_change(&mut self) {
        let outcome = self.game.outcome();
        if outcome != Outcome::InProgress && outcome != self.last_outcome {
            self.last_outcome = outcome;
            self.emit(SessionEvent::OutcomeChanged(outcome));
        }
    }

    /// Idempotent: the disconnected status is delivered at most once no
    /// matter how many times the channel signals failure.
    fn emit_disconnected(&mut self) {
        if self.connected {
            self.connected = false;
            self.emit(SessionEvent::Status(ConnectionStatus::Disconnected));
        }
    }
}
