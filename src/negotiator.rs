//! Manual-signaling connection negotiation.
//!
//! Two peers that can pass two text blobs to each other out of band (chat,
//! email, a clipboard) end up with one reliable bidirectional channel and
//! no server in between. The initiator exports an offer listing every
//! address it can be reached at, the responder answers with its own list,
//! and from there both sides race: each dials all of the other's candidates
//! while accepting inbound dials on its own listener. The initiator picks
//! the first connection that proves viable and nominates it with a final
//! preamble frame; every other connection is torn down.
//!
//! The responder starts racing as soon as it produces its answer, which may
//! be long before the initiator has the answer pasted in. Its dials sit in
//! the initiator's accept backlog until then, so the slow human step costs
//! nothing beyond waiting.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::channel::{Channel, TcpChannel};
use crate::config::NegotiatorConfig;
use crate::descriptor::{Candidate, DescriptorKind, SessionDescriptor};
use crate::error::NegotiationError;
use crate::game::Role;
use crate::reflector;

/// Where a negotiator is in its lifecycle. Channel establishment is not a
/// state here: descriptor readiness and the channel-open signal progress
/// independently, and the latter is delivered by [`ConnectionNegotiator::wait_channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    GatheringLocal,
    AwaitingRemoteAnswer,
    Complete,
    Failed,
}

impl core::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            NegotiationState::Idle => "idle",
            NegotiationState::GatheringLocal => "gathering-local",
            NegotiationState::AwaitingRemoteAnswer => "awaiting-remote-answer",
            NegotiationState::Complete => "complete",
            NegotiationState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Frames exchanged on a fresh connection before it may carry application
/// traffic. The dialing side speaks first. The initiator nominates exactly
/// one connection per session: `confirm` when its own dial was acknowledged,
/// `ack` when the responder dialed in. A connection that never receives its
/// nomination frame is simply closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Preamble {
    Hello { session: u64, role: Role },
    Ack { session: u64 },
    Confirm { session: u64 },
}

impl Preamble {
    fn encode(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    async fn recv(channel: &mut TcpChannel) -> anyhow::Result<Preamble> {
        let raw = channel.recv().await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// A preamble-approved connection reported by a worker to the commit loop.
enum Viable {
    /// We dialed the peer and it acknowledged our hello.
    Outbound(TcpChannel),
    /// The peer dialed us. For the responder this also means the
    /// nomination frame already arrived.
    Inbound(TcpChannel),
}

impl Viable {
    fn into_channel(self) -> TcpChannel {
        match self {
            Viable::Outbound(ch) | Viable::Inbound(ch) => ch,
        }
    }
}

/// Drives the manual signaling handshake for one session.
///
/// One instance per peer per session. The typical initiator flow is
/// `begin_as_initiator` → hand the offer blob to the other human →
/// `complete_as_initiator` with the pasted answer → `wait_channel`.
/// The responder flow is `begin_as_responder` with the pasted offer →
/// hand back the answer blob → `wait_channel`.
pub struct ConnectionNegotiator {
    config: NegotiatorConfig,
    state: NegotiationState,
    role: Option<Role>,
    session: Option<u64>,
    listener: Option<TcpListener>,
    establishment: Option<JoinHandle<()>>,
    ready: Option<oneshot::Receiver<Result<TcpChannel, NegotiationError>>>,
}

impl ConnectionNegotiator {
    pub fn new(config: NegotiatorConfig) -> Self {
        Self {
            config,
            state: NegotiationState::Idle,
            role: None,
            session: None,
            listener: None,
            establishment: None,
            ready: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Session id shared by both descriptors, once known.
    pub fn session_id(&self) -> Option<u64> {
        self.session
    }

    /// Start a session as the offering side. Gathers local candidates and
    /// resolves with the offer blob once the candidate set is final; the
    /// blob must then reach the other peer out of band.
    pub async fn begin_as_initiator(&mut self) -> Result<SessionDescriptor, NegotiationError> {
        self.ensure_state("begin_as_initiator", NegotiationState::Idle)?;
        self.role = Some(Role::Initiator);
        let (listener, candidates) = self.gather_bounded().await?;

        let session: u64 = rand::random();
        let offer = SessionDescriptor::offer(session, candidates);
        info!(session = format_args!("{:#018x}", session), "offer ready");

        self.session = Some(session);
        self.listener = Some(listener);
        self.state = NegotiationState::AwaitingRemoteAnswer;
        Ok(offer)
    }

    /// Ingest the responder's answer and start establishing the channel.
    /// On a malformed or mismatched blob the state is untouched, so the
    /// caller can ask the human to paste again.
    pub async fn complete_as_initiator(&mut self, answer_blob: &str) -> Result<(), NegotiationError> {
        self.ensure_state("complete_as_initiator", NegotiationState::AwaitingRemoteAnswer)?;
        let session = self.session.ok_or(NegotiationError::InvalidState {
            op: "complete_as_initiator",
            state: self.state,
        })?;

        let answer = SessionDescriptor::from_blob(answer_blob)?;
        answer.ensure_kind(DescriptorKind::Answer)?;
        answer.ensure_session(session)?;

        let listener = self.listener.take().ok_or(NegotiationError::InvalidState {
            op: "complete_as_initiator",
            state: self.state,
        })?;
        self.spawn_establishment(Role::Initiator, session, listener, answer.candidates);
        self.state = NegotiationState::Complete;
        Ok(())
    }

    /// Start a session as the answering side: ingest the pasted offer,
    /// gather local candidates and resolve with the answer blob. Channel
    /// establishment begins immediately; the initiator will catch up once
    /// the answer reaches it.
    pub async fn begin_as_responder(
        &mut self,
        offer_blob: &str,
    ) -> Result<SessionDescriptor, NegotiationError> {
        self.ensure_state("begin_as_responder", NegotiationState::Idle)?;
        // Parse before any state change so a bad paste leaves us in Idle.
        let offer = SessionDescriptor::from_blob(offer_blob)?;
        offer.ensure_kind(DescriptorKind::Offer)?;

        self.role = Some(Role::Responder);
        let (listener, candidates) = self.gather_bounded().await?;

        let session = offer.session;
        let answer = SessionDescriptor::answer(session, candidates);
        info!(session = format_args!("{:#018x}", session), "answer ready");

        self.session = Some(session);
        self.spawn_establishment(Role::Responder, session, listener, offer.candidates);
        self.state = NegotiationState::Complete;
        Ok(answer)
    }

    /// Resolve to the established channel. Resolves exactly once per
    /// successful negotiation; calling again, or calling before the
    /// descriptor exchange reached it, is an [`NegotiationError::InvalidState`].
    pub async fn wait_channel(&mut self) -> Result<Box<dyn Channel>, NegotiationError> {
        let ready = self.ready.take().ok_or(NegotiationError::InvalidState {
            op: "wait_channel",
            state: self.state,
        })?;
        let open_timeout = self.config.open_timeout;
        match timeout(open_timeout, ready).await {
            Ok(Ok(Ok(channel))) => {
                if let Ok(peer) = channel.peer_addr() {
                    info!(%peer, "channel open");
                }
                Ok(Box::new(channel))
            }
            Ok(Ok(Err(e))) => Err(e),
            // The establishment task went away without reporting.
            Ok(Err(_)) => Err(NegotiationError::Exhausted),
            Err(_) => {
                if let Some(task) = &self.establishment {
                    task.abort();
                }
                Err(NegotiationError::OpenTimedOut(open_timeout))
            }
        }
    }

    fn ensure_state(
        &self,
        op: &'static str,
        expected: NegotiationState,
    ) -> Result<(), NegotiationError> {
        if self.state != expected {
            return Err(NegotiationError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    async fn gather_bounded(&mut self) -> Result<(TcpListener, Vec<Candidate>), NegotiationError> {
        self.state = NegotiationState::GatheringLocal;
        match timeout(self.config.gather_timeout, gather(&self.config)).await {
            Ok(Ok(gathered)) => Ok(gathered),
            Ok(Err(e)) => {
                self.state = NegotiationState::Failed;
                Err(e)
            }
            Err(_) => {
                self.state = NegotiationState::Failed;
                Err(NegotiationError::GatheringTimedOut(self.config.gather_timeout))
            }
        }
    }

    fn spawn_establishment(
        &mut self,
        role: Role,
        session: u64,
        listener: TcpListener,
        remote_candidates: Vec<Candidate>,
    ) {
        let dial_timeout = self.config.dial_timeout;
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let result = establish(role, session, listener, remote_candidates, dial_timeout).await;
            let _ = tx.send(result);
        });
        self.establishment = Some(task);
        self.ready = Some(rx);
    }
}

impl Drop for ConnectionNegotiator {
    fn drop(&mut self) {
        // Abandoning a negotiation tears the racing connections down.
        if let Some(task) = &self.establishment {
            task.abort();
        }
    }
}

/// Bind the listener and collect the candidate addresses to advertise.
async fn gather(config: &NegotiatorConfig) -> Result<(TcpListener, Vec<Candidate>), NegotiationError> {
    let listener = TcpListener::bind(config.bind.as_str()).await?;
    let local = listener.local_addr()?;
    let port = local.port();

    let mut candidates = Vec::new();
    if local.ip().is_unspecified() {
        // Bound on every interface: advertise the primary one, then loopback
        // for the same-host case.
        match reflector::primary_local_ip().await {
            Ok(ip) => candidates.push(Candidate::host(SocketAddr::new(ip, port))),
            Err(e) => debug!("primary interface lookup failed: {e}"),
        }
        let loopback: IpAddr = match local.ip() {
            IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        };
        candidates.push(Candidate::host(SocketAddr::new(loopback, port)));
    } else {
        candidates.push(Candidate::host(local));
    }

    if let Some(server) = config.reflector.as_deref() {
        match reflector::reflect(server, config.reflection_timeout).await {
            Ok(observed) => {
                // The reflection round trip maps our UDP socket; assume the
                // listener is visible at the same address and keep its port.
                let addr = SocketAddr::new(observed.ip(), port);
                if !candidates.iter().any(|c| c.addr == addr) {
                    candidates.push(Candidate::reflexive(addr));
                }
            }
            Err(e) => debug!("reflection via {server} failed: {e}"),
        }
    }

    debug!(?candidates, "gathering complete");
    Ok((listener, candidates))
}

/// Race every path to the peer and return the one committed connection.
///
/// Runs until nomination lands or the caller gives up and aborts it;
/// the surrounding open timeout is the only deadline.
async fn establish(
    role: Role,
    session: u64,
    listener: TcpListener,
    remote_candidates: Vec<Candidate>,
    dial_timeout: Duration,
) -> Result<TcpChannel, NegotiationError> {
    let (viable_tx, mut viable_rx) = mpsc::channel::<Viable>(8);
    let mut workers = JoinSet::new();

    for candidate in remote_candidates {
        let tx = viable_tx.clone();
        workers.spawn(dial_worker(role, session, candidate, dial_timeout, tx));
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let tx = viable_tx.clone();
                        workers.spawn(accept_worker(role, session, stream, peer, dial_timeout, tx));
                    }
                    Err(e) => debug!("accept failed: {e}"),
                }
            }
            viable = viable_rx.recv() => {
                // The loop holds a sender, so recv cannot return None.
                if let Some(viable) = viable {
                    if let Some(channel) = commit(role, session, viable).await {
                        return Ok(channel);
                    }
                }
            }
        }
    }
}

/// Nominate a viable connection. On the initiator this transmits the single
/// nomination frame for the whole session; a `None` return means the
/// connection died first and the race continues.
async fn commit(role: Role, session: u64, viable: Viable) -> Option<TcpChannel> {
    match role {
        Role::Responder => Some(viable.into_channel()),
        Role::Initiator => {
            let nomination = match &viable {
                Viable::Outbound(_) => Preamble::Confirm { session },
                Viable::Inbound(_) => Preamble::Ack { session },
            };
            let mut channel = viable.into_channel();
            let sent = async {
                let frame = nomination.encode()?;
                channel.send(&frame).await
            };
            match sent.await {
                Ok(()) => Some(channel),
                Err(e) => {
                    debug!("nomination failed: {e}");
                    None
                }
            }
        }
    }
}

/// Dial one remote candidate and see the preamble through to viability.
async fn dial_worker(
    role: Role,
    session: u64,
    candidate: Candidate,
    dial_timeout: Duration,
    viable: mpsc::Sender<Viable>,
) {
    let addr = candidate.addr;
    let stream = match timeout(dial_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(%addr, "dial failed: {e}");
            return;
        }
        Err(_) => {
            debug!(%addr, "dial timed out");
            return;
        }
    };
    debug!(%addr, "candidate connected");

    let mut channel = TcpChannel::new(stream);
    let hello = Preamble::Hello { session, role };
    let greeted = async {
        let frame = hello.encode()?;
        channel.send(&frame).await
    };
    if let Err(e) = greeted.await {
        debug!(%addr, "hello failed: {e}");
        return;
    }

    // The initiator's hello is acknowledged as soon as the responder sees
    // it, so a bounded wait suffices. The responder's hello is only ever
    // acknowledged by the nomination, which waits on a human pasting the
    // answer; that wait must stay unbounded here.
    let reply = match role {
        Role::Initiator => match timeout(dial_timeout, Preamble::recv(&mut channel)).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(%addr, "no acknowledgement in time");
                return;
            }
        },
        Role::Responder => Preamble::recv(&mut channel).await,
    };
    match reply {
        Ok(Preamble::Ack { session: s }) if s == session => {
            let _ = viable.send(Viable::Outbound(channel)).await;
        }
        Ok(other) => debug!(%addr, ?other, "unexpected preamble reply"),
        Err(e) => debug!(%addr, "preamble reply failed: {e}"),
    }
}

/// Vet one inbound connection: check its hello, then either report it
/// (initiator side) or acknowledge and wait for nomination (responder side).
async fn accept_worker(
    role: Role,
    session: u64,
    stream: TcpStream,
    peer: SocketAddr,
    dial_timeout: Duration,
    viable: mpsc::Sender<Viable>,
) {
    let mut channel = TcpChannel::new(stream);
    let hello = match timeout(dial_timeout, Preamble::recv(&mut channel)).await {
        Ok(Ok(hello)) => hello,
        Ok(Err(e)) => {
            debug!(%peer, "inbound preamble failed: {e}");
            return;
        }
        Err(_) => {
            debug!(%peer, "inbound connection said nothing");
            return;
        }
    };
    match hello {
        Preamble::Hello { session: s, role: r } if s == session && r == role.peer() => {}
        other => {
            debug!(%peer, ?other, "unexpected inbound preamble");
            return;
        }
    }

    match role {
        Role::Initiator => {
            // Viable; the commit loop decides whether to acknowledge it.
            let _ = viable.send(Viable::Inbound(channel)).await;
        }
        Role::Responder => {
            let acked = async {
                let frame = Preamble::Ack { session }.encode()?;
                channel.send(&frame).await
            };
            if let Err(e) = acked.await {
                debug!(%peer, "acknowledgement failed: {e}");
                return;
            }
            // Unbounded: nomination arrives only after the initiator's
            // human pastes the answer in.
            match Preamble::recv(&mut channel).await {
                Ok(Preamble::Confirm { session: s }) if s == session => {
                    let _ = viable.send(Viable::Inbound(channel)).await;
                }
                Ok(other) => debug!(%peer, ?other, "expected nomination"),
                Err(e) => debug!(%peer, "nomination never arrived: {e}"),
            }
        }
    }
}
