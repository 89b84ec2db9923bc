use crate::config::MeshConfig;
use crate::error::{ClientError, Result};
use crate::media::{LocalMedia, RemoteTrack};
use crate::mesh::{LinkState, MeshCommand, MeshEvent, PeerSummary};
use crate::signaling::SignalingOutput;
use crate::transport::TransportFactory;
use meshcall_core::{
    IceCandidate, NegotiationRole, ParticipantId, ParticipantInfo, RelayedSignal,
    SessionDescription, SignalMessage,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::peer_link::{LinkCommand, LinkHandle, LinkParams, LinkReport, LinkReportKind, spawn_link};

struct ActiveLink {
    handle: LinkHandle,
    state: LinkState,
    /// Whether this link is included in the active peer count.
    counted: bool,
    /// Whether a remote offer was already handed to this link. A second one
    /// means the remote side rebuilt its end.
    offer_seen: bool,
}

enum PeerSlot {
    Active(ActiveLink),
    /// Waiting for the reconnect timer of the given generation.
    Reconnecting {
        generation: u64,
        timer: JoinHandle<()>,
    },
}

struct PeerEntry {
    info: ParticipantInfo,
    role: NegotiationRole,
    slot: PeerSlot,
    /// Failures since the last time a link reached `Connected`.
    failures: u32,
    tracks: Vec<RemoteTrack>,
}

impl PeerEntry {
    fn state(&self) -> LinkState {
        match &self.slot {
            PeerSlot::Active(link) => link.state,
            PeerSlot::Reconnecting { .. } => LinkState::Reconnecting,
        }
    }
}

/// Owns one link per remote participant and keeps the mesh in line with
/// the room membership reported by the relay.
///
/// All mutation happens on the coordinator task. Links, reconnect timers
/// and the session talk to it through channels only.
pub struct MeshCoordinator {
    local: ParticipantId,
    config: MeshConfig,
    signaling: Arc<dyn SignalingOutput>,
    factory: Arc<dyn TransportFactory>,
    media: LocalMedia,

    peers: HashMap<ParticipantId, PeerEntry>,
    next_generation: u64,
    /// Links told to stop whose transports are still closing.
    closing: JoinSet<()>,
    left: bool,

    command_rx: mpsc::UnboundedReceiver<MeshCommand>,
    report_tx: mpsc::UnboundedSender<LinkReport>,
    report_rx: mpsc::UnboundedReceiver<LinkReport>,
    timer_tx: mpsc::UnboundedSender<(ParticipantId, u64)>,
    timer_rx: mpsc::UnboundedReceiver<(ParticipantId, u64)>,

    events: broadcast::Sender<MeshEvent>,
    active: Arc<AtomicUsize>,
}

impl MeshCoordinator {
    /// Starts the coordinator task. It runs until every `MeshHandle` is
    /// dropped.
    pub fn spawn(
        local: ParticipantId,
        config: MeshConfig,
        signaling: Arc<dyn SignalingOutput>,
        factory: Arc<dyn TransportFactory>,
        media: LocalMedia,
    ) -> MeshHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let active = Arc::new(AtomicUsize::new(0));

        let coordinator = Self {
            local,
            config,
            signaling,
            factory,
            media,
            peers: HashMap::new(),
            next_generation: 0,
            closing: JoinSet::new(),
            left: false,
            command_rx,
            report_tx,
            report_rx,
            timer_tx,
            timer_rx,
            events: events.clone(),
            active: active.clone(),
        };
        tokio::spawn(coordinator.run());

        MeshHandle {
            commands: command_tx,
            events,
            active,
        }
    }

    async fn run(mut self) {
        info!("Mesh coordinator for {} started", self.local);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Command channel closed. Shutting down mesh.");
                            break;
                        }
                    }
                }

                Some(report) = self.report_rx.recv() => self.handle_report(report),

                Some((peer, generation)) = self.timer_rx.recv() => {
                    self.handle_reconnect_due(peer, generation)
                }

                Some(_) = self.closing.join_next(), if !self.closing.is_empty() => {}
            }
        }

        self.remove_all();
        self.drain_closing().await;
        info!("Mesh coordinator for {} finished", self.local);
    }

    async fn handle_command(&mut self, cmd: MeshCommand) {
        match cmd {
            MeshCommand::Signal(msg) if self.left => {
                debug!("Dropping {} received after leave", msg.kind())
            }
            MeshCommand::Signal(msg) => self.handle_signal(msg),
            MeshCommand::Peers { reply } => {
                let _ = reply.send(self.summaries());
            }
            MeshCommand::Leave { done } => {
                info!("Leaving call, closing {} links", self.peers.len());
                self.left = true;
                self.remove_all();
                self.drain_closing().await;
                let _ = done.send(());
            }
        }
    }

    fn handle_signal(&mut self, msg: SignalMessage) {
        match msg {
            SignalMessage::RoomMembership { users } => {
                for user in users {
                    self.add_peer(user);
                }
            }
            SignalMessage::ParticipantJoined { user } => self.add_peer(user),
            SignalMessage::ParticipantLeft { participant_id } => {
                self.remove_peer(&participant_id)
            }
            SignalMessage::Offer(signal) => {
                let Some((from, offer)) = parse_relayed(&signal, SessionDescription::from_payload)
                else {
                    return;
                };
                self.on_remote_offer(from, offer);
            }
            SignalMessage::Answer(signal) => {
                let Some((from, answer)) = parse_relayed(&signal, SessionDescription::from_payload)
                else {
                    return;
                };
                self.forward(&from, LinkCommand::RemoteAnswer(answer));
            }
            SignalMessage::IceCandidate(signal) => {
                let Some((from, candidate)) = parse_relayed(&signal, IceCandidate::from_payload)
                else {
                    return;
                };
                self.forward(&from, LinkCommand::RemoteCandidate(candidate));
            }
            SignalMessage::Error { message } => warn!("Relay reported an error: {}", message),
            other => debug!("Ignoring {} message in mesh", other.kind()),
        }
    }

    fn add_peer(&mut self, info: ParticipantInfo) {
        if info.id == self.local {
            return;
        }
        if self.peers.contains_key(&info.id) {
            debug!("Already linked to {}", info.id);
            return;
        }

        let role = NegotiationRole::for_pair(&self.local, &info.id);
        info!("Adding peer {} ({}) as {:?}", info.username, info.id, role);

        let link = self.open_link(&info.id);
        self.peers.insert(
            info.id.clone(),
            PeerEntry {
                info: info.clone(),
                role,
                slot: PeerSlot::Active(link),
                failures: 0,
                tracks: Vec::new(),
            },
        );
        self.emit(MeshEvent::PeerAdded { info, role });
    }

    fn remove_peer(&mut self, peer: &ParticipantId) {
        let Some(entry) = self.peers.remove(peer) else {
            debug!("Remove for unknown peer {}", peer);
            return;
        };
        info!("Removing peer {}", peer);
        self.retire(entry.slot);
        self.emit(MeshEvent::PeerRemoved { peer: peer.clone() });
    }

    fn remove_all(&mut self) {
        let peers: Vec<ParticipantId> = self.peers.keys().cloned().collect();
        for peer in peers {
            self.remove_peer(&peer);
        }
    }

    fn on_remote_offer(&mut self, from: ParticipantId, offer: SessionDescription) {
        let Some(entry) = self.peers.get_mut(&from) else {
            warn!("Offer from unknown participant {}", from);
            return;
        };
        if entry.role.is_initiator() {
            warn!("Ignoring offer from {}: we are the initiator", from);
            return;
        }
        match &mut entry.slot {
            PeerSlot::Active(link) if !link.offer_seen => {
                link.offer_seen = true;
                link.handle.send(LinkCommand::RemoteOffer(offer));
                return;
            }
            // Decided here, before anything else from the peer is routed, so
            // the candidates that follow reach the replacement link.
            PeerSlot::Active(_) => info!("New offer from {} supersedes the current link", from),
            // The remote side rebuilt first; no need to wait for our timer.
            PeerSlot::Reconnecting { .. } => {
                info!("Offer from {} while reconnecting, rebuilding now", from)
            }
        }
        self.restart_link(&from, Some(offer));
    }

    fn forward(&self, from: &ParticipantId, cmd: LinkCommand) {
        match self.peers.get(from).map(|entry| &entry.slot) {
            Some(PeerSlot::Active(link)) => link.handle.send(cmd),
            Some(PeerSlot::Reconnecting { .. }) => {
                debug!("Dropping {:?} from {}: link is being rebuilt", cmd, from)
            }
            None => debug!("Dropping signal from unknown participant {}", from),
        }
    }

    fn handle_report(&mut self, report: LinkReport) {
        let LinkReport {
            remote,
            generation,
            kind,
        } = report;

        let Some(entry) = self.peers.get_mut(&remote) else {
            debug!("Report for departed peer {}", remote);
            return;
        };
        let PeerSlot::Active(link) = &mut entry.slot else {
            debug!("Report for {} while reconnecting", remote);
            return;
        };
        if link.handle.generation() != generation {
            debug!("Dropping report from replaced link to {}", remote);
            return;
        }

        match kind {
            LinkReportKind::State(state) => {
                link.state = state;
                let newly_connected = state.is_connected() && !link.counted;
                if newly_connected {
                    link.counted = true;
                    entry.failures = 0;
                    self.active.fetch_add(1, Ordering::SeqCst);
                }
                self.emit(MeshEvent::PeerStateChanged {
                    peer: remote.clone(),
                    state,
                });
                if newly_connected {
                    info!("Connected to {}", remote);
                    self.emit(MeshEvent::PeerConnected { peer: remote });
                }
            }
            LinkReportKind::Transport(state) => {
                self.emit(MeshEvent::TransportStateChanged {
                    peer: remote,
                    state,
                });
            }
            LinkReportKind::Track(track) => {
                entry.tracks.push(track.clone());
                self.emit(MeshEvent::RemoteTrack {
                    peer: remote,
                    track,
                });
            }
            LinkReportKind::Failed(err) => self.on_link_failed(remote, err),
        }
    }

    fn on_link_failed(&mut self, remote: ParticipantId, err: ClientError) {
        let Some(mut entry) = self.peers.remove(&remote) else {
            return;
        };
        self.retire(entry.slot);
        entry.tracks.clear();
        entry.failures += 1;
        self.emit(MeshEvent::PeerStateChanged {
            peer: remote.clone(),
            state: LinkState::Failed,
        });

        let exhausted = entry.failures > self.config.max_reconnect_attempts;
        if exhausted || !err.is_link_recoverable() {
            warn!(
                "Giving up on {} after {} consecutive failures: {}",
                remote, entry.failures, err
            );
            self.emit(MeshEvent::PeerGaveUp {
                peer: remote.clone(),
                reason: err.to_string(),
            });
            self.emit(MeshEvent::PeerRemoved { peer: remote });
            return;
        }

        let generation = self.bump_generation();
        info!(
            "Reconnecting to {} in {:?} (attempt {}/{})",
            remote, self.config.reconnect_delay, entry.failures, self.config.max_reconnect_attempts
        );
        let timer_tx = self.timer_tx.clone();
        let delay = self.config.reconnect_delay;
        let peer = remote.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timer_tx.send((peer, generation));
        });

        entry.slot = PeerSlot::Reconnecting { generation, timer };
        self.peers.insert(remote.clone(), entry);
        self.emit(MeshEvent::PeerStateChanged {
            peer: remote,
            state: LinkState::Reconnecting,
        });
    }

    fn handle_reconnect_due(&mut self, peer: ParticipantId, generation: u64) {
        let due = matches!(
            self.peers.get(&peer).map(|entry| &entry.slot),
            Some(PeerSlot::Reconnecting { generation: g, .. }) if *g == generation
        );
        if !due {
            debug!("Stale reconnect timer for {}", peer);
            return;
        }
        info!("Rebuilding link to {}", peer);
        self.restart_link(&peer, None);
    }

    /// Replaces whatever the peer has now with a fresh link, optionally
    /// seeded with a remote offer.
    fn restart_link(&mut self, peer: &ParticipantId, offer: Option<SessionDescription>) {
        let Some(mut entry) = self.peers.remove(peer) else {
            return;
        };
        self.retire(entry.slot);
        entry.tracks.clear();

        let mut link = self.open_link(peer);
        if let Some(offer) = offer {
            link.offer_seen = true;
            link.handle.send(LinkCommand::RemoteOffer(offer));
        }
        entry.slot = PeerSlot::Active(link);
        self.peers.insert(peer.clone(), entry);
        self.emit(MeshEvent::PeerStateChanged {
            peer: peer.clone(),
            state: LinkState::Idle,
        });
    }

    fn open_link(&mut self, remote: &ParticipantId) -> ActiveLink {
        let generation = self.bump_generation();
        let handle = spawn_link(LinkParams {
            local: self.local.clone(),
            remote: remote.clone(),
            generation,
            factory: self.factory.clone(),
            media: self.media.clone(),
            signaling: self.signaling.clone(),
            reports: self.report_tx.clone(),
        });
        ActiveLink {
            handle,
            state: LinkState::Idle,
            counted: false,
            offer_seen: false,
        }
    }

    /// Stops a link or cancels a pending reconnect. The link's transport
    /// closes in the background; only leave waits for it.
    fn retire(&mut self, slot: PeerSlot) {
        match slot {
            PeerSlot::Active(link) => {
                if link.counted {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                }
                self.closing.spawn(link.handle.close());
            }
            PeerSlot::Reconnecting { timer, .. } => timer.abort(),
        }
    }

    async fn drain_closing(&mut self) {
        while let Some(res) = self.closing.join_next().await {
            if let Err(e) = res {
                warn!("Link shutdown task failed: {}", e);
            }
        }
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn summaries(&self) -> Vec<PeerSummary> {
        let mut peers: Vec<PeerSummary> = self
            .peers
            .values()
            .map(|entry| PeerSummary {
                info: entry.info.clone(),
                role: entry.role,
                state: entry.state(),
                tracks: entry.tracks.clone(),
            })
            .collect();
        peers.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        peers
    }

    fn emit(&self, event: MeshEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn parse_relayed<T>(
    signal: &RelayedSignal,
    parse: fn(&serde_json::Value) -> std::result::Result<T, serde_json::Error>,
) -> Option<(ParticipantId, T)> {
    let Some(from) = signal.from.clone() else {
        warn!("Relayed signal without sender, dropping");
        return None;
    };
    match parse(&signal.payload) {
        Ok(value) => Some((from, value)),
        Err(e) => {
            warn!("Malformed payload from {}: {}", from, e);
            None
        }
    }
}

/// Cloneable front of a running `MeshCoordinator`.
#[derive(Clone)]
pub struct MeshHandle {
    commands: mpsc::UnboundedSender<MeshCommand>,
    events: broadcast::Sender<MeshEvent>,
    active: Arc<AtomicUsize>,
}

impl MeshHandle {
    /// Hands an inbound signaling message to the coordinator.
    pub fn deliver(&self, msg: SignalMessage) -> Result<()> {
        self.commands
            .send(MeshCommand::Signal(msg))
            .map_err(|_| ClientError::Closed)
    }

    pub async fn peers(&self) -> Result<Vec<PeerSummary>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(MeshCommand::Peers { reply })
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Returns once every link is closed and no reconnect is pending.
    pub async fn leave(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(MeshCommand::Leave { done })
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    /// Number of peers whose current link has reached `Connected`.
    pub fn active_peers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}
