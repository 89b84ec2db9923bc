use crate::error::ClientError;
use crate::media::{LocalMedia, RemoteTrack};
use crate::mesh::LinkState;
use crate::signaling::SignalingOutput;
use crate::transport::{ConnectionState, PeerTransport, TransportEvent, TransportFactory};
use meshcall_core::{IceCandidate, NegotiationRole, ParticipantId, SessionDescription};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const TRANSPORT_EVENT_CAPACITY: usize = 256;

/// Remote negotiation input routed to one link.
#[derive(Debug)]
pub(crate) enum LinkCommand {
    RemoteOffer(SessionDescription),
    RemoteAnswer(SessionDescription),
    RemoteCandidate(IceCandidate),
}

/// What a link tells the coordinator. Reports carry the generation of the
/// link that produced them so the coordinator can drop those of links it
/// already replaced.
#[derive(Debug)]
pub(crate) struct LinkReport {
    pub remote: ParticipantId,
    pub generation: u64,
    pub kind: LinkReportKind,
}

#[derive(Debug)]
pub(crate) enum LinkReportKind {
    State(LinkState),
    Transport(ConnectionState),
    Track(RemoteTrack),
    /// The link has stopped and will not recover by itself.
    Failed(ClientError),
}

pub(crate) struct LinkParams {
    pub local: ParticipantId,
    pub remote: ParticipantId,
    pub generation: u64,
    pub factory: Arc<dyn TransportFactory>,
    pub media: LocalMedia,
    pub signaling: Arc<dyn SignalingOutput>,
    pub reports: mpsc::UnboundedSender<LinkReport>,
}

/// Owner side of a running link task.
pub(crate) struct LinkHandle {
    generation: u64,
    commands: mpsc::UnboundedSender<LinkCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LinkHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, cmd: LinkCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("Link task already finished, command dropped");
        }
    }

    /// Signals the link to stop right away. The returned future resolves
    /// once its transport is closed. Any step still in flight is abandoned.
    pub fn close(mut self) -> impl Future<Output = ()> + Send + 'static {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        async move {
            if let Err(e) = self.task.await {
                if e.is_panic() {
                    warn!("Link task panicked: {}", e);
                }
            }
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Negotiation state machine for one remote participant.
struct PeerLink {
    remote: ParticipantId,
    generation: u64,
    role: NegotiationRole,
    state: LinkState,
    signaling: Arc<dyn SignalingOutput>,
    reports: mpsc::UnboundedSender<LinkReport>,
    offer_sent: bool,
    remote_applied: bool,
    /// Remote candidates that arrived before the remote description.
    pending_candidates: Vec<IceCandidate>,
}

pub(crate) fn spawn_link(params: LinkParams) -> LinkHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let link = PeerLink {
        role: NegotiationRole::for_pair(&params.local, &params.remote),
        remote: params.remote,
        generation: params.generation,
        state: LinkState::Idle,
        signaling: params.signaling,
        reports: params.reports,
        offer_sent: false,
        remote_applied: false,
        pending_candidates: Vec::new(),
    };
    let task = tokio::spawn(link.run(params.factory, params.media, command_rx, shutdown_rx));

    LinkHandle {
        generation: params.generation,
        commands: command_tx,
        shutdown: Some(shutdown_tx),
        task,
    }
}

fn negotiation(err: anyhow::Error) -> ClientError {
    ClientError::Negotiation(format!("{err:#}"))
}

impl PeerLink {
    async fn run(
        mut self,
        factory: Arc<dyn TransportFactory>,
        media: LocalMedia,
        mut commands: mpsc::UnboundedReceiver<LinkCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        debug!(
            "Link to {} started (generation {}, {:?})",
            self.remote, self.generation, self.role
        );
        let (transport_tx, mut transport_rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);

        let created = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            created = factory.create(&self.remote, &media, transport_tx) => created,
        };
        let transport = match created {
            Ok(transport) => transport,
            Err(e) => {
                self.fail(ClientError::TransportFailure(format!("{e:#}")));
                return;
            }
        };

        if self.role.is_initiator() {
            let started = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                r = self.start_offer(&*transport) => Some(r),
            };
            match started {
                Some(Ok(())) => {
                    self.event_loop(&*transport, &mut commands, &mut transport_rx, &mut shutdown)
                        .await
                }
                Some(Err(e)) => self.fail(e),
                None => {}
            }
        } else {
            self.event_loop(&*transport, &mut commands, &mut transport_rx, &mut shutdown)
                .await;
        }

        if let Err(e) = transport.close().await {
            debug!("Error closing transport to {}: {:#}", self.remote, e);
        }
        debug!(
            "Link to {} finished (generation {})",
            self.remote, self.generation
        );
    }

    async fn event_loop(
        &mut self,
        transport: &dyn PeerTransport,
        commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
        transport_rx: &mut mpsc::Receiver<TransportEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut *shutdown => break,
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    // Negotiation steps race the shutdown signal so a leave
                    // never waits on a stalled transport.
                    let outcome = tokio::select! {
                        biased;
                        _ = &mut *shutdown => None,
                        r = self.handle_command(transport, cmd) => Some(r),
                    };
                    match outcome {
                        Some(Ok(())) => {}
                        None => break,
                        Some(Err(e)) => {
                            self.fail(e);
                            break;
                        }
                    }
                }
                evt = transport_rx.recv() => {
                    let Some(evt) = evt else { break };
                    if let Flow::Stop = self.handle_transport_event(evt).await {
                        break;
                    }
                }
            }
        }
    }

    async fn start_offer(&mut self, transport: &dyn PeerTransport) -> Result<(), ClientError> {
        self.set_state(LinkState::Negotiating);
        let offer = transport.create_offer().await.map_err(negotiation)?;
        transport
            .set_local_description(offer.clone())
            .await
            .map_err(negotiation)?;
        self.offer_sent = true;
        self.signaling.send_offer(&self.remote, &offer).await
    }

    async fn handle_command(
        &mut self,
        transport: &dyn PeerTransport,
        cmd: LinkCommand,
    ) -> Result<(), ClientError> {
        match cmd {
            LinkCommand::RemoteOffer(offer) => self.accept_offer(transport, offer).await,
            LinkCommand::RemoteAnswer(answer) => self.accept_answer(transport, answer).await,
            LinkCommand::RemoteCandidate(candidate) => {
                self.add_candidate(transport, candidate).await;
                Ok(())
            }
        }
    }

    async fn accept_offer(
        &mut self,
        transport: &dyn PeerTransport,
        offer: SessionDescription,
    ) -> Result<(), ClientError> {
        if self.role.is_initiator() {
            warn!("Ignoring offer from {}: we are the initiator", self.remote);
            return Ok(());
        }
        // Renegotiation is done by replacing the link, never in place.
        if self.remote_applied {
            debug!("Ignoring repeated offer from {}", self.remote);
            return Ok(());
        }

        self.set_state(LinkState::Negotiating);
        transport
            .set_remote_description(offer)
            .await
            .map_err(negotiation)?;
        self.remote_applied = true;
        self.flush_candidates(transport).await;

        let answer = transport.create_answer().await.map_err(negotiation)?;
        transport
            .set_local_description(answer.clone())
            .await
            .map_err(negotiation)?;
        self.signaling.send_answer(&self.remote, &answer).await
    }

    async fn accept_answer(
        &mut self,
        transport: &dyn PeerTransport,
        answer: SessionDescription,
    ) -> Result<(), ClientError> {
        let expected = self.role.is_initiator()
            && self.offer_sent
            && !self.remote_applied
            && self.state == LinkState::Negotiating;
        if !expected {
            debug!(
                "Ignoring stale answer from {} in state {:?}",
                self.remote, self.state
            );
            return Ok(());
        }

        transport
            .set_remote_description(answer)
            .await
            .map_err(negotiation)?;
        self.remote_applied = true;
        self.flush_candidates(transport).await;
        Ok(())
    }

    async fn add_candidate(&mut self, transport: &dyn PeerTransport, candidate: IceCandidate) {
        if !self.remote_applied {
            debug!("Buffering early candidate from {}", self.remote);
            self.pending_candidates.push(candidate);
            return;
        }
        if let Err(e) = transport.add_ice_candidate(candidate).await {
            warn!("Failed to add ICE candidate from {}: {:#}", self.remote, e);
        }
    }

    async fn flush_candidates(&mut self, transport: &dyn PeerTransport) {
        let pending = std::mem::take(&mut self.pending_candidates);
        if !pending.is_empty() {
            debug!(
                "Applying {} buffered candidates from {}",
                pending.len(),
                self.remote
            );
        }
        for candidate in pending {
            self.add_candidate(transport, candidate).await;
        }
    }

    async fn handle_transport_event(&mut self, evt: TransportEvent) -> Flow {
        match evt {
            TransportEvent::CandidateGenerated(candidate) => {
                if let Err(e) = self.signaling.send_ice(&self.remote, &candidate).await {
                    warn!("Failed to send ICE candidate to {}: {}", self.remote, e);
                }
                Flow::Continue
            }
            TransportEvent::StateChanged(state) => {
                self.report(LinkReportKind::Transport(state));
                match state {
                    ConnectionState::Connected => {
                        self.set_state(LinkState::Connected);
                        Flow::Continue
                    }
                    ConnectionState::Failed => {
                        self.fail(ClientError::TransportFailure("ICE connection failed".into()));
                        Flow::Stop
                    }
                    ConnectionState::Closed => {
                        self.fail(ClientError::TransportFailure(
                            "connection closed by transport".into(),
                        ));
                        Flow::Stop
                    }
                    // Disconnected may recover on its own.
                    _ => Flow::Continue,
                }
            }
            TransportEvent::TrackAdded(track) => {
                self.report(LinkReportKind::Track(track));
                Flow::Continue
            }
        }
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            self.state = state;
            self.report(LinkReportKind::State(state));
        }
    }

    fn fail(&mut self, err: ClientError) {
        warn!("Link to {} failed: {}", self.remote, err);
        self.state = LinkState::Failed;
        self.report(LinkReportKind::Failed(err));
    }

    fn report(&self, kind: LinkReportKind) {
        let _ = self.reports.send(LinkReport {
            remote: self.remote.clone(),
            generation: self.generation,
            kind,
        });
    }
}
