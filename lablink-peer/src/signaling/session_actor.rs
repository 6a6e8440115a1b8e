use crate::config::SessionConfig;
use crate::error::{PeerLinkError, SessionError, SignalingError};
use crate::link::{LinkSignal, PeerLink};
use crate::signaling::rendezvous::{RendezvousChannel, RendezvousEvent};
use crate::signaling::role_strategy::RoleStrategy;
use crate::signaling::session::{SessionCommand, SessionEvent, SessionState};
use dashmap::DashMap;
use lablink_core::{IceCandidate, IceServerConfig, PeerId, Role, Signal, SignalMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Все, что нужно стратегиям роли для обработки сообщений.
pub(crate) struct SessionContext {
    pub role: Role,
    pub config: SessionConfig,
    channel: Arc<dyn RendezvousChannel>,
    ice_servers: Vec<IceServerConfig>,
    peers: Arc<DashMap<PeerId, PeerLink>>,
    link_tx: mpsc::UnboundedSender<LinkSignal>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionContext {
    pub fn new(
        role: Role,
        config: SessionConfig,
        channel: Arc<dyn RendezvousChannel>,
        ice_servers: Vec<IceServerConfig>,
        peers: Arc<DashMap<PeerId, PeerLink>>,
        events: mpsc::UnboundedSender<SessionEvent>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> (Self, mpsc::UnboundedReceiver<LinkSignal>) {
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        let ctx = Self {
            role,
            config,
            channel,
            ice_servers,
            peers,
            link_tx,
            events,
            state,
        };
        (ctx, link_rx)
    }

    pub async fn create_link(&self, peer_id: PeerId) -> Result<PeerLink, PeerLinkError> {
        PeerLink::connect(
            peer_id,
            self.role == Role::Offerer,
            &self.config.transport,
            &self.ice_servers,
            self.link_tx.clone(),
        )
        .await
    }

    pub async fn send(&self, signal: Signal) -> Result<(), SignalingError> {
        debug!("Sending {} to {:?}", signal.message.kind(), signal.peer_id);
        self.channel.send(signal).await
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub fn fail(&self, error: SessionError) {
        error!("Signaling session error: {}", error);
        self.emit(SessionEvent::Error(error));
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerLink> {
        self.peers.get(peer_id).map(|link| link.value().clone())
    }

    pub fn register(&self, link: PeerLink) {
        self.peers.insert(link.peer_id().clone(), link);
    }

    /// Ссылка, которую так и не отдали наружу: убрать из карты и закрыть.
    pub async fn discard(&self, link: &PeerLink) {
        let link_id = link.link_id();
        self.peers
            .remove_if(link.peer_id(), |_, current| current.link_id() == link_id);
        if let Err(e) = link.close().await {
            warn!("Discarded link for {:?} closed with error: {}", link.peer_id(), e);
        }
    }

    /// Закрыть и убрать ссылку peer, если она есть. Ждет полного закрытия.
    pub async fn retire(&self, peer_id: &PeerId) {
        let Some((_, previous)) = self.peers.remove(peer_id) else {
            return;
        };
        info!("Replacing link {} for {:?}", previous.link_id(), peer_id);
        if let Err(e) = previous.close().await {
            warn!("Superseded link for {:?} closed with error: {}", peer_id, e);
        }
    }

    fn is_current(&self, peer_id: &PeerId, link_id: Uuid) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|link| link.link_id() == link_id)
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Переход в `Closed`; `Disconnected` только если сессию закрыли не мы.
    fn disconnected(&self) {
        if self.state.send_replace(SessionState::Closed) != SessionState::Closed {
            self.emit(SessionEvent::Disconnected);
        }
    }

    /// Candidates from peers without a link are cross-talk and are dropped.
    async fn route_candidate(
        &self,
        peer_id: PeerId,
        candidate: IceCandidate,
    ) -> Result<(), SessionError> {
        let Some(link) = self.peer(&peer_id) else {
            debug!("Dropping ICE candidate from unknown peer {:?}", peer_id);
            return Ok(());
        };
        link.add_ice_candidate(candidate)
            .await
            .map_err(|e| SessionError::negotiation(peer_id, e))
    }
}

/// Цикл событий сессии. Единственный владелец изменений карты peer → link.
pub(crate) struct SessionActor {
    ctx: SessionContext,
    strategy: Box<dyn RoleStrategy>,
    rendezvous_rx: mpsc::UnboundedReceiver<RendezvousEvent>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    link_rx: mpsc::UnboundedReceiver<LinkSignal>,
}

impl SessionActor {
    pub fn new(
        ctx: SessionContext,
        strategy: Box<dyn RoleStrategy>,
        rendezvous_rx: mpsc::UnboundedReceiver<RendezvousEvent>,
        command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        link_rx: mpsc::UnboundedReceiver<LinkSignal>,
    ) -> Self {
        Self {
            ctx,
            strategy,
            rendezvous_rx,
            command_rx,
            link_rx,
        }
    }

    pub async fn run(mut self) {
        info!(
            "{} session event loop started on '{}'",
            self.ctx.role, self.ctx.config.channel_name
        );

        loop {
            tokio::select! {
                biased;
                cmd = self.command_rx.recv() => match cmd {
                    Some(SessionCommand::Stop) | None => {
                        info!("Command channel closed. Shutting down session loop.");
                        break;
                    }
                },
                event = self.rendezvous_rx.recv() => match event {
                    Some(event) => {
                        if !self.handle_rendezvous(event).await {
                            break;
                        }
                    }
                    None => {
                        warn!("Rendezvous event stream ended");
                        self.ctx.disconnected();
                        break;
                    }
                },
                Some(signal) = self.link_rx.recv() => self.handle_link_signal(signal).await,
            }
        }

        info!("Session event loop finished ({})", self.ctx.role);
    }

    /// Returns false once the loop should stop.
    async fn handle_rendezvous(&mut self, event: RendezvousEvent) -> bool {
        if self.ctx.state() == SessionState::Closed {
            return false;
        }

        match event {
            RendezvousEvent::Open => {
                self.ctx.state.send_replace(SessionState::Open);
                info!("Rendezvous channel '{}' open", self.ctx.config.channel_name);
                if let Err(e) = self.strategy.on_open(&self.ctx).await {
                    self.ctx.fail(e);
                }
                true
            }
            RendezvousEvent::Closed => {
                info!("Rendezvous channel '{}' closed", self.ctx.config.channel_name);
                self.ctx.disconnected();
                false
            }
            RendezvousEvent::Error(message) => {
                self.ctx.state.send_replace(SessionState::Closed);
                self.ctx
                    .fail(SessionError::Signaling(SignalingError::Remote(message)));
                self.ctx.channel.close().await;
                false
            }
            RendezvousEvent::Status(status) => {
                debug!("Rendezvous status: {}", status);
                true
            }
            RendezvousEvent::Signal(signal) => {
                if self.ctx.state() == SessionState::Open {
                    self.handle_signal(signal).await;
                } else {
                    warn!(
                        "Dropping {} from {:?}: session not open",
                        signal.message.kind(),
                        signal.peer_id
                    );
                }
                true
            }
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        let Signal { peer_id, message } = signal;
        debug!("Received {} from {:?}", message.kind(), peer_id);

        let result = match message {
            SignalMessage::Offer {
                description,
                correlation_id,
            } => {
                self.strategy
                    .handle_offer(&self.ctx, peer_id, description, correlation_id)
                    .await
            }
            SignalMessage::Answer {
                description,
                correlation_id,
            } => {
                self.strategy
                    .handle_answer(&self.ctx, peer_id, description, correlation_id)
                    .await
            }
            SignalMessage::IceCandidate { candidate } => {
                self.ctx.route_candidate(peer_id, candidate).await
            }
        };

        if let Err(e) = result {
            self.ctx.fail(e);
        }
    }

    async fn handle_link_signal(&mut self, signal: LinkSignal) {
        match signal {
            LinkSignal::LocalCandidate {
                peer_id,
                link_id,
                candidate,
            } => {
                if !self.ctx.is_current(&peer_id, link_id) {
                    debug!("Dropping ICE candidate of superseded link for {:?}", peer_id);
                    return;
                }
                if self.ctx.state() != SessionState::Open {
                    debug!("Session not open, local ICE candidate for {:?} not sent", peer_id);
                    return;
                }
                let signal = Signal::new(peer_id.clone(), SignalMessage::IceCandidate { candidate });
                if let Err(e) = self.ctx.send(signal).await {
                    warn!("Failed to send ICE candidate to {:?}: {}", peer_id, e);
                }
            }
            LinkSignal::NegotiationFailed { peer_id, error } => {
                self.ctx.fail(SessionError::negotiation(peer_id, error));
            }
            LinkSignal::Closed { peer_id, link_id } => {
                let removed = self
                    .ctx
                    .peers
                    .remove_if(&peer_id, |_, link| link.link_id() == link_id);
                if removed.is_some() {
                    info!("Peer {:?} removed after its link closed", peer_id);
                }
            }
        }
    }
}
