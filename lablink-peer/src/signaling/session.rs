use crate::config::SessionConfig;
use crate::error::{SessionError, SignalingError};
use crate::link::PeerLink;
use crate::signaling::ice_provider::{IceServerProvider, resolve_ice_servers};
use crate::signaling::rendezvous::RendezvousChannel;
use crate::signaling::role_strategy::strategy_for;
use crate::signaling::session_actor::{SessionActor, SessionContext};
use dashmap::DashMap;
use lablink_core::{IceCandidate, PeerId, Role, Signal, SignalMessage};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Новая ссылка; для answerer также после замены ссылки того же peer.
    PeerConnected(PeerLink),
    Disconnected,
    Error(SessionError),
}

pub(crate) enum SessionCommand {
    Stop,
}

/// Одна сигнальная сессия: начальный обмен offer/answer/ICE через сервис рандеву.
///
/// `start()` spawns the session event loop; everything after the initial
/// handshake belongs to the [`PeerLink`]s it hands out. `Closed` is terminal.
pub struct SignalingSession {
    role: Role,
    config: SessionConfig,
    channel: Arc<dyn RendezvousChannel>,
    ice_provider: Arc<dyn IceServerProvider>,
    state: Arc<watch::Sender<SessionState>>,
    peers: Arc<DashMap<PeerId, PeerLink>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionCommand>>>,
}

impl SignalingSession {
    pub fn new(
        role: Role,
        config: SessionConfig,
        channel: Arc<dyn RendezvousChannel>,
        ice_provider: Arc<dyn IceServerProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();

        let session = Self {
            role,
            config,
            channel,
            ice_provider,
            state: Arc::new(watch::Sender::new(SessionState::Idle)),
            peers: Arc::new(DashMap::new()),
            events,
            commands,
            command_rx: Mutex::new(Some(command_rx)),
        };
        (session, event_rx)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Ждет `target` или `Closed`, в зависимости от того, что наступит раньше.
    pub async fn wait_for_state(&self, target: SessionState) -> SessionState {
        let mut rx = self.state.subscribe();
        match rx
            .wait_for(|s| *s == target || *s == SessionState::Closed)
            .await
        {
            Ok(state) => *state,
            Err(_) => SessionState::Closed,
        }
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerLink> {
        self.peers.get(peer_id).map(|link| link.value().clone())
    }

    pub fn peers(&self) -> Vec<PeerLink> {
        self.peers.iter().map(|link| link.value().clone()).collect()
    }

    /// Открывает канал рандеву, получает ICE серверы и запускает цикл событий.
    ///
    /// A failure leaves the session `Closed`; construct a new one to retry.
    pub async fn start(&self) -> Result<(), SignalingError> {
        let began = self.state.send_if_modified(|state| {
            if *state != SessionState::Idle {
                return false;
            }
            *state = SessionState::Connecting;
            true
        });
        if !began {
            return Err(match self.state() {
                SessionState::Closed => SignalingError::Closed,
                _ => SignalingError::AlreadyStarted,
            });
        }
        let command_rx = self
            .command_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SignalingError::AlreadyStarted)?;

        info!(
            "Starting {} session on channel '{}' as {:?}",
            self.role, self.config.channel_name, self.config.client_id
        );

        let (rendezvous_tx, rendezvous_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.channel.open(rendezvous_tx).await {
            error!(
                "Failed to open rendezvous channel '{}': {}",
                self.config.channel_name, e
            );
            self.state.send_replace(SessionState::Closed);
            let _ = self.events.send(SessionEvent::Error(e.clone().into()));
            return Err(e);
        }

        let ice_servers = resolve_ice_servers(
            self.ice_provider.as_ref(),
            &self.config.channel_name,
            &self.config.transport,
        )
        .await;
        if self.state() == SessionState::Closed {
            info!("Session stopped while fetching ICE servers, discarding result");
            return Err(SignalingError::Closed);
        }

        let (ctx, link_rx) = SessionContext::new(
            self.role,
            self.config.clone(),
            self.channel.clone(),
            ice_servers,
            self.peers.clone(),
            self.events.clone(),
            self.state.clone(),
        );
        let actor = SessionActor::new(
            ctx,
            strategy_for(self.role),
            rendezvous_rx,
            command_rx,
            link_rx,
        );
        tokio::spawn(actor.run());
        Ok(())
    }

    /// Отправить локального ICE-кандидата напрямую через канал рандеву.
    pub async fn send_ice_candidate(
        &self,
        peer_id: PeerId,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        if self.state() != SessionState::Open {
            return Err(SignalingError::NotOpen);
        }
        self.channel
            .send(Signal::new(peer_id, SignalMessage::IceCandidate { candidate }))
            .await
    }

    /// Закрывает канал рандеву. Живые ссылки остаются открытыми.
    pub async fn stop(&self) {
        let previous = self.state.send_replace(SessionState::Closed);
        if previous == SessionState::Closed {
            return;
        }
        info!(
            "Stopping {} session on channel '{}'",
            self.role, self.config.channel_name
        );
        if previous != SessionState::Idle {
            self.channel.close().await;
        }
        let _ = self.commands.send(SessionCommand::Stop);
    }
}
