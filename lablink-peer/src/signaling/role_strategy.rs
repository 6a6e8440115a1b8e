use crate::error::SessionError;
use crate::signaling::session::SessionEvent;
use crate::signaling::session_actor::SessionContext;
use async_trait::async_trait;
use lablink_core::{PeerId, Role, SessionDescription, Signal, SignalMessage};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Различающаяся часть поведения offerer и answerer.
#[async_trait]
pub(crate) trait RoleStrategy: Send {
    /// Канал рандеву открыт.
    async fn on_open(&mut self, ctx: &SessionContext) -> Result<(), SessionError>;

    async fn handle_offer(
        &mut self,
        ctx: &SessionContext,
        peer_id: PeerId,
        offer: SessionDescription,
        correlation_id: Option<String>,
    ) -> Result<(), SessionError>;

    async fn handle_answer(
        &mut self,
        ctx: &SessionContext,
        peer_id: PeerId,
        answer: SessionDescription,
        correlation_id: Option<String>,
    ) -> Result<(), SessionError>;
}

pub(crate) fn strategy_for(role: Role) -> Box<dyn RoleStrategy> {
    match role {
        Role::Offerer => Box::new(OffererStrategy::default()),
        Role::Answerer => Box::new(AnswererStrategy),
    }
}

/// Single remote ("master"): sends the initial offer as soon as the channel opens.
#[derive(Default)]
pub(crate) struct OffererStrategy {
    correlation_id: Option<String>,
    answered: bool,
}

#[async_trait]
impl RoleStrategy for OffererStrategy {
    async fn on_open(&mut self, ctx: &SessionContext) -> Result<(), SessionError> {
        let remote = PeerId::master();
        ctx.retire(&remote).await;
        let link = ctx
            .create_link(remote.clone())
            .await
            .map_err(|e| SessionError::negotiation(remote.clone(), e))?;
        // Ссылка регистрируется до offer, чтобы ранние кандидаты ICE нашли адресата.
        ctx.register(link.clone());

        let offer = match link.create_initial_offer(ctx.config.transport.media).await {
            Ok(offer) => offer,
            Err(e) => {
                ctx.discard(&link).await;
                return Err(SessionError::negotiation(remote, e));
            }
        };

        let correlation_id = Uuid::new_v4().to_string();
        self.correlation_id = Some(correlation_id.clone());
        self.answered = false;
        let sent = ctx
            .send(Signal::new(
                remote.clone(),
                SignalMessage::Offer {
                    description: offer,
                    correlation_id: Some(correlation_id),
                },
            ))
            .await;
        if let Err(e) = sent {
            ctx.discard(&link).await;
            return Err(e.into());
        }

        info!("Initial offer sent to {:?}", remote);
        ctx.emit(SessionEvent::PeerConnected(link));
        Ok(())
    }

    async fn handle_offer(
        &mut self,
        _ctx: &SessionContext,
        peer_id: PeerId,
        _offer: SessionDescription,
        _correlation_id: Option<String>,
    ) -> Result<(), SessionError> {
        warn!("Offerer ignoring offer from {:?}", peer_id);
        Ok(())
    }

    async fn handle_answer(
        &mut self,
        ctx: &SessionContext,
        peer_id: PeerId,
        answer: SessionDescription,
        correlation_id: Option<String>,
    ) -> Result<(), SessionError> {
        let Some(link) = ctx.peer(&peer_id) else {
            debug!("Dropping answer from unknown peer {:?}", peer_id);
            return Ok(());
        };
        if let (Some(expected), Some(received)) = (&self.correlation_id, &correlation_id)
            && expected != received
        {
            warn!(
                "Dropping answer from {:?} with correlation id {} (expected {})",
                peer_id, received, expected
            );
            return Ok(());
        }
        if self.answered {
            warn!("Duplicate answer from {:?} ignored", peer_id);
            return Ok(());
        }

        link.apply_initial_answer(answer)
            .await
            .map_err(|e| SessionError::negotiation(peer_id.clone(), e))?;
        self.answered = true;
        info!("Initial answer from {:?} applied", peer_id);
        Ok(())
    }
}

/// Many remotes: one link per offering peer, last offer wins.
pub(crate) struct AnswererStrategy;

#[async_trait]
impl RoleStrategy for AnswererStrategy {
    async fn on_open(&mut self, ctx: &SessionContext) -> Result<(), SessionError> {
        debug!(
            "Answerer waiting for offers on '{}'",
            ctx.config.channel_name
        );
        Ok(())
    }

    async fn handle_offer(
        &mut self,
        ctx: &SessionContext,
        peer_id: PeerId,
        offer: SessionDescription,
        correlation_id: Option<String>,
    ) -> Result<(), SessionError> {
        ctx.retire(&peer_id).await;

        let link = ctx
            .create_link(peer_id.clone())
            .await
            .map_err(|e| SessionError::negotiation(peer_id.clone(), e))?;
        ctx.register(link.clone());

        let answer = match link.accept_initial_offer(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                ctx.discard(&link).await;
                return Err(SessionError::negotiation(peer_id, e));
            }
        };

        let correlation_id = correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let sent = ctx
            .send(Signal::new(
                peer_id.clone(),
                SignalMessage::Answer {
                    description: answer,
                    correlation_id: Some(correlation_id),
                },
            ))
            .await;
        if let Err(e) = sent {
            ctx.discard(&link).await;
            return Err(e.into());
        }

        info!("Answer sent to {:?}", peer_id);
        ctx.emit(SessionEvent::PeerConnected(link));
        Ok(())
    }

    async fn handle_answer(
        &mut self,
        _ctx: &SessionContext,
        peer_id: PeerId,
        _answer: SessionDescription,
        _correlation_id: Option<String>,
    ) -> Result<(), SessionError> {
        warn!("Answerer ignoring answer from {:?}", peer_id);
        Ok(())
    }
}
