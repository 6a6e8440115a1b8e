use crate::error::PeerLinkError;
use crate::link::link_event::{LinkCommand, PeerEvent};
use crate::link::negotiator::{NegotiationStep, RemoteOffer};
use crate::link::peer_link::{LinkShared, expect_kind};
use lablink_core::{ControlMessage, SdpKind, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Задача пересогласования одной ссылки: вся работа с SDP после
/// начального рукопожатия проходит последовательно через нее.
pub(crate) struct LinkTask {
    link: Arc<LinkShared>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
}

impl LinkTask {
    pub fn new(link: Arc<LinkShared>, commands: mpsc::UnboundedReceiver<LinkCommand>) -> Self {
        Self { link, commands }
    }

    pub async fn run(mut self) {
        debug!("Negotiation task started for {:?}", self.link.peer_id);

        while let Some(command) = self.commands.recv().await {
            if self.link.is_closed()
                && !matches!(command, LinkCommand::Shutdown | LinkCommand::StateChanged(_))
            {
                continue;
            }

            match command {
                LinkCommand::NegotiationNeeded => {
                    let step = self.link.negotiate(|n| n.request());
                    self.drive(step).await;
                }
                LinkCommand::ControlBound(control) => self.link.attach_control(control),
                LinkCommand::ControlReady => {
                    self.link.mark_ready();
                    let step = self.link.negotiate(|n| n.mark_ready());
                    self.drive(step).await;
                }
                LinkCommand::RemoteOffer(offer) => self.on_remote_offer(offer).await,
                LinkCommand::RemoteAnswer(answer) => self.on_remote_answer(answer).await,
                LinkCommand::ControlMalformed(error) => self.link.report(error.into()),
                LinkCommand::RemoteTrack(track) => self.link.intake_track(track),
                LinkCommand::RemoteDataChannel(dc) => self.link.store_remote_channel(dc),
                LinkCommand::StateChanged(state) => {
                    info!(
                        "Peer Connection State changed for {:?}: {:?}",
                        self.link.peer_id, state
                    );
                    self.link.emit(PeerEvent::ConnectionStateChanged(state));
                    if state == RTCPeerConnectionState::Closed {
                        if let Err(e) = self.link.teardown().await {
                            warn!("Teardown of {:?} failed: {}", self.link.peer_id, e);
                        }
                        break;
                    }
                }
                LinkCommand::Shutdown => break,
            }
        }

        debug!("Negotiation task finished for {:?}", self.link.peer_id);
    }

    async fn drive(&self, step: NegotiationStep) {
        if step != NegotiationStep::SendOffer {
            return;
        }
        if let Err(e) = self.send_offer().await {
            self.link.negotiate(|n| n.fail());
            self.link.report(e);
        }
    }

    async fn send_offer(&self) -> Result<(), PeerLinkError> {
        let control = self.link.control()?;

        let offer = self.link.create_local_offer().await?;
        control
            .send(&ControlMessage::SdpOffer { sdp_offer: offer })
            .await?;

        info!("Renegotiation offer sent to {:?}", self.link.peer_id);
        Ok(())
    }

    async fn on_remote_offer(&self, offer: SessionDescription) {
        match self.link.negotiate(|n| n.begin_remote_offer()) {
            Ok(RemoteOffer::Answer) => {}
            Ok(RemoteOffer::AnswerAfterYield) => {
                self.link.drop_local_offer().await;
                info!(
                    "Offer collision with {:?}: yielding, local offer will be re-sent",
                    self.link.peer_id
                );
            }
            Ok(RemoteOffer::Ignore) => {
                info!(
                    "Offer collision with {:?}: ignoring remote offer, waiting for answer",
                    self.link.peer_id
                );
                return;
            }
            Err(e) => {
                self.link.report(e.into());
                return;
            }
        }

        match self.answer_remote_offer(offer).await {
            Ok(()) => {
                let step = self.link.negotiate(|n| n.finish_local_answer());
                self.drive(step).await;
            }
            Err(e) => {
                self.link.negotiate(|n| n.fail());
                self.link.report(e);
            }
        }
    }

    async fn answer_remote_offer(&self, offer: SessionDescription) -> Result<(), PeerLinkError> {
        expect_kind(&offer, SdpKind::Offer)?;
        let control = self.link.control()?;

        self.link.apply_remote_description(offer).await?;
        let answer = self.link.create_local_answer().await?;
        control
            .send(&ControlMessage::SdpAnswer { sdp_answer: answer })
            .await?;

        info!("Renegotiation answer sent to {:?}", self.link.peer_id);
        Ok(())
    }

    async fn on_remote_answer(&self, answer: SessionDescription) {
        if let Err(e) = self.link.negotiate(|n| n.begin_remote_answer()) {
            self.link.report(e.into());
            return;
        }
        if let Err(e) = expect_kind(&answer, SdpKind::Answer) {
            self.link.negotiate(|n| n.fail());
            self.link.report(e);
            return;
        }

        let applied = match self.link.commit_local_offer().await {
            Ok(()) => self.link.apply_remote_description(answer).await,
            Err(e) => Err(e),
        };
        match applied {
            Ok(()) => {
                debug!("Renegotiation answer applied for {:?}", self.link.peer_id);
                let step = self.link.negotiate(|n| n.finish_remote_answer());
                self.drive(step).await;
            }
            Err(e) => {
                self.link.negotiate(|n| n.fail());
                self.link.report(e);
            }
        }
    }
}
