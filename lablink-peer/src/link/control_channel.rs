use crate::error::ControlError;
use crate::link::link_event::LinkCommand;
use lablink_core::{ControlMessage, PeerId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;

/// Внутриполосный канал пересогласования поверх data channel `"metadata"`.
///
/// Each side sends a probe as soon as its end opens. Receiving the remote
/// probe is the only readiness signal, so readiness is tracked per direction.
#[derive(Clone)]
pub struct ControlChannel {
    channel: Arc<RTCDataChannel>,
    ready: Arc<AtomicBool>,
}

impl ControlChannel {
    /// Регистрирует обработчики на канале. Вызывать до того, как канал откроется
    /// или начнет принимать сообщения, иначе первый probe может потеряться.
    pub(crate) fn bind(
        channel: Arc<RTCDataChannel>,
        peer_id: PeerId,
        commands: mpsc::UnboundedSender<LinkCommand>,
    ) -> Self {
        let ready = Arc::new(AtomicBool::new(false));

        let probe_channel = channel.clone();
        let uid_open = peer_id.clone();
        channel.on_open(Box::new(move || {
            let dc = probe_channel.clone();
            let uid = uid_open.clone();
            Box::pin(async move {
                debug!("Control channel open for {:?}, sending probe", uid);
                if let Err(e) = send_message(&dc, &ControlMessage::probe()).await {
                    warn!("Failed to send control probe to {:?}: {}", uid, e);
                }
            })
        }));

        let ready_flag = ready.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = commands.clone();
            let ready = ready_flag.clone();
            let uid = peer_id.clone();
            Box::pin(async move {
                let text = String::from_utf8_lossy(&msg.data);
                let command = match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(ControlMessage::Test { .. }) => {
                        if ready.swap(true, Ordering::SeqCst) {
                            debug!("Repeated control probe from {:?}", uid);
                            return;
                        }
                        info!("Control channel ready for {:?}", uid);
                        LinkCommand::ControlReady
                    }
                    Ok(ControlMessage::SdpOffer { sdp_offer }) => LinkCommand::RemoteOffer(sdp_offer),
                    Ok(ControlMessage::SdpAnswer { sdp_answer }) => {
                        LinkCommand::RemoteAnswer(sdp_answer)
                    }
                    Ok(ControlMessage::Unknown) => {
                        warn!("Ignoring unknown control message from {:?}: {}", uid, text);
                        return;
                    }
                    Err(e) => LinkCommand::ControlMalformed(ControlError::Malformed(e)),
                };
                let _ = tx.send(command);
            })
        }));

        Self { channel, ready }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> &str {
        self.channel.label()
    }

    pub fn data_channel(&self) -> &Arc<RTCDataChannel> {
        &self.channel
    }

    pub async fn send(&self, message: &ControlMessage) -> Result<(), ControlError> {
        send_message(&self.channel, message).await
    }

    pub async fn close(&self) -> Result<(), ControlError> {
        self.channel.close().await?;
        Ok(())
    }
}

async fn send_message(
    channel: &RTCDataChannel,
    message: &ControlMessage,
) -> Result<(), ControlError> {
    let text = serde_json::to_string(message)?;
    channel.send_text(text).await?;
    Ok(())
}
