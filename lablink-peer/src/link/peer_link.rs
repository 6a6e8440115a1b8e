use crate::config::{MediaExpectations, TransportConfig};
use crate::error::{ControlError, NegotiationError, PeerLinkError};
use crate::link::control_channel::ControlChannel;
use crate::link::link_event::{LinkCommand, LinkSignal, PeerEvent};
use crate::link::link_task::LinkTask;
use crate::link::media_stream::{MediaStream, MediaTrack};
use crate::link::negotiator::{NegotiationState, Negotiator};
use dashmap::DashMap;
use lablink_core::{CONTROL_CHANNEL_LABEL, IceCandidate, IceServerConfig, PeerId, SdpKind, SessionDescription};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::track::track_remote::TrackRemote;

struct LocalStream {
    stream: MediaStream,
    senders: Vec<Arc<RTCRtpSender>>,
}

/// Состояние одной ссылки, общее для дескрипторов [`PeerLink`] и задачи пересогласования.
pub(crate) struct LinkShared {
    pub(crate) peer_id: PeerId,
    pub(crate) link_id: Uuid,
    pub(crate) pc: Arc<RTCPeerConnection>,
    polite: bool,
    negotiator: std::sync::Mutex<Negotiator>,
    /// Offer already sent but not yet set as local description (polite side only).
    unapplied_offer: Mutex<Option<RTCSessionDescription>>,
    local_streams: Mutex<HashMap<String, LocalStream>>,
    remote_streams: DashMap<String, MediaStream>,
    data_channels: DashMap<String, Arc<RTCDataChannel>>,
    control: OnceLock<ControlChannel>,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    ready: watch::Sender<bool>,
    closed: watch::Sender<bool>,
    closing: AtomicBool,
    commands: mpsc::UnboundedSender<LinkCommand>,
    events: mpsc::UnboundedSender<PeerEvent>,
    event_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<PeerEvent>>>,
    session: mpsc::UnboundedSender<LinkSignal>,
}

/// Одно peer-соединение с одной удаленной стороной после начального рукопожатия.
///
/// Cloning yields another handle to the same link. Renegotiation after the
/// initial offer/answer travels over the in-band [`ControlChannel`].
#[derive(Clone)]
pub struct PeerLink {
    shared: Arc<LinkShared>,
}

impl PeerLink {
    /// Инициализация нового WebRTC соединения.
    /// session: канал, в который ссылка отдает ICE-кандидатов и ошибки для сессии.
    /// polite: сторона, уступающая при встречных offer.
    pub(crate) async fn connect(
        peer_id: PeerId,
        polite: bool,
        transport: &TransportConfig,
        ice_servers: &[IceServerConfig],
        session: mpsc::UnboundedSender<LinkSignal>,
    ) -> Result<Self, PeerLinkError> {
        let pc = build_peer_connection(transport, ice_servers).await?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(LinkShared {
            peer_id: peer_id.clone(),
            link_id: Uuid::new_v4(),
            pc,
            polite,
            negotiator: std::sync::Mutex::new(Negotiator::new(polite)),
            unapplied_offer: Mutex::new(None),
            local_streams: Mutex::new(HashMap::new()),
            remote_streams: DashMap::new(),
            data_channels: DashMap::new(),
            control: OnceLock::new(),
            pending_candidates: Mutex::new(Vec::new()),
            ready: watch::Sender::new(false),
            closed: watch::Sender::new(false),
            closing: AtomicBool::new(false),
            commands: command_tx,
            events: event_tx,
            event_rx: std::sync::Mutex::new(Some(event_rx)),
            session,
        });

        shared.install_callbacks();
        tokio::spawn(LinkTask::new(shared.clone(), command_rx).run());

        info!("Peer link {} created for {:?}", shared.link_id, peer_id);
        Ok(Self { shared })
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.shared.peer_id
    }

    pub fn link_id(&self) -> Uuid {
        self.shared.link_id
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.shared.pc
    }

    /// Забирает поток событий ссылки. Возвращает `None` при повторном вызове.
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<PeerEvent>> {
        self.shared
            .event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn negotiation_state(&self) -> NegotiationState {
        self.shared.negotiation_state()
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.shared.pc.connection_state()
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn control_channel(&self) -> Option<ControlChannel> {
        self.shared.control.get().cloned()
    }

    pub async fn local_streams(&self) -> HashMap<String, MediaStream> {
        self.shared
            .local_streams
            .lock()
            .await
            .iter()
            .map(|(label, local)| (label.clone(), local.stream.clone()))
            .collect()
    }

    pub fn remote_streams(&self) -> Vec<MediaStream> {
        self.shared
            .remote_streams
            .iter()
            .map(|s| s.value().clone())
            .collect()
    }

    pub fn data_channels(&self) -> Vec<Arc<RTCDataChannel>> {
        self.shared
            .data_channels
            .iter()
            .map(|dc| dc.value().clone())
            .collect()
    }

    /// Добавляет все локальные треки потока под меткой `label`.
    ///
    /// Re-using a label replaces the previous stream and detaches its senders.
    /// Before the control channel is ready the resulting renegotiation is held
    /// back and runs once the channel is up.
    pub async fn add_stream(
        &self,
        stream: MediaStream,
        label: impl Into<String>,
    ) -> Result<(), PeerLinkError> {
        self.shared.ensure_open()?;
        let label = label.into();
        let pc = &self.shared.pc;

        let mut local = self.shared.local_streams.lock().await;
        if let Some(previous) = local.remove(&label) {
            warn!(
                "Stream label '{}' already used on link to {:?}, replacing stream {}",
                label,
                self.shared.peer_id,
                previous.stream.id()
            );
            for sender in previous.senders {
                if let Err(e) = pc.remove_track(&sender).await {
                    warn!("Failed to detach replaced sender: {}", e);
                }
            }
        }

        let mut senders = Vec::new();
        for track in stream.tracks() {
            match track.as_local() {
                Some(local_track) => senders.push(pc.add_track(local_track).await?),
                None => debug!("Skipping remote track {} in local stream", track.id()),
            }
        }
        local.insert(
            label.clone(),
            LocalStream {
                stream: stream.clone(),
                senders,
            },
        );
        drop(local);

        info!(
            "Stream {} added as '{}' on link to {:?}",
            stream.id(),
            label,
            self.shared.peer_id
        );
        if !self.is_ready() {
            let _ = self.shared.commands.send(LinkCommand::NegotiationNeeded);
        }
        self.shared.emit(PeerEvent::LocalStreamAdded { label, stream });
        Ok(())
    }

    pub async fn create_data_channel(
        &self,
        label: &str,
    ) -> Result<Arc<RTCDataChannel>, PeerLinkError> {
        if label == CONTROL_CHANNEL_LABEL {
            return Err(PeerLinkError::ReservedLabel(label.to_owned()));
        }
        self.shared.ensure_open()?;

        let dc = self.shared.pc.create_data_channel(label, None).await?;
        if self
            .shared
            .data_channels
            .insert(label.to_owned(), dc.clone())
            .is_some()
        {
            warn!("Data channel '{}' replaced on link to {:?}", label, self.shared.peer_id);
        }
        debug!("Data channel '{}' created for {:?}", label, self.shared.peer_id);
        self.shared.emit(PeerEvent::LocalDataChannelOpened(dc.clone()));
        Ok(dc)
    }

    /// Добавить удаленного ICE-кандидата (Trickle ICE).
    /// До установки remote description кандидат буферизуется.
    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerLinkError> {
        self.shared.ensure_open()?;
        let init = candidate_init(candidate);

        let mut pending = self.shared.pending_candidates.lock().await;
        if self.shared.pc.remote_description().await.is_none() {
            debug!("Buffering ICE candidate for {:?}", self.shared.peer_id);
            pending.push(init);
            return Ok(());
        }
        drop(pending);

        self.shared.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    pub async fn await_ready_to_negotiate(&self) -> Result<(), PeerLinkError> {
        self.shared.ensure_open()?;
        let mut ready = self.shared.ready.subscribe();
        let mut closed = self.shared.closed.subscribe();

        tokio::select! {
            biased;
            _ = async { closed.wait_for(|c| *c).await.is_ok() } => Err(PeerLinkError::Closed),
            res = async { ready.wait_for(|r| *r).await.map(|_| ()) } => {
                res.map_err(|_| PeerLinkError::Closed)?;
                self.shared.ensure_open()
            }
        }
    }

    /// Закрыть соединение. Повторный вызов ничего не делает.
    pub async fn close(&self) -> Result<(), PeerLinkError> {
        self.shared.teardown().await
    }

    /// Начальный offer: контрольный канал, recv-only трансиверы, local description.
    pub(crate) async fn create_initial_offer(
        &self,
        media: MediaExpectations,
    ) -> Result<SessionDescription, PeerLinkError> {
        let pc = &self.shared.pc;

        let dc = pc.create_data_channel(CONTROL_CHANNEL_LABEL, None).await?;
        self.shared.attach_control(ControlChannel::bind(
            dc,
            self.shared.peer_id.clone(),
            self.shared.commands.clone(),
        ));

        let expected = [
            (media.receive_audio, RTPCodecType::Audio),
            (media.receive_video, RTPCodecType::Video),
        ];
        for (_, kind) in expected.into_iter().filter(|(wanted, _)| *wanted) {
            pc.add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        }

        let offer = pc.create_offer(None).await?;
        pc.set_local_description(offer.clone()).await?;
        debug!("Initial offer created for {:?}", self.shared.peer_id);
        Ok(SessionDescription::offer(offer.sdp))
    }

    pub(crate) async fn accept_initial_offer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, PeerLinkError> {
        expect_kind(&offer, SdpKind::Offer)?;
        self.shared.apply_remote_description(offer).await?;
        let answer = self.shared.create_local_answer().await?;
        debug!("Initial answer created for {:?}", self.shared.peer_id);
        Ok(answer)
    }

    pub(crate) async fn apply_initial_answer(
        &self,
        answer: SessionDescription,
    ) -> Result<(), PeerLinkError> {
        expect_kind(&answer, SdpKind::Answer)?;
        self.shared.apply_remote_description(answer).await
    }
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("peer_id", &self.shared.peer_id)
            .field("link_id", &self.shared.link_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LinkShared {
    fn install_callbacks(&self) {
        // A. Состояние соединения
        let state_tx = self.commands.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let _ = state_tx.send(LinkCommand::StateChanged(s));
                Box::pin(async {})
            }));

        // B. Trickle ICE: локальные кандидаты уходят в сессию
        let session = self.session.clone();
        let uid_ice = self.peer_id.clone();
        let link_id = self.link_id;
        self.pc
            .on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
                let tx = session.clone();
                let uid = uid_ice.clone();
                Box::pin(async move {
                    let Some(candidate) = c else { return };
                    let Ok(init) = candidate.to_json() else {
                        return;
                    };
                    let _ = tx.send(LinkSignal::LocalCandidate {
                        peer_id: uid,
                        link_id,
                        candidate: ice_candidate(init),
                    });
                })
            }));

        // C. Входящие data channel. Контрольный канал связывается сразу,
        // до того как webrtc начнет читать из него.
        let dc_tx = self.commands.clone();
        let uid_dc = self.peer_id.clone();
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let tx = dc_tx.clone();
                let uid = uid_dc.clone();
                Box::pin(async move {
                    debug!("Remote data channel '{}' from {:?}", dc.label(), uid);
                    let command = if dc.label() == CONTROL_CHANNEL_LABEL {
                        LinkCommand::ControlBound(ControlChannel::bind(dc, uid, tx.clone()))
                    } else {
                        LinkCommand::RemoteDataChannel(dc)
                    };
                    let _ = tx.send(command);
                })
            }));

        // D. Входящие треки
        let track_tx = self.commands.clone();
        self.pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let _ = track_tx.send(LinkCommand::RemoteTrack(track));
            Box::pin(async {})
        }));

        let negotiation_tx = self.commands.clone();
        self.pc.on_negotiation_needed(Box::new(move || {
            let _ = negotiation_tx.send(LinkCommand::NegotiationNeeded);
            Box::pin(async {})
        }));
    }

    pub(crate) fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), PeerLinkError> {
        if self.is_closed() {
            return Err(PeerLinkError::Closed);
        }
        Ok(())
    }

    pub(crate) fn negotiation_state(&self) -> NegotiationState {
        self.negotiator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
    }

    /// Runs `f` against the negotiator and reports a state change, if any.
    pub(crate) fn negotiate<R>(&self, f: impl FnOnce(&mut Negotiator) -> R) -> R {
        let (result, before, after) = {
            let mut negotiator = self.negotiator.lock().unwrap_or_else(PoisonError::into_inner);
            let before = negotiator.state();
            let result = f(&mut negotiator);
            (result, before, negotiator.state())
        };
        if before != after {
            debug!(
                "Negotiation with {:?}: {:?} -> {:?}",
                self.peer_id, before, after
            );
            self.emit(PeerEvent::NegotiationStateChanged(after));
        }
        result
    }

    pub(crate) fn control(&self) -> Result<&ControlChannel, ControlError> {
        self.control.get().ok_or(ControlError::Missing)
    }

    pub(crate) fn attach_control(&self, control: ControlChannel) {
        if self.control.set(control).is_err() {
            warn!("Second control channel from {:?} ignored", self.peer_id);
        }
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.send_replace(true);
        self.emit(PeerEvent::ControlReady);
    }

    pub(crate) fn store_remote_channel(&self, dc: Arc<RTCDataChannel>) {
        self.data_channels.insert(dc.label().to_owned(), dc.clone());
        self.emit(PeerEvent::RemoteDataChannelOpened(dc));
    }

    /// Треки группируются по stream id; новый поток порождает событие.
    pub(crate) fn intake_track(&self, track: Arc<TrackRemote>) {
        let stream_id = track.stream_id();
        let media = MediaTrack::remote(track);
        debug!(
            "Remote {} track {} in stream {} from {:?}",
            media.kind(),
            media.id(),
            stream_id,
            self.peer_id
        );

        let known = self.remote_streams.get(&stream_id).map(|s| s.value().clone());
        if let Some(stream) = known {
            stream.add_track(media);
            return;
        }

        let stream = MediaStream::new(stream_id.clone());
        stream.add_track(media);
        self.remote_streams.insert(stream_id, stream.clone());
        info!("Remote stream {} added from {:?}", stream.id(), self.peer_id);
        self.emit(PeerEvent::RemoteStreamAdded(stream));
    }

    /// Apply, confirm, then flush the candidates that arrived early.
    pub(crate) async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerLinkError> {
        let rtc = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        };
        self.pc.set_remote_description(rtc).await?;
        if self.pc.remote_description().await.is_none() {
            return Err(PeerLinkError::RemoteDescriptionMissing);
        }

        let buffered: Vec<_> = self.pending_candidates.lock().await.drain(..).collect();
        if !buffered.is_empty() {
            debug!(
                "Applying {} buffered ICE candidates for {:?}",
                buffered.len(),
                self.peer_id
            );
        }
        for candidate in buffered {
            if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                warn!("Buffered ICE candidate rejected for {:?}: {}", self.peer_id, e);
            }
        }
        Ok(())
    }

    /// Offer for a renegotiation. The polite side only records it; it becomes
    /// the local description once the answer arrives.
    pub(crate) async fn create_local_offer(&self) -> Result<SessionDescription, PeerLinkError> {
        let offer = self.pc.create_offer(None).await?;
        let sdp = offer.sdp.clone();
        if self.polite {
            *self.unapplied_offer.lock().await = Some(offer);
        } else {
            self.pc.set_local_description(offer).await?;
        }
        Ok(SessionDescription::offer(sdp))
    }

    pub(crate) async fn commit_local_offer(&self) -> Result<(), PeerLinkError> {
        let offer = self.unapplied_offer.lock().await.take();
        if let Some(offer) = offer {
            self.pc.set_local_description(offer).await?;
        }
        Ok(())
    }

    pub(crate) async fn drop_local_offer(&self) {
        self.unapplied_offer.lock().await.take();
    }

    pub(crate) async fn create_local_answer(&self) -> Result<SessionDescription, PeerLinkError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    pub(crate) fn report(&self, error: PeerLinkError) {
        warn!("Negotiation with {:?} failed: {}", self.peer_id, error);
        let error = Arc::new(error);
        self.emit(PeerEvent::NegotiationFailed(error.clone()));
        let _ = self.session.send(LinkSignal::NegotiationFailed {
            peer_id: self.peer_id.clone(),
            error,
        });
    }

    pub(crate) async fn teardown(&self) -> Result<(), PeerLinkError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing peer link {} to {:?}", self.link_id, self.peer_id);
        self.closed.send_replace(true);

        for local in self.local_streams.lock().await.values() {
            local.stream.stop();
        }
        for remote in self.remote_streams.iter() {
            remote.stop();
        }

        let channels: Vec<_> = self.data_channels.iter().map(|dc| dc.value().clone()).collect();
        for result in futures::future::join_all(channels.iter().map(|dc| dc.close())).await {
            if let Err(e) = result {
                debug!("Data channel close failed: {}", e);
            }
        }
        if let Some(control) = self.control.get()
            && let Err(e) = control.close().await
        {
            debug!("Control channel close failed: {}", e);
        }
        let closed = self.pc.close().await;

        if self.negotiate(Negotiator::abandon) {
            self.report(PeerLinkError::RenegotiationAbandoned);
        }

        self.emit(PeerEvent::Closed);
        let _ = self.session.send(LinkSignal::Closed {
            peer_id: self.peer_id.clone(),
            link_id: self.link_id,
        });
        let _ = self.commands.send(LinkCommand::Shutdown);

        closed?;
        Ok(())
    }
}

/// Настройка MediaEngine, интерцепторов и ICE серверов, как для любого соединения.
async fn build_peer_connection(
    transport: &TransportConfig,
    ice_servers: &[IceServerConfig],
) -> Result<Arc<RTCPeerConnection>, PeerLinkError> {
    let mut m = MediaEngine::default();
    m.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut m)?;

    let api = APIBuilder::new()
        .with_media_engine(m)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: ice_servers
            .iter()
            .filter(|server| !server.urls.is_empty())
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
            })
            .collect(),
        ..Default::default()
    };
    debug!(
        "Creating peer connection with {} ICE servers (receive audio: {}, video: {})",
        rtc_config.ice_servers.len(),
        transport.media.receive_audio,
        transport.media.receive_video
    );

    Ok(Arc::new(api.new_peer_connection(rtc_config).await?))
}

pub(crate) fn expect_kind(description: &SessionDescription, expected: SdpKind) -> Result<(), PeerLinkError> {
    if description.kind != expected {
        return Err(NegotiationError::UnexpectedDescription {
            expected,
            actual: description.kind,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: candidate.username_fragment,
    }
}

pub(crate) fn ice_candidate(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}
