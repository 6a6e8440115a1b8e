use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use colored::*;
use lablink::peer::{
    LocalRendezvousHub, MediaExpectations, MediaStream, NoTurnServers, PeerEvent, PeerLink,
    SessionConfig, SessionEvent, SignalingSession, TransportConfig,
};
use lablink::{PeerId, Role};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Parser)]
#[command(name = "lablink", version, about = "Lab <-> user peer links over a rendezvous channel")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect a lab and a user in-process and push a synthetic video stream
    Loopback {
        #[arg(long, default_value = "lablink-demo")]
        channel: String,

        /// STUN server URL; may be repeated. Host candidates only when absent
        #[arg(long)]
        stun: Vec<String>,

        /// Offer recv-only audio/video transceivers in the initial offer
        #[arg(long)]
        receive_media: bool,

        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Loopback {
            channel,
            stun,
            receive_media,
            timeout_secs,
        } => {
            let transport = TransportConfig {
                stun_urls: stun,
                media: if receive_media {
                    MediaExpectations::default()
                } else {
                    MediaExpectations::none()
                },
            };
            run_loopback(&channel, transport, Duration::from_secs(timeout_secs)).await?;
        }
    }

    Ok(())
}

async fn run_loopback(channel: &str, transport: TransportConfig, timeout: Duration) -> Result<()> {
    println!("{}", "🔗 Starting lablink loopback...".green().bold());

    let hub = LocalRendezvousHub::new();
    let user_id = PeerId::from(format!("user-{}", PeerId::new()));

    let (lab, mut lab_events) = SignalingSession::new(
        Role::Answerer,
        SessionConfig::new(channel, PeerId::master()).with_transport(transport.clone()),
        Arc::new(hub.master_channel()),
        Arc::new(NoTurnServers),
    );
    lab.start().await.context("Lab session failed to start")?;

    let (user, mut user_events) = SignalingSession::new(
        Role::Offerer,
        SessionConfig::new(channel, user_id.clone()).with_transport(transport),
        Arc::new(hub.viewer_channel(user_id.clone())),
        Arc::new(NoTurnServers),
    );
    user.start().await.context("User session failed to start")?;
    println!("   📡 Rendezvous channel '{}' open for {}", channel, user_id);

    let outcome = tokio::time::timeout(timeout, exchange(&mut lab_events, &mut user_events)).await;

    user.stop().await;
    lab.stop().await;

    outcome.context("Loopback demo timed out")??;
    println!("{}", "✨ Loopback completed successfully!".green().bold());
    Ok(())
}

async fn exchange(
    lab_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    user_events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    let user_link = next_peer(user_events).await.context("User side")?;
    let lab_link = next_peer(lab_events).await.context("Lab side")?;
    let mut lab_link_events = lab_link.events().context("Lab link events already taken")?;
    println!(
        "   🤝 Offer/answer exchanged (lab link {})",
        lab_link.link_id()
    );

    user_link.await_ready_to_negotiate().await?;
    lab_link.await_ready_to_negotiate().await?;
    println!("{}", "   ✅ Control channels ready".cyan());

    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_owned(),
        "demo-cam".to_owned(),
    ));
    let stream = MediaStream::from_local_tracks(
        "demo-cam",
        [track.clone() as Arc<dyn TrackLocal + Send + Sync>],
    );
    user_link.add_stream(stream, "cam").await?;
    println!("{}", "   🎥 Synthetic camera added, renegotiating...".cyan());

    let pump = tokio::spawn(async move {
        let mut interval = tokio::time::interval(FRAME_INTERVAL);
        loop {
            interval.tick().await;
            let sample = Sample {
                data: Bytes::from(vec![0u8; 512]),
                duration: FRAME_INTERVAL,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                debug!("Sample write failed: {}", e);
            }
        }
    });

    let remote = loop {
        match lab_link_events.recv().await {
            Some(PeerEvent::RemoteStreamAdded(stream)) => break stream,
            Some(PeerEvent::NegotiationFailed(e)) => anyhow::bail!("Renegotiation failed: {}", e),
            Some(other) => debug!("Lab link event: {:?}", other),
            None => anyhow::bail!("Lab link closed before the stream arrived"),
        }
    };
    pump.abort();

    println!(
        "   📺 Lab received stream '{}' with {} track(s)",
        remote.id(),
        remote.track_count()
    );

    close(&user_link).await;
    close(&lab_link).await;
    Ok(())
}

async fn next_peer(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Result<PeerLink> {
    loop {
        match events.recv().await {
            Some(SessionEvent::PeerConnected(link)) => return Ok(link),
            Some(SessionEvent::Error(e)) => anyhow::bail!("Signaling error: {}", e),
            Some(SessionEvent::Disconnected) | None => {
                anyhow::bail!("Signaling session disconnected")
            }
        }
    }
}

async fn close(link: &PeerLink) {
    if let Err(e) = link.close().await {
        eprintln!("{} {}", "⚠️  Failed to close link:".yellow(), e);
    }
}
