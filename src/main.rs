use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Local;
use clap::Parser;
use log::{info, warn};
use peer_av::calls::media::{AudioFrame, VideoFrame};
use peer_av::calls::{AvEvent, ChannelListener, drive};
use peer_av::loopback::LoopbackNetwork;
use peer_av::{AvConfig, AvSession, CallControl, FriendNumber, MediaKind};
use tokio::sync::{mpsc, watch};

// Demo of two peers on an in-memory network placing, answering,
// renegotiating and hanging up a call while exchanging synthetic frames.
//
// Usage:
//   cargo run                                  # 2 second audio+video call
//   cargo run -- --seconds 5 --video-rate 1000
//   cargo run -- --config av.json

#[derive(Debug, Parser)]
#[command(about = "Loopback audio/video call demo")]
struct Args {
    /// JSON file with AV tunables; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long the call runs before video is dropped and the call ends.
    #[arg(short, long, default_value_t = 2)]
    seconds: u64,

    /// Audio bit rate in kb/s.
    #[arg(long, default_value_t = 64)]
    audio_rate: u32,

    /// Video bit rate in kb/s, 0 for an audio-only call.
    #[arg(long, default_value_t = 500)]
    video_rate: u32,
}

const ALICE_SEES_BOB: FriendNumber = FriendNumber(0);
const BOB_SEES_ALICE: FriendNumber = FriendNumber(0);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = match &args.config {
        Some(path) => AvConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AvConfig::default(),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(run(args, config))
}

async fn run(args: Args, config: AvConfig) -> anyhow::Result<()> {
    let alice_net = LoopbackNetwork::new();
    let bob_net = LoopbackNetwork::new();
    LoopbackNetwork::connect(&alice_net, ALICE_SEES_BOB, &bob_net, BOB_SEES_ALICE);

    let alice = Arc::new(AvSession::new(alice_net, config.clone())?);
    let bob = Arc::new(AvSession::new(bob_net, config)?);

    let (alice_listener, alice_rx) = ChannelListener::new();
    let (bob_listener, mut bob_rx) = ChannelListener::new();
    alice.set_listener(Arc::new(alice_listener));
    bob.set_listener(Arc::new(bob_listener));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let alice_loop = tokio::spawn(drive(alice.clone(), shutdown_rx.clone()));
    let bob_loop = tokio::spawn(drive(bob.clone(), shutdown_rx));

    alice.call(ALICE_SEES_BOB, args.audio_rate, args.video_rate)?;

    // Bob answers with audio only, so Alice ends up receiving no video.
    match tokio::time::timeout(Duration::from_secs(2), bob_rx.recv()).await {
        Ok(Some(AvEvent::Call {
            friend,
            audio_enabled,
            video_enabled,
        })) => {
            info!(
                "Bob: incoming call from {} (audio: {}, video: {})",
                friend, audio_enabled, video_enabled
            );
            let state = bob.answer(friend, args.audio_rate, 0)?;
            info!("Bob: answered, now {:?}", state);
        }
        other => bail!("Bob never saw the call: {:?}", other),
    }

    let sender = tokio::spawn(feed_frames(alice.clone(), alice_rx));
    let receiver = tokio::spawn(count_frames(bob_rx));

    tokio::time::sleep(Duration::from_secs(args.seconds)).await;

    if args.video_rate > 0 {
        let report = alice.set_bit_rate(ALICE_SEES_BOB, MediaKind::Video, 0, true)?;
        info!(
            "Alice: video rate now {} kb/s (stable: {})",
            report.bit_rate, report.stable
        );
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let state = alice.control(ALICE_SEES_BOB, CallControl::Cancel)?;
    info!("Alice: hung up, now {:?}", state);
    tokio::time::sleep(Duration::from_millis(300)).await;

    shutdown_tx.send(true).ok();
    alice_loop.await?;
    bob_loop.await?;

    alice.close();
    bob.close();
    let sent = sender.await?;
    let (audio, video) = receiver.await?;
    info!(
        "Alice sent {} frames, Bob received {} audio and {} video frames",
        sent, audio, video
    );
    Ok(())
}

/// Answer frame requests with silence and a flat grey picture until the
/// session drops its listener.
async fn feed_frames(session: Arc<AvSession>, mut rx: mpsc::UnboundedReceiver<AvEvent>) -> usize {
    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 48;
    let pcm = vec![0i16; 960];
    let y = vec![0x80u8; (WIDTH * HEIGHT) as usize];
    let uv = vec![0x80u8; (WIDTH * HEIGHT / 4) as usize];

    let mut sent = 0;
    while let Some(event) = rx.recv().await {
        let result = match event {
            AvEvent::RequestAudioFrame { friend } => {
                session.send_audio_frame(friend, &AudioFrame::new(&pcm, 960, 1, 48000))
            }
            AvEvent::RequestVideoFrame { friend } => session
                .send_video_frame(friend, &VideoFrame::new(WIDTH, HEIGHT, &y, &uv, &uv)),
            AvEvent::CallState { friend, state } => {
                info!("Alice: call with {} is now {:?}", friend, state);
                continue;
            }
            _ => continue,
        };
        match result {
            Ok(()) => sent += 1,
            Err(e) => warn!("Alice: frame not sent: {}", e),
        }
    }
    sent
}

async fn count_frames(mut rx: mpsc::UnboundedReceiver<AvEvent>) -> (usize, usize) {
    let (mut audio, mut video) = (0, 0);
    while let Some(event) = rx.recv().await {
        match event {
            AvEvent::AudioFrame { .. } => audio += 1,
            AvEvent::VideoFrame { .. } => video += 1,
            AvEvent::CallState { friend, state } => {
                info!("Bob: call with {} is now {:?}", friend, state);
                if state.is_terminal() {
                    break;
                }
            }
            _ => {}
        }
    }
    (audio, video)
}
