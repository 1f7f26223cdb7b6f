//! Event fan-out to the application.

use std::sync::{Arc, RwLock};

use log::debug;
use tokio::sync::mpsc;

use super::bitrate::BitRateReport;
use super::media::{AudioFrame, OwnedAudioFrame, OwnedVideoFrame, VideoFrame};
use super::state::CallState;
use crate::network::FriendNumber;

/// Everything the AV layer reports to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvEvent {
    /// A friend is calling us.
    Call {
        friend: FriendNumber,
        audio_enabled: bool,
        video_enabled: bool,
    },
    /// The call with a friend changed state because of the peer or the network.
    CallState {
        friend: FriendNumber,
        state: CallState,
    },
    BitRateStatus(BitRateReport),
    AudioFrame {
        friend: FriendNumber,
        frame: OwnedAudioFrame,
    },
    VideoFrame {
        friend: FriendNumber,
        frame: OwnedVideoFrame,
    },
    /// The application should send the next audio frame for this friend.
    RequestAudioFrame { friend: FriendNumber },
    RequestVideoFrame { friend: FriendNumber },
}

impl AvEvent {
    pub fn friend(&self) -> FriendNumber {
        match self {
            Self::Call { friend, .. }
            | Self::CallState { friend, .. }
            | Self::AudioFrame { friend, .. }
            | Self::VideoFrame { friend, .. }
            | Self::RequestAudioFrame { friend }
            | Self::RequestVideoFrame { friend } => *friend,
            Self::BitRateStatus(report) => report.friend_number,
        }
    }

    /// Delivery phase within one batch: state, then frames, then requests.
    fn phase(&self) -> u8 {
        match self {
            Self::Call { .. } | Self::CallState { .. } | Self::BitRateStatus(_) => 0,
            Self::AudioFrame { .. } | Self::VideoFrame { .. } => 1,
            Self::RequestAudioFrame { .. } | Self::RequestVideoFrame { .. } => 2,
        }
    }
}

/// Callbacks an application can implement. Every method defaults to a no-op.
///
/// Callbacks run on the thread that drove the operation, after the session
/// lock is released, so they may call back into the session.
pub trait AvListener: Send + Sync {
    fn on_call(&self, _friend: FriendNumber, _audio_enabled: bool, _video_enabled: bool) {}

    fn on_call_state(&self, _friend: FriendNumber, _state: CallState) {}

    fn on_bit_rate_status(&self, _report: &BitRateReport) {}

    fn on_receive_audio_frame(&self, _friend: FriendNumber, _frame: &AudioFrame<'_>) {}

    fn on_receive_video_frame(&self, _friend: FriendNumber, _frame: &VideoFrame<'_>) {}

    fn on_request_audio_frame(&self, _friend: FriendNumber) {}

    fn on_request_video_frame(&self, _friend: FriendNumber) {}

    /// Single entry point used by the dispatcher. Override to consume the
    /// tagged event directly.
    fn on_event(&self, event: &AvEvent) {
        route(self, event);
    }
}

/// Route a tagged event to the matching callback.
pub fn route<L: AvListener + ?Sized>(listener: &L, event: &AvEvent) {
    match event {
        AvEvent::Call {
            friend,
            audio_enabled,
            video_enabled,
        } => listener.on_call(*friend, *audio_enabled, *video_enabled),
        AvEvent::CallState { friend, state } => listener.on_call_state(*friend, *state),
        AvEvent::BitRateStatus(report) => listener.on_bit_rate_status(report),
        AvEvent::AudioFrame { friend, frame } => {
            listener.on_receive_audio_frame(*friend, &frame.as_frame())
        }
        AvEvent::VideoFrame { friend, frame } => {
            listener.on_receive_video_frame(*friend, &frame.as_frame())
        }
        AvEvent::RequestAudioFrame { friend } => listener.on_request_audio_frame(*friend),
        AvEvent::RequestVideoFrame { friend } => listener.on_request_video_frame(*friend),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl AvListener for NoopListener {}

/// Forwards every event into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<AvEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AvEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AvListener for ChannelListener {
    fn on_event(&self, event: &AvEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("Event receiver dropped, discarding {:?}", event.friend());
        }
    }
}

/// Holds the session's single listener and delivers event batches to it.
pub(crate) struct EventDispatcher {
    listener: RwLock<Arc<dyn AvListener>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            listener: RwLock::new(Arc::new(NoopListener)),
        }
    }

    pub fn set_listener(&self, listener: Arc<dyn AvListener>) {
        *self
            .listener
            .write()
            .expect("RwLock should not be poisoned") = listener;
    }

    pub fn reset_listener(&self) {
        self.set_listener(Arc::new(NoopListener));
    }

    /// Deliver a batch in phase order. The sort is stable, so per-friend
    /// order inside a phase is the order the events were produced in.
    pub fn dispatch(&self, mut events: Vec<AvEvent>) {
        if events.is_empty() {
            return;
        }
        events.sort_by_key(AvEvent::phase);
        // Clone out so a callback replacing the listener cannot deadlock.
        let listener = self
            .listener
            .read()
            .expect("RwLock should not be poisoned")
            .clone();
        for event in &events {
            listener.on_event(event);
        }
    }
}
