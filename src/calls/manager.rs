//! The AV session: one per peer-network instance, owning every call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};

use super::bitrate::{BitRateNegotiator, BitRateReport};
use super::control::apply_control;
use super::error::{
    AnswerError, BitRateError, CallError, ControlError, NewError, SendFrameError,
};
use super::events::{AvEvent, AvListener, EventDispatcher};
use super::handler::{check_connectivity, handle_inbound, is_answerable, request_frames};
use super::media::transfer::FrameTransferChannel;
use super::media::{AudioFrame, VideoFrame};
use super::registry::{CallRegistry, RegistryError};
use super::scheduler::{IterationScheduler, interval_for};
use super::signaling::{CallControl, MediaKind, SignalMessage};
use super::state::{CallSession, CallState, CallTransition};
use crate::config::AvConfig;
use crate::network::{FriendNumber, PeerNetwork};

/// Audio/video calling on top of a peer network.
///
/// Application calls and [`AvSession::iterate`] serialize on one registry
/// lock. Listener callbacks run after that lock is released, so they may
/// call back into the session. The closed flag only flips while that lock
/// is held, so an operation that got the lock before [`AvSession::close`]
/// finishes before the registry is drained.
pub struct AvSession {
    registry: Mutex<CallRegistry>,
    network: Arc<dyn PeerNetwork>,
    config: AvConfig,
    dispatcher: EventDispatcher,
    scheduler: IterationScheduler,
    closed: AtomicBool,
}

impl std::fmt::Debug for AvSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvSession")
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl AvSession {
    /// Attach a new AV session to `network`.
    ///
    /// Fails with [`NewError::Multiple`] if the network already carries one.
    pub fn new(network: Arc<dyn PeerNetwork>, config: AvConfig) -> Result<Self, NewError> {
        config.validate()?;
        if !network.attach_av() {
            return Err(NewError::Multiple);
        }
        info!("AV session attached");
        Ok(Self {
            registry: Mutex::new(CallRegistry::new()),
            network,
            config,
            dispatcher: EventDispatcher::new(),
            scheduler: IterationScheduler::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &AvConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, CallRegistry> {
        self.registry.lock().expect("Mutex should not be poisoned")
    }

    /// The registry, or `None` once the session is closed.
    fn open_registry(&self) -> Option<MutexGuard<'_, CallRegistry>> {
        let registry = self.lock();
        (!self.is_closed()).then_some(registry)
    }

    /// Place a call. A rate of 0 disables that stream.
    pub fn call(
        &self,
        friend: FriendNumber,
        audio_bit_rate: u32,
        video_bit_rate: u32,
    ) -> Result<(), CallError> {
        let mut registry = self.open_registry().ok_or(CallError::Closed)?;

        if !self.network.friend_exists(friend) {
            return Err(CallError::FriendNotFound(friend));
        }
        if registry.is_in_call(friend) {
            return Err(CallError::FriendAlreadyInCall(friend));
        }
        if !self.network.friend_connection_status(friend).is_connected() {
            return Err(CallError::FriendNotConnected(friend));
        }
        for (kind, rate) in [
            (MediaKind::Audio, audio_bit_rate),
            (MediaKind::Video, video_bit_rate),
        ] {
            if !self.config.is_supported_bit_rate(kind, rate) {
                return Err(CallError::InvalidBitRate(rate));
            }
        }

        // Reserve the slot before signaling so a failed push leaves nothing behind.
        registry
            .create(CallSession::new_outgoing(
                friend,
                audio_bit_rate,
                video_bit_rate,
            ))
            .map_err(|e| match e {
                RegistryError::AlreadyInCall(f) => CallError::FriendAlreadyInCall(f),
                RegistryError::Malloc => CallError::Malloc,
            })?;

        let invite = SignalMessage::Invite {
            audio_bit_rate,
            video_bit_rate,
        };
        if let Err(e) = self.network.send_signal(friend, &invite) {
            registry.remove(friend);
            return Err(e.into());
        }

        info!(
            "Calling {} (audio {} kb/s, video {} kb/s)",
            friend, audio_bit_rate, video_bit_rate
        );
        Ok(())
    }

    /// Answer an incoming call with our own sending rates.
    pub fn answer(
        &self,
        friend: FriendNumber,
        audio_bit_rate: u32,
        video_bit_rate: u32,
    ) -> Result<CallState, AnswerError> {
        let mut registry = self.open_registry().ok_or(AnswerError::Closed)?;

        if !self.network.friend_exists(friend) {
            return Err(AnswerError::FriendNotFound(friend));
        }
        let session = match registry.active_mut(friend) {
            Some(s) if is_answerable(s) => s,
            _ => return Err(AnswerError::FriendNotCalling(friend)),
        };
        for (kind, rate) in [
            (MediaKind::Audio, audio_bit_rate),
            (MediaKind::Video, video_bit_rate),
        ] {
            if !self.config.is_supported_bit_rate(kind, rate) {
                return Err(AnswerError::InvalidBitRate(rate));
            }
        }

        self.network
            .open_media(friend, audio_bit_rate, video_bit_rate)
            .map_err(|e| AnswerError::CodecInit(e.to_string()))?;
        let answer = SignalMessage::Answer {
            audio_bit_rate,
            video_bit_rate,
        };
        if let Err(e) = self.network.send_signal(friend, &answer) {
            // Still ringing; a later answer opens the media again.
            self.network.close_media(friend);
            return Err(e.into());
        }

        let state = session
            .apply_transition(CallTransition::LocalAnswered {
                audio_bit_rate,
                video_bit_rate,
            })
            .map_err(|_| AnswerError::FriendNotCalling(friend))?;
        info!("Answered {}, now {:?}", friend, state);
        Ok(state)
    }

    /// Send a call-control command. Returns the resulting state.
    pub fn control(
        &self,
        friend: FriendNumber,
        control: CallControl,
    ) -> Result<CallState, ControlError> {
        let mut registry = self.open_registry().ok_or(ControlError::Closed)?;
        apply_control(&mut registry, self.network.as_ref(), friend, control)
    }

    /// Change one of our sending rates. The report is also delivered to the
    /// listener through `on_bit_rate_status` before this returns.
    ///
    /// Delivery is not ordered against an `iterate()` running on another
    /// thread: its batch may reach the listener before or after this report,
    /// and may describe state from either side of this change. Read
    /// [`AvSession::session`] for the current rates.
    pub fn set_bit_rate(
        &self,
        friend: FriendNumber,
        kind: MediaKind,
        bit_rate: u32,
        force: bool,
    ) -> Result<BitRateReport, BitRateError> {
        let report = {
            let mut registry = self.open_registry().ok_or(BitRateError::Closed)?;
            BitRateNegotiator {
                network: self.network.as_ref(),
                config: &self.config,
            }
            .set_bit_rate(&mut registry, friend, kind, bit_rate, force)?
        };
        self.dispatcher.dispatch(vec![AvEvent::BitRateStatus(report)]);
        Ok(report)
    }

    pub fn send_audio_frame(
        &self,
        friend: FriendNumber,
        frame: &AudioFrame<'_>,
    ) -> Result<(), SendFrameError> {
        let registry = self.open_registry().ok_or(SendFrameError::Closed)?;
        self.channel().send_audio(&registry, friend, frame)
    }

    pub fn send_video_frame(
        &self,
        friend: FriendNumber,
        frame: &VideoFrame<'_>,
    ) -> Result<(), SendFrameError> {
        let registry = self.open_registry().ok_or(SendFrameError::Closed)?;
        self.channel().send_video(&registry, friend, frame)
    }

    fn channel(&self) -> FrameTransferChannel<'_> {
        FrameTransferChannel {
            network: self.network.as_ref(),
            config: &self.config,
        }
    }

    /// Do one bounded round of protocol work and return how long to wait
    /// before the next call.
    pub fn iterate(&self) -> Duration {
        if self.is_closed() {
            return self.config.idle_interval();
        }
        let Some(_guard) = self.scheduler.enter() else {
            debug!("iterate() reentered, skipping");
            return self.iteration_interval();
        };

        let mut events = Vec::new();
        let interval = {
            let Some(mut registry) = self.open_registry() else {
                return self.config.idle_interval();
            };

            for _ in 0..self.config.max_inbound_per_iteration {
                let Some(item) = self.network.poll_inbound() else {
                    break;
                };
                handle_inbound(&mut registry, &self.config, item, &mut events);
            }

            check_connectivity(&mut registry, self.network.as_ref(), &mut events);

            let reaped = registry.reap();
            if !reaped.is_empty() {
                debug!("Reaped finished calls: {:?}", reaped);
            }
            for friend in reaped {
                self.network.close_media(friend);
            }

            request_frames(&registry, &mut events);
            interval_for(&registry, &self.config)
        };

        self.dispatcher.dispatch(events);
        interval
    }

    /// The interval `iterate()` would currently return, without doing work.
    pub fn iteration_interval(&self) -> Duration {
        match self.open_registry() {
            Some(registry) => interval_for(&registry, &self.config),
            None => self.config.idle_interval(),
        }
    }

    /// Replace the listener. Takes effect from the next dispatched batch.
    pub fn set_listener(&self, listener: Arc<dyn AvListener>) {
        self.dispatcher.set_listener(listener);
    }

    /// Snapshot of the session with `friend`, including tombstones not yet reaped.
    pub fn session(&self, friend: FriendNumber) -> Option<CallSession> {
        self.lock().get(friend).cloned()
    }

    pub fn call_state(&self, friend: FriendNumber) -> Option<CallState> {
        self.lock().get(friend).map(|s| s.state)
    }

    /// Hang up every call and detach from the network. Later calls are no-ops.
    pub fn close(&self) {
        let sessions = {
            let mut registry = self.lock();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            registry.drain()
        };
        for session in &sessions {
            let friend = session.friend_number;
            if !session.state.is_terminal() {
                if let Err(e) = self.network.send_signal(friend, &SignalMessage::hang_up()) {
                    warn!("Hang-up for {} not delivered on close: {}", friend, e);
                }
            }
            self.network.close_media(friend);
        }
        self.dispatcher.reset_listener();
        self.network.detach_av();
        info!("AV session closed ({} calls dropped)", sessions.len());
    }
}

impl Drop for AvSession {
    fn drop(&mut self) {
        self.close();
    }
}
