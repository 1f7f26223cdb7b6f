//! Outgoing frame validation and push, inbound frame admission.

use log::{debug, warn};

use super::frame::{AudioFrame, FrameError, MediaPayload, VideoFrame};
use crate::calls::MediaKind;
use crate::calls::error::SendFrameError;
use crate::calls::events::AvEvent;
use crate::calls::registry::CallRegistry;
use crate::config::AvConfig;
use crate::network::{FriendNumber, PeerNetwork};

impl From<FrameError> for SendFrameError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::MissingPlane(what) => SendFrameError::Null(what),
            FrameError::Alloc => SendFrameError::Malloc,
            other => SendFrameError::Invalid(other.to_string()),
        }
    }
}

/// Pushes validated frames to the media channel of the peer network.
pub(crate) struct FrameTransferChannel<'a> {
    pub network: &'a dyn PeerNetwork,
    pub config: &'a AvConfig,
}

impl FrameTransferChannel<'_> {
    pub fn send_audio(
        &self,
        registry: &CallRegistry,
        friend: FriendNumber,
        frame: &AudioFrame<'_>,
    ) -> Result<(), SendFrameError> {
        if frame.pcm.is_empty() {
            return Err(SendFrameError::Null("pcm"));
        }
        self.check_call(registry, friend)?;
        frame.validate(self.config)?;
        self.check_enabled(registry, friend, MediaKind::Audio)?;

        let owned = frame.to_owned_frame(self.config)?;
        self.push(friend, MediaPayload::Audio(owned))
    }

    pub fn send_video(
        &self,
        registry: &CallRegistry,
        friend: FriendNumber,
        frame: &VideoFrame<'_>,
    ) -> Result<(), SendFrameError> {
        frame.check_planes()?;
        self.check_call(registry, friend)?;
        frame.validate()?;
        self.check_enabled(registry, friend, MediaKind::Video)?;

        let owned = frame.to_owned_frame()?;
        self.push(friend, MediaPayload::Video(owned))
    }

    fn check_call(
        &self,
        registry: &CallRegistry,
        friend: FriendNumber,
    ) -> Result<(), SendFrameError> {
        if !self.network.friend_exists(friend) {
            return Err(SendFrameError::FriendNotFound(friend));
        }
        match registry.active(friend) {
            Some(session) if !session.state.is_ringing() => Ok(()),
            _ => Err(SendFrameError::FriendNotInCall(friend)),
        }
    }

    fn check_enabled(
        &self,
        registry: &CallRegistry,
        friend: FriendNumber,
        kind: MediaKind,
    ) -> Result<(), SendFrameError> {
        match registry.active(friend) {
            Some(session) if session.can_send(kind) => Ok(()),
            Some(_) => Err(SendFrameError::PayloadTypeDisabled),
            None => Err(SendFrameError::FriendNotInCall(friend)),
        }
    }

    fn push(&self, friend: FriendNumber, payload: MediaPayload) -> Result<(), SendFrameError> {
        let kind = payload.kind();
        self.network.send_media(friend, payload).map_err(|e| {
            debug!("Dropping {} frame for {}: {}", kind, friend, e);
            SendFrameError::RtpFailed(e)
        })
    }
}

/// Turn an inbound media payload into a frame event, or drop it.
///
/// Frames are only delivered for calls that are established and not paused;
/// anything else, or a frame violating the structural contract, is dropped.
pub(crate) fn admit_inbound(
    registry: &CallRegistry,
    config: &AvConfig,
    friend: FriendNumber,
    payload: MediaPayload,
) -> Option<AvEvent> {
    let Some(session) = registry.active(friend) else {
        debug!("Dropping {} frame from {}: no call", payload.kind(), friend);
        return None;
    };
    if !session.state.is_established() {
        debug!(
            "Dropping {} frame from {} in state {:?}",
            payload.kind(),
            friend,
            session.state
        );
        return None;
    }

    let checked = match &payload {
        MediaPayload::Audio(frame) => frame.as_frame().validate(config),
        MediaPayload::Video(frame) => frame.as_frame().validate(),
    };
    if let Err(e) = checked {
        warn!("Malformed {} frame from {}: {}", payload.kind(), friend, e);
        return None;
    }

    Some(match payload {
        MediaPayload::Audio(frame) => AvEvent::AudioFrame { friend, frame },
        MediaPayload::Video(frame) => AvEvent::VideoFrame { friend, frame },
    })
}
