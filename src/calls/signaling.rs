//! Signaling messages exchanged with the peer over the reliable channel.
//!
//! Wire encoding is left to the peer-network core; these types derive serde
//! so the core can pick whatever format it already speaks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which media stream a bit rate or frame refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Audio => "audio",
            Self::Video => "video",
        })
    }
}

/// Control commands applicable to an existing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallControl {
    /// Resume a paused call.
    Resume = 0,
    /// Suspend both streams without ending the call.
    Pause = 1,
    /// Reject a ringing call or hang up an established one.
    Cancel = 2,
    /// Stop sending audio; the call stays up.
    MuteAudio = 3,
    UnmuteAudio = 4,
    /// Stop sending video; the call stays up.
    HideVideo = 5,
    ShowVideo = 6,
}

impl CallControl {
    pub const ALL: [CallControl; 7] = [
        Self::Resume,
        Self::Pause,
        Self::Cancel,
        Self::MuteAudio,
        Self::UnmuteAudio,
        Self::HideVideo,
        Self::ShowVideo,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Cancel => "cancel",
            Self::MuteAudio => "mute_audio",
            Self::UnmuteAudio => "unmute_audio",
            Self::HideVideo => "hide_video",
            Self::ShowVideo => "show_video",
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        Self::ALL.get(v as usize).copied()
    }
}

impl fmt::Display for CallControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a [`SignalMessage`], for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SignalingType {
    Invite = 1,
    Answer = 2,
    Control = 3,
    BitRate = 4,
}

impl SignalingType {
    pub const fn tag_name(&self) -> &'static str {
        match self {
            Self::Invite => "invite",
            Self::Answer => "answer",
            Self::Control => "control",
            Self::BitRate => "bit_rate",
        }
    }
}

impl fmt::Display for SignalingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag_name())
    }
}

/// A call-control message for one friend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalMessage {
    /// Start a call. Rates are what the caller intends to send; 0 disables.
    Invite {
        audio_bit_rate: u32,
        video_bit_rate: u32,
    },
    /// Accept a ringing call with the callee's sending rates.
    Answer {
        audio_bit_rate: u32,
        video_bit_rate: u32,
    },
    Control(CallControl),
    /// The sender changed the rate of one of its streams.
    BitRate { kind: MediaKind, bit_rate: u32 },
}

impl SignalMessage {
    pub fn signaling_type(&self) -> SignalingType {
        match self {
            Self::Invite { .. } => SignalingType::Invite,
            Self::Answer { .. } => SignalingType::Answer,
            Self::Control(_) => SignalingType::Control,
            Self::BitRate { .. } => SignalingType::BitRate,
        }
    }

    pub fn hang_up() -> Self {
        Self::Control(CallControl::Cancel)
    }
}
