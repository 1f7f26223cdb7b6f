//! Interface to the peer-network core the AV layer is built on.
//!
//! The core owns friend identity, connectivity, the reliable signaling
//! channel and the best-effort media channel. Everything here is a
//! non-blocking push or poll; the AV layer never waits on the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calls::media::MediaPayload;
use crate::calls::{MediaKind, SignalMessage};

/// Index of a peer in the local friend table.
///
/// Only meaningful within one running session: numbers are reused after a
/// friend is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FriendNumber(pub u32);

impl fmt::Display for FriendNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "friend#{}", self.0)
    }
}

impl From<u32> for FriendNumber {
    fn from(n: u32) -> Self {
        Self(n)
    }
}

/// How a friend is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    None,
    Tcp,
    Udp,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Something the peer-network core received on our behalf.
#[derive(Debug, Clone)]
pub enum Inbound {
    Signal {
        friend: FriendNumber,
        message: SignalMessage,
    },
    Media {
        friend: FriendNumber,
        payload: MediaPayload,
    },
}

impl Inbound {
    pub fn friend(&self) -> FriendNumber {
        match self {
            Self::Signal { friend, .. } | Self::Media { friend, .. } => *friend,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("{0} is not connected")]
    NotConnected(FriendNumber),

    #[error("{0} is not in the friend table")]
    UnknownFriend(FriendNumber),

    #[error("send queue full")]
    QueueFull,

    #[error("push rejected: {0}")]
    Rejected(String),
}

/// Capabilities consumed from the peer-network core.
pub trait PeerNetwork: Send + Sync {
    fn friend_exists(&self, friend: FriendNumber) -> bool;

    fn friend_connection_status(&self, friend: FriendNumber) -> ConnectionStatus;

    /// Reliable, ordered push of a signaling message.
    fn send_signal(&self, friend: FriendNumber, message: &SignalMessage)
    -> Result<(), NetworkError>;

    /// Best-effort push of a media payload. Never retried by the caller.
    fn send_media(&self, friend: FriendNumber, payload: MediaPayload) -> Result<(), NetworkError>;

    /// Pull the next pending inbound item, if any. Must not block.
    fn poll_inbound(&self) -> Option<Inbound>;

    /// Whether the link to `friend` can carry `bit_rate` kb/s of `kind`.
    fn is_link_stable(&self, _friend: FriendNumber, _kind: MediaKind, _bit_rate: u32) -> bool {
        true
    }

    /// Prepare codecs for an answered call.
    fn open_media(
        &self,
        _friend: FriendNumber,
        _audio_bit_rate: u32,
        _video_bit_rate: u32,
    ) -> Result<(), NetworkError> {
        Ok(())
    }

    /// Release whatever [`open_media`](Self::open_media) set up for `friend`.
    /// Also called for calls whose media was never opened.
    fn close_media(&self, _friend: FriendNumber) {}

    /// Claim the core for one AV session. Returns false if already claimed.
    fn attach_av(&self) -> bool {
        true
    }

    fn detach_av(&self) {}
}
