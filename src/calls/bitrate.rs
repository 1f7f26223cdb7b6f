//! Bit-rate negotiation for running calls.

use log::{debug, info};
use serde::Serialize;

use super::error::BitRateError;
use super::registry::CallRegistry;
use super::signaling::{MediaKind, SignalMessage};
use super::state::{CallState, CallTransition};
use crate::config::AvConfig;
use crate::network::{FriendNumber, PeerNetwork};

/// Outcome of a bit-rate change, reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitRateReport {
    pub friend_number: FriendNumber,
    pub kind: MediaKind,
    /// False if the link could not carry the requested rate.
    pub stable: bool,
    /// The applied rate when stable, the last stable rate otherwise.
    pub bit_rate: u32,
}

pub(crate) struct BitRateNegotiator<'a> {
    pub network: &'a dyn PeerNetwork,
    pub config: &'a AvConfig,
}

impl BitRateNegotiator<'_> {
    /// Apply or refuse a rate change. Either way a report is returned for
    /// the application; the session is only touched when `stable` is true.
    pub fn set_bit_rate(
        &self,
        registry: &mut CallRegistry,
        friend: FriendNumber,
        kind: MediaKind,
        bit_rate: u32,
        force: bool,
    ) -> Result<BitRateReport, BitRateError> {
        if !self.network.friend_exists(friend) {
            return Err(BitRateError::FriendNotFound(friend));
        }
        let session = match registry.active_mut(friend) {
            Some(s) if !s.state.is_ringing() => s,
            _ => return Err(BitRateError::FriendNotInCall(friend)),
        };
        if !self.config.is_supported_bit_rate(kind, bit_rate) {
            return Err(BitRateError::InvalidBitRate(bit_rate));
        }

        let current = match kind {
            MediaKind::Audio => session.audio_bit_rate,
            MediaKind::Video => session.video_bit_rate,
        };

        if !force && bit_rate != 0 && !self.network.is_link_stable(friend, kind, bit_rate) {
            debug!(
                "Link to {} unstable at {} kb/s {}, keeping {}",
                friend, bit_rate, kind, current
            );
            return Ok(BitRateReport {
                friend_number: friend,
                kind,
                stable: false,
                bit_rate: current,
            });
        }

        self.network
            .send_signal(friend, &SignalMessage::BitRate { kind, bit_rate })?;

        match kind {
            MediaKind::Audio => session.audio_bit_rate = bit_rate,
            MediaKind::Video => session.video_bit_rate = bit_rate,
        }
        let state = session
            .apply_transition(CallTransition::RatesChanged)
            .unwrap_or(session.state);
        info!(
            "{} {} bit rate {} -> {} kb/s, state {:?}",
            friend, kind, current, bit_rate, state
        );

        Ok(BitRateReport {
            friend_number: friend,
            kind,
            stable: true,
            bit_rate,
        })
    }
}

/// Record a rate announced by the peer.
pub(crate) fn apply_peer_bit_rate(
    registry: &mut CallRegistry,
    friend: FriendNumber,
    kind: MediaKind,
    bit_rate: u32,
) -> Option<CallState> {
    let session = registry.active_mut(friend)?;
    match kind {
        MediaKind::Audio => session.peer_audio_bit_rate = bit_rate,
        MediaKind::Video => session.peer_video_bit_rate = bit_rate,
    }
    debug!("{} now sends {} at {} kb/s", friend, kind, bit_rate);
    Some(session.state)
}
