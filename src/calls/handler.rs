//! Inbound signaling and media handling, driven by `iterate()`.

use log::{debug, info, warn};

use super::bitrate::apply_peer_bit_rate;
use super::events::AvEvent;
use super::media::transfer::admit_inbound;
use super::registry::{CallRegistry, RegistryError};
use super::signaling::{CallControl, SignalMessage};
use super::state::{CallDirection, CallSession, CallTransition};
use crate::config::AvConfig;
use crate::network::{FriendNumber, Inbound, PeerNetwork};

pub(crate) fn handle_inbound(
    registry: &mut CallRegistry,
    config: &AvConfig,
    item: Inbound,
    events: &mut Vec<AvEvent>,
) {
    match item {
        Inbound::Signal { friend, message } => {
            debug!(
                "Received call signaling: {} from {}",
                message.signaling_type(),
                friend
            );
            handle_signal(registry, friend, message, events);
        }
        Inbound::Media { friend, payload } => {
            if let Some(event) = admit_inbound(registry, config, friend, payload) {
                events.push(event);
            }
        }
    }
}

fn handle_signal(
    registry: &mut CallRegistry,
    friend: FriendNumber,
    message: SignalMessage,
    events: &mut Vec<AvEvent>,
) {
    match message {
        SignalMessage::Invite {
            audio_bit_rate,
            video_bit_rate,
        } => handle_invite(registry, friend, audio_bit_rate, video_bit_rate, events),
        SignalMessage::Answer {
            audio_bit_rate,
            video_bit_rate,
        } => {
            let Some(session) = registry.active_mut(friend) else {
                debug!("Answer from {} without a call, ignoring", friend);
                return;
            };
            let transition = CallTransition::RemoteAnswered {
                audio_bit_rate,
                video_bit_rate,
            };
            let state = match session.apply_transition(transition) {
                Ok(state) => {
                    info!("{} answered, now {:?}", friend, state);
                    state
                }
                Err(e) => {
                    warn!("Protocol violation from {}: {}", friend, e);
                    fault(session)
                }
            };
            events.push(AvEvent::CallState { friend, state });
        }
        SignalMessage::Control(control) => handle_control(registry, friend, control, events),
        SignalMessage::BitRate { kind, bit_rate } => {
            if apply_peer_bit_rate(registry, friend, kind, bit_rate).is_none() {
                debug!("Bit rate from {} without a call, ignoring", friend);
            }
        }
    }
}

fn handle_invite(
    registry: &mut CallRegistry,
    friend: FriendNumber,
    audio_bit_rate: u32,
    video_bit_rate: u32,
    events: &mut Vec<AvEvent>,
) {
    let session = CallSession::new_incoming(friend, audio_bit_rate, video_bit_rate);
    match registry.create(session) {
        Ok(_) => {
            info!(
                "Incoming call from {} (audio {} kb/s, video {} kb/s)",
                friend, audio_bit_rate, video_bit_rate
            );
            events.push(AvEvent::Call {
                friend,
                audio_enabled: audio_bit_rate > 0,
                video_enabled: video_bit_rate > 0,
            });
        }
        Err(RegistryError::AlreadyInCall(_)) => {
            warn!("Invite from {} while already in a call, ignoring", friend);
        }
        Err(RegistryError::Malloc) => {
            warn!("Dropping invite from {}: allocation failed", friend);
        }
    }
}

fn handle_control(
    registry: &mut CallRegistry,
    friend: FriendNumber,
    control: CallControl,
    events: &mut Vec<AvEvent>,
) {
    let Some(session) = registry.active_mut(friend) else {
        debug!("{} from {} without a call, ignoring", control, friend);
        return;
    };

    let transition = match control {
        CallControl::Cancel => CallTransition::Cancel,
        CallControl::Pause => CallTransition::Pause,
        CallControl::Resume => CallTransition::Resume,
        CallControl::MuteAudio
        | CallControl::UnmuteAudio
        | CallControl::HideVideo
        | CallControl::ShowVideo => {
            debug!("{} toggled {} on its side", friend, control);
            return;
        }
    };

    match session.apply_transition(transition) {
        Ok(state) => {
            info!("{} sent {}, now {:?}", friend, control, state);
            events.push(AvEvent::CallState { friend, state });
        }
        Err(e) => debug!("Ignoring {} from {}: {}", control, friend, e),
    }
}

/// End calls whose friend vanished and fail calls whose friend went offline.
pub(crate) fn check_connectivity(
    registry: &mut CallRegistry,
    network: &dyn PeerNetwork,
    events: &mut Vec<AvEvent>,
) {
    for friend in registry.friends() {
        let Some(session) = registry.active_mut(friend) else {
            continue;
        };
        if !network.friend_exists(friend) {
            info!("{} removed from friend table, ending call", friend);
            if let Ok(state) = session.apply_transition(CallTransition::Cancel) {
                events.push(AvEvent::CallState { friend, state });
            }
        } else if !network.friend_connection_status(friend).is_connected() {
            warn!("{} went offline during call", friend);
            let state = fault(session);
            events.push(AvEvent::CallState { friend, state });
        }
    }
}

/// Ask the application for the next frame of every stream that may send.
pub(crate) fn request_frames(registry: &CallRegistry, events: &mut Vec<AvEvent>) {
    use super::signaling::MediaKind;

    let mut friends: Vec<_> = registry.iter().collect();
    friends.sort_by_key(|s| s.friend_number);
    for session in friends {
        let friend = session.friend_number;
        if session.can_send(MediaKind::Audio) {
            events.push(AvEvent::RequestAudioFrame { friend });
        }
        if session.can_send(MediaKind::Video) {
            events.push(AvEvent::RequestVideoFrame { friend });
        }
    }
}

fn fault(session: &mut CallSession) -> super::state::CallState {
    session
        .apply_transition(CallTransition::Fault)
        .unwrap_or(session.state)
}

/// Incoming ringing call that we may answer.
pub(crate) fn is_answerable(session: &CallSession) -> bool {
    session.state.is_ringing() && session.direction == CallDirection::Incoming
}
