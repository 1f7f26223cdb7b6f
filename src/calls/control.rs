//! Validation and application of local call-control commands.

use log::{info, warn};

use super::error::ControlError;
use super::registry::CallRegistry;
use super::signaling::{CallControl, SignalMessage};
use super::state::{CallState, CallTransition};
use crate::network::{FriendNumber, PeerNetwork};

/// Apply `control` to the call with `friend` and tell the peer about it.
///
/// The session is only changed once the signal has been pushed, except for
/// `Cancel`, which always ends the call locally.
pub(crate) fn apply_control(
    registry: &mut CallRegistry,
    network: &dyn PeerNetwork,
    friend: FriendNumber,
    control: CallControl,
) -> Result<CallState, ControlError> {
    if !network.friend_exists(friend) {
        return Err(ControlError::FriendNotFound(friend));
    }
    let session = registry
        .active_mut(friend)
        .ok_or(ControlError::FriendNotInCall(friend))?;

    let state = session.state;
    if state.is_ringing() && control != CallControl::Cancel {
        return Err(ControlError::FriendNotInCall(friend));
    }

    let invalid = || ControlError::InvalidTransition { state, control };
    if control == CallControl::Cancel {
        if let Err(e) = network.send_signal(friend, &SignalMessage::hang_up()) {
            warn!("Hang-up for {} not delivered: {}", friend, e);
        }
        let new_state = session
            .apply_transition(CallTransition::Cancel)
            .map_err(|_| invalid())?;
        info!("Call with {} cancelled from {:?}", friend, state);
        return Ok(new_state);
    }

    let transition = match control {
        CallControl::Pause if state.is_paused() => {
            return Err(ControlError::AlreadyPaused(friend));
        }
        CallControl::Pause => Some(CallTransition::Pause),
        CallControl::Resume if !state.is_paused() => return Err(invalid()),
        CallControl::Resume => Some(CallTransition::Resume),
        CallControl::MuteAudio if session.audio_muted => return Err(invalid()),
        CallControl::UnmuteAudio if !session.audio_muted => return Err(invalid()),
        CallControl::HideVideo if session.video_hidden => return Err(invalid()),
        CallControl::ShowVideo if !session.video_hidden => return Err(invalid()),
        _ => None,
    };

    network.send_signal(friend, &SignalMessage::Control(control))?;

    let new_state = match transition {
        Some(transition) => session
            .apply_transition(transition)
            .map_err(|_| invalid())?,
        None => {
            match control {
                CallControl::MuteAudio => session.audio_muted = true,
                CallControl::UnmuteAudio => session.audio_muted = false,
                CallControl::HideVideo => session.video_hidden = true,
                CallControl::ShowVideo => session.video_hidden = false,
                _ => {}
            }
            state
        }
    };
    info!("{} applied to call with {}: {:?} -> {:?}", control, friend, state, new_state);
    Ok(new_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::state::CallSession;
    use crate::loopback::LoopbackNetwork;
    use crate::network::ConnectionStatus;
    use std::sync::Arc;

    fn setup() -> (Arc<LoopbackNetwork>, CallRegistry) {
        let network = LoopbackNetwork::new();
        network.add_friend(FriendNumber(1), ConnectionStatus::Udp);
        network.add_friend(FriendNumber(2), ConnectionStatus::Udp);
        let mut registry = CallRegistry::new();
        registry
            .create(CallSession::new_outgoing(FriendNumber(1), 64, 500))
            .unwrap()
            .apply_transition(CallTransition::RemoteAnswered {
                audio_bit_rate: 64,
                video_bit_rate: 500,
            })
            .unwrap();
        (network, registry)
    }

    #[test]
    fn test_pause_twice_fails_already_paused() {
        let (network, mut registry) = setup();
        let state = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Pause)
            .unwrap();
        assert_eq!(state, CallState::Paused);

        let err = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Pause)
            .unwrap_err();
        assert!(matches!(err, ControlError::AlreadyPaused(f) if f == FriendNumber(1)));
    }

    #[test]
    fn test_resume_requires_pause() {
        let (network, mut registry) = setup();
        let err = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Resume)
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::InvalidTransition {
                state: CallState::SendingAv,
                control: CallControl::Resume
            }
        ));

        apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Pause).unwrap();
        let state = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Resume)
            .unwrap();
        assert_eq!(state, CallState::SendingAv);
    }

    #[test]
    fn test_unknown_friend_and_no_call() {
        let (network, mut registry) = setup();
        let err = apply_control(&mut registry, &*network, FriendNumber(9), CallControl::Cancel)
            .unwrap_err();
        assert!(matches!(err, ControlError::FriendNotFound(_)));

        let err = apply_control(&mut registry, &*network, FriendNumber(2), CallControl::Cancel)
            .unwrap_err();
        assert!(matches!(err, ControlError::FriendNotInCall(_)));
    }

    #[test]
    fn test_ringing_only_accepts_cancel() {
        let (network, mut registry) = setup();
        registry
            .create(CallSession::new_outgoing(FriendNumber(2), 64, 0))
            .unwrap();

        for control in [CallControl::Pause, CallControl::Resume, CallControl::MuteAudio] {
            let err =
                apply_control(&mut registry, &*network, FriendNumber(2), control).unwrap_err();
            assert!(matches!(err, ControlError::FriendNotInCall(_)));
        }
        let state = apply_control(&mut registry, &*network, FriendNumber(2), CallControl::Cancel)
            .unwrap();
        assert_eq!(state, CallState::End);

        // The tombstone no longer counts as a call.
        let err = apply_control(&mut registry, &*network, FriendNumber(2), CallControl::Cancel)
            .unwrap_err();
        assert!(matches!(err, ControlError::FriendNotInCall(_)));
    }

    #[test]
    fn test_mute_toggles() {
        let (network, mut registry) = setup();
        apply_control(&mut registry, &*network, FriendNumber(1), CallControl::MuteAudio).unwrap();
        assert!(registry.get(FriendNumber(1)).unwrap().audio_muted);

        let err = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::MuteAudio)
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));

        apply_control(&mut registry, &*network, FriendNumber(1), CallControl::UnmuteAudio).unwrap();
        assert!(!registry.get(FriendNumber(1)).unwrap().audio_muted);
    }

    #[test]
    fn test_signal_failure_leaves_state() {
        let (network, mut registry) = setup();
        network.set_connection_status(FriendNumber(1), ConnectionStatus::None);

        let err = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Pause)
            .unwrap_err();
        assert!(matches!(err, ControlError::Signaling(_)));
        assert_eq!(
            registry.get(FriendNumber(1)).unwrap().state,
            CallState::SendingAv
        );

        // Cancel still ends the call locally.
        let state = apply_control(&mut registry, &*network, FriendNumber(1), CallControl::Cancel)
            .unwrap();
        assert_eq!(state, CallState::End);
    }
}
