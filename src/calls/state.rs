//! Call state machine implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::network::FriendNumber;

/// Current state of a call with one friend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CallState {
    /// Outgoing call awaiting answer, or incoming call awaiting local answer.
    Ringing,
    /// Established, neither stream active.
    NotSending,
    /// Established, audio only.
    SendingA,
    /// Established, video only.
    SendingV,
    /// Established, audio and video.
    SendingAv,
    /// Suspended by either side.
    Paused,
    /// Terminated normally.
    End,
    /// Terminated abnormally.
    Error,
}

impl CallState {
    /// Sending classification for an established call.
    pub fn classify(audio_bit_rate: u32, video_bit_rate: u32) -> Self {
        match (audio_bit_rate > 0, video_bit_rate > 0) {
            (true, true) => Self::SendingAv,
            (true, false) => Self::SendingA,
            (false, true) => Self::SendingV,
            (false, false) => Self::NotSending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End | Self::Error)
    }

    pub fn is_ringing(&self) -> bool {
        matches!(self, Self::Ringing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Answered and not paused.
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            Self::NotSending | Self::SendingA | Self::SendingV | Self::SendingAv
        )
    }

    pub fn sends_audio(&self) -> bool {
        matches!(self, Self::SendingA | Self::SendingAv)
    }

    pub fn sends_video(&self) -> bool {
        matches!(self, Self::SendingV | Self::SendingAv)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// State transitions for calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTransition {
    /// We answered an incoming call with these sending rates.
    LocalAnswered {
        audio_bit_rate: u32,
        video_bit_rate: u32,
    },
    /// The peer answered our call with its sending rates.
    RemoteAnswered {
        audio_bit_rate: u32,
        video_bit_rate: u32,
    },
    Pause,
    Resume,
    /// One of our sending rates changed.
    RatesChanged,
    /// Local cancel or remote hang-up.
    Cancel,
    /// Unrecoverable fault.
    Fault,
}

/// One call with one friend.
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub friend_number: FriendNumber,
    pub direction: CallDirection,
    pub state: CallState,
    /// Our sending rates in kb/s; 0 disables the stream.
    pub audio_bit_rate: u32,
    pub video_bit_rate: u32,
    /// Rates last announced by the peer.
    pub peer_audio_bit_rate: u32,
    pub peer_video_bit_rate: u32,
    /// Classification to restore on resume.
    pub paused_from: Option<CallState>,
    pub audio_muted: bool,
    pub video_hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new_outgoing(
        friend_number: FriendNumber,
        audio_bit_rate: u32,
        video_bit_rate: u32,
    ) -> Self {
        Self {
            friend_number,
            direction: CallDirection::Outgoing,
            state: CallState::Ringing,
            audio_bit_rate,
            video_bit_rate,
            peer_audio_bit_rate: 0,
            peer_video_bit_rate: 0,
            paused_from: None,
            audio_muted: false,
            video_hidden: false,
            created_at: Utc::now(),
        }
    }

    pub fn new_incoming(
        friend_number: FriendNumber,
        peer_audio_bit_rate: u32,
        peer_video_bit_rate: u32,
    ) -> Self {
        Self {
            friend_number,
            direction: CallDirection::Incoming,
            state: CallState::Ringing,
            audio_bit_rate: 0,
            video_bit_rate: 0,
            peer_audio_bit_rate,
            peer_video_bit_rate,
            paused_from: None,
            audio_muted: false,
            video_hidden: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.direction == CallDirection::Outgoing
    }

    pub fn classification(&self) -> CallState {
        CallState::classify(self.audio_bit_rate, self.video_bit_rate)
    }

    /// Whether outgoing frames of `kind` may be pushed right now.
    pub fn can_send(&self, kind: crate::calls::MediaKind) -> bool {
        use crate::calls::MediaKind;
        match kind {
            MediaKind::Audio => self.state.sends_audio() && !self.audio_muted,
            MediaKind::Video => self.state.sends_video() && !self.video_hidden,
        }
    }

    /// Apply a state transition. Returns the new state, or an error leaving
    /// the session untouched.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<CallState, InvalidTransition> {
        let new_state = match (self.state, transition) {
            (
                CallState::Ringing,
                CallTransition::LocalAnswered {
                    audio_bit_rate,
                    video_bit_rate,
                },
            ) if self.direction == CallDirection::Incoming => {
                self.audio_bit_rate = audio_bit_rate;
                self.video_bit_rate = video_bit_rate;
                self.classification()
            }
            (
                CallState::Ringing,
                CallTransition::RemoteAnswered {
                    audio_bit_rate,
                    video_bit_rate,
                },
            ) if self.direction == CallDirection::Outgoing => {
                self.peer_audio_bit_rate = audio_bit_rate;
                self.peer_video_bit_rate = video_bit_rate;
                self.classification()
            }
            (current, CallTransition::Pause) if current.is_established() => {
                self.paused_from = Some(current);
                CallState::Paused
            }
            (CallState::Paused, CallTransition::Resume) => self
                .paused_from
                .take()
                .unwrap_or_else(|| self.classification()),
            (current, CallTransition::RatesChanged) if current.is_established() => {
                self.classification()
            }
            (CallState::Paused, CallTransition::RatesChanged) => {
                self.paused_from = Some(self.classification());
                CallState::Paused
            }
            (current, CallTransition::Cancel) if !current.is_terminal() => {
                self.paused_from = None;
                CallState::End
            }
            (current, CallTransition::Fault) if !current.is_terminal() => {
                self.paused_from = None;
                CallState::Error
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: current,
                    attempted: transition,
                });
            }
        };
        self.state = new_state;
        Ok(new_state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current_state: CallState,
    pub attempted: CallTransition,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {:?} in state {:?}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    fn answered_outgoing(audio: u32, video: u32) -> CallSession {
        let mut call = CallSession::new_outgoing(FriendNumber(5), audio, video);
        call.apply_transition(CallTransition::RemoteAnswered {
            audio_bit_rate: 64,
            video_bit_rate: 0,
        })
        .unwrap();
        call
    }

    #[test]
    fn test_classification() {
        assert_eq!(CallState::classify(64, 500), CallState::SendingAv);
        assert_eq!(CallState::classify(64, 0), CallState::SendingA);
        assert_eq!(CallState::classify(0, 500), CallState::SendingV);
        assert_eq!(CallState::classify(0, 0), CallState::NotSending);
    }

    /// Flow: Ringing → SendingA → End
    #[test]
    fn test_outgoing_call_flow() {
        let mut call = CallSession::new_outgoing(FriendNumber(5), 64, 0);
        assert!(call.state.is_ringing());
        assert!(call.is_initiator());

        let state = call
            .apply_transition(CallTransition::RemoteAnswered {
                audio_bit_rate: 64,
                video_bit_rate: 0,
            })
            .unwrap();
        assert_eq!(state, CallState::SendingA);
        assert_eq!(call.peer_audio_bit_rate, 64);

        call.apply_transition(CallTransition::Cancel).unwrap();
        assert_eq!(call.state, CallState::End);
    }

    #[test]
    fn test_incoming_call_answered_with_both_streams() {
        let mut call = CallSession::new_incoming(FriendNumber(1), 64, 500);
        let state = call
            .apply_transition(CallTransition::LocalAnswered {
                audio_bit_rate: 48,
                video_bit_rate: 1000,
            })
            .unwrap();
        assert_eq!(state, CallState::SendingAv);
        assert_eq!(call.audio_bit_rate, 48);
    }

    #[test]
    fn test_answer_direction_is_enforced() {
        let mut outgoing = CallSession::new_outgoing(FriendNumber(1), 64, 0);
        assert!(
            outgoing
                .apply_transition(CallTransition::LocalAnswered {
                    audio_bit_rate: 64,
                    video_bit_rate: 0,
                })
                .is_err()
        );

        let mut incoming = CallSession::new_incoming(FriendNumber(1), 64, 0);
        assert!(
            incoming
                .apply_transition(CallTransition::RemoteAnswered {
                    audio_bit_rate: 64,
                    video_bit_rate: 0,
                })
                .is_err()
        );
        assert!(incoming.state.is_ringing());
    }

    #[test]
    fn test_pause_resume_restores_classification() {
        let mut call = answered_outgoing(64, 500);
        assert_eq!(call.state, CallState::SendingAv);

        call.apply_transition(CallTransition::Pause).unwrap();
        assert!(call.state.is_paused());

        // Second pause is not a valid transition.
        assert!(call.apply_transition(CallTransition::Pause).is_err());

        call.apply_transition(CallTransition::Resume).unwrap();
        assert_eq!(call.state, CallState::SendingAv);
        assert!(call.paused_from.is_none());
    }

    #[test]
    fn test_rate_change_while_paused_updates_resume_target() {
        let mut call = answered_outgoing(64, 500);
        call.apply_transition(CallTransition::Pause).unwrap();

        call.video_bit_rate = 0;
        call.apply_transition(CallTransition::RatesChanged).unwrap();
        assert!(call.state.is_paused());

        call.apply_transition(CallTransition::Resume).unwrap();
        assert_eq!(call.state, CallState::SendingA);
    }

    #[test]
    fn test_both_rates_zero_means_not_sending() {
        let mut call = answered_outgoing(64, 0);
        call.audio_bit_rate = 0;
        let state = call.apply_transition(CallTransition::RatesChanged).unwrap();
        assert_eq!(state, CallState::NotSending);
    }

    #[test]
    fn test_ringing_rejects_everything_but_cancel() {
        let mut call = CallSession::new_outgoing(FriendNumber(2), 64, 0);
        assert!(call.apply_transition(CallTransition::Pause).is_err());
        assert!(call.apply_transition(CallTransition::Resume).is_err());
        assert!(call.apply_transition(CallTransition::RatesChanged).is_err());
        assert!(call.state.is_ringing());

        call.apply_transition(CallTransition::Cancel).unwrap();
        assert_eq!(call.state, CallState::End);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut call = answered_outgoing(64, 0);
        call.apply_transition(CallTransition::Fault).unwrap();
        assert_eq!(call.state, CallState::Error);

        let err = call.apply_transition(CallTransition::Cancel).unwrap_err();
        assert_eq!(err.current_state, CallState::Error);
        assert!(call.apply_transition(CallTransition::Fault).is_err());
        assert!(call.apply_transition(CallTransition::Resume).is_err());
    }

    #[test]
    fn test_mute_flags_gate_sending() {
        use crate::calls::MediaKind;

        let mut call = answered_outgoing(64, 500);
        assert!(call.can_send(MediaKind::Audio));
        assert!(call.can_send(MediaKind::Video));

        call.audio_muted = true;
        assert!(!call.can_send(MediaKind::Audio));

        call.apply_transition(CallTransition::Pause).unwrap();
        assert!(!call.can_send(MediaKind::Video));
    }
}
