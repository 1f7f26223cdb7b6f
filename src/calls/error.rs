//! Error types for AV operations, one closed enum per operation category.

use thiserror::Error;

use super::signaling::CallControl;
use super::state::CallState;
use crate::network::{FriendNumber, NetworkError};

/// How the caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad friend number, bad parameters or an invalid state transition.
    /// Never retried automatically.
    Caller,
    /// Safe to retry on the next iteration or frame.
    Transient,
    /// Allocation failed; the session kept its prior state.
    ResourceExhausted,
}

pub trait Classify {
    fn class(&self) -> ErrorClass;
}

#[derive(Debug, Error)]
pub enum NewError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("peer network already has an AV session attached")]
    Multiple,
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("allocation failed while registering call")]
    Malloc,

    #[error("{0} not found")]
    FriendNotFound(FriendNumber),

    #[error("{0} is not connected")]
    FriendNotConnected(FriendNumber),

    #[error("{0} is already in a call")]
    FriendAlreadyInCall(FriendNumber),

    #[error("unsupported bit rate: {0} kb/s")]
    InvalidBitRate(u32),

    #[error("signaling failed: {0}")]
    Signaling(#[from] NetworkError),

    #[error("av session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("{0} not found")]
    FriendNotFound(FriendNumber),

    #[error("{0} is not calling")]
    FriendNotCalling(FriendNumber),

    #[error("unsupported bit rate: {0} kb/s")]
    InvalidBitRate(u32),

    #[error("codec initialisation failed: {0}")]
    CodecInit(String),

    #[error("signaling failed: {0}")]
    Signaling(#[from] NetworkError),

    #[error("av session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0} not found")]
    FriendNotFound(FriendNumber),

    #[error("{0} is not in a call")]
    FriendNotInCall(FriendNumber),

    #[error("cannot apply {control} in state {state:?}")]
    InvalidTransition { state: CallState, control: CallControl },

    #[error("call with {0} is already paused")]
    AlreadyPaused(FriendNumber),

    #[error("signaling failed: {0}")]
    Signaling(#[from] NetworkError),

    #[error("av session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum BitRateError {
    #[error("unsupported bit rate: {0} kb/s")]
    InvalidBitRate(u32),

    #[error("{0} not found")]
    FriendNotFound(FriendNumber),

    #[error("{0} is not in a call")]
    FriendNotInCall(FriendNumber),

    #[error("signaling failed: {0}")]
    Signaling(#[from] NetworkError),

    #[error("av session is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SendFrameError {
    #[error("mandatory frame data missing: {0}")]
    Null(&'static str),

    #[error("{0} not found")]
    FriendNotFound(FriendNumber),

    #[error("{0} is not in a call")]
    FriendNotInCall(FriendNumber),

    #[error("invalid frame: {0}")]
    Invalid(String),

    #[error("stream disabled for this call")]
    PayloadTypeDisabled,

    #[error("allocation failed while copying frame")]
    Malloc,

    #[error("media push rejected: {0}")]
    RtpFailed(#[source] NetworkError),

    #[error("av session is closed")]
    Closed,
}

impl Classify for NewError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Caller
    }
}

impl Classify for CallError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Malloc => ErrorClass::ResourceExhausted,
            Self::Signaling(_) => ErrorClass::Transient,
            _ => ErrorClass::Caller,
        }
    }
}

impl Classify for AnswerError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Signaling(_) | Self::CodecInit(_) => ErrorClass::Transient,
            _ => ErrorClass::Caller,
        }
    }
}

impl Classify for ControlError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Signaling(_) => ErrorClass::Transient,
            _ => ErrorClass::Caller,
        }
    }
}

impl Classify for BitRateError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Signaling(_) => ErrorClass::Transient,
            _ => ErrorClass::Caller,
        }
    }
}

impl Classify for SendFrameError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::RtpFailed(_) => ErrorClass::Transient,
            Self::Malloc => ErrorClass::ResourceExhausted,
            _ => ErrorClass::Caller,
        }
    }
}
