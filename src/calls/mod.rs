//! Peer-to-peer audio/video calls.
//!
//! Call signaling and media frames run over a [`PeerNetwork`](crate::network::PeerNetwork)
//! that already provides friend identity and reliable/best-effort channels.
//!
//! # Architecture
//!
//! - [`AvSession`]: owned handle, one per peer network, through which every operation runs
//! - [`CallState`] & [`CallSession`]: per-friend call state machine
//! - [`SignalMessage`]: what is exchanged over the signaling channel
//! - [`BitRateReport`]: outcome of a bit-rate change
//! - [`media`]: video/audio frame contracts and the push to the media channel
//! - [`AvListener`] & [`AvEvent`]: how results reach the application
//! - [`drive`]: async loop calling [`AvSession::iterate`] at the pace it asks for
//!
//! # Threading
//!
//! Nothing here spawns threads. The application calls `iterate()` from one
//! thread, sleeping the returned interval between calls; the other
//! operations may come from any thread and serialize with it.

mod bitrate;
mod control;
mod error;
mod events;
mod handler;
mod manager;
pub mod media;
mod registry;
mod scheduler;
mod signaling;
mod state;

pub use bitrate::BitRateReport;
pub use error::{
    AnswerError, BitRateError, CallError, Classify, ControlError, ErrorClass, NewError,
    SendFrameError,
};
pub use events::{AvEvent, AvListener, ChannelListener, NoopListener, route};
pub use manager::AvSession;
pub use registry::{CallRegistry, RegistryError};
pub use scheduler::drive;
pub use signaling::{CallControl, MediaKind, SignalMessage, SignalingType};
pub use state::{CallDirection, CallSession, CallState, CallTransition, InvalidTransition};
