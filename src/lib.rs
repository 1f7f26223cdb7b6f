pub mod calls;
pub mod config;
pub mod loopback;
pub mod network;

pub use calls::{AvEvent, AvListener, AvSession, CallControl, CallState, MediaKind};
pub use config::AvConfig;
pub use network::{ConnectionStatus, FriendNumber, PeerNetwork};
