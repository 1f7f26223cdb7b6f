//! Frame transfer for AV calls.
//!
//! Defines the structural contract every audio (interleaved PCM) and video
//! (planar YUV 4:2:0, optional alpha, signed strides) frame must satisfy, and
//! the channel pushing frames to the peer network. Encoding is left to the
//! codec layer behind the peer network.

mod frame;
pub(crate) mod transfer;

pub use frame::{
    AudioFrame, FrameError, MediaPayload, OwnedAudioFrame, OwnedVideoFrame, PlaneLayout,
    VideoFrame,
};
