//! Audio and video frame types and their structural contract.
//!
//! Borrowed frames ([`AudioFrame`], [`VideoFrame`]) are what the application
//! hands to a send call. Owned frames are what crosses the media channel and
//! what listeners receive for inbound media.

use std::time::Duration;

use thiserror::Error;

use crate::calls::MediaKind;
use crate::config::AvConfig;

/// Audio frame durations allowed, in tenths of a millisecond.
const FRAME_DURATIONS_TENTHS_MS: [u64; 6] = [25, 50, 100, 200, 400, 600];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{0} missing")]
    MissingPlane(&'static str),

    #[error("zero frame dimension {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },

    #[error("{plane} plane has {len} bytes, needs {required}")]
    PlaneTooShort {
        plane: &'static str,
        len: usize,
        required: usize,
    },

    #[error("frame dimensions overflow")]
    DimensionOverflow,

    #[error("unsupported channel count {0}")]
    UnsupportedChannels(u8),

    #[error("unsupported sampling rate {0} Hz")]
    UnsupportedSamplingRate(u32),

    #[error("{sample_count} samples at {sampling_rate} Hz is not a valid frame duration")]
    InvalidSampleCount {
        sample_count: usize,
        sampling_rate: u32,
    },

    #[error("pcm has {len} samples, needs {required}")]
    PcmTooShort { len: usize, required: usize },

    #[error("allocation failed")]
    Alloc,
}

/// Geometry of one plane of a planar image.
///
/// Rows are `max(width, |stride|)` bytes apart. A negative stride means the
/// rows are stored bottom-up: the first row in the buffer is the last row of
/// the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub stride: i32,
}

impl PlaneLayout {
    pub fn new(width: u32, height: u32, stride: i32) -> Self {
        Self {
            width,
            height,
            stride,
        }
    }

    pub fn pitch(&self) -> usize {
        (self.width as usize).max(self.stride.unsigned_abs() as usize)
    }

    /// Minimum byte length of a buffer holding this plane.
    pub fn required_len(&self) -> Option<usize> {
        self.pitch().checked_mul(self.height as usize)
    }

    pub fn is_bottom_up(&self) -> bool {
        self.stride < 0
    }

    /// Buffer offset of image row `row` (0 = top).
    pub fn row_offset(&self, row: u32) -> Option<usize> {
        if row >= self.height {
            return None;
        }
        let stored = if self.is_bottom_up() {
            self.height - 1 - row
        } else {
            row
        };
        Some(stored as usize * self.pitch())
    }

    /// The `width` visible bytes of image row `row`.
    pub fn row<'p>(&self, plane: &'p [u8], row: u32) -> Option<&'p [u8]> {
        let start = self.row_offset(row)?;
        plane.get(start..start + self.width as usize)
    }

    fn check(&self, name: &'static str, plane: &[u8]) -> Result<usize, FrameError> {
        let required = self.required_len().ok_or(FrameError::DimensionOverflow)?;
        if plane.len() < required {
            return Err(FrameError::PlaneTooShort {
                plane: name,
                len: plane.len(),
                required,
            });
        }
        Ok(required)
    }
}

/// A planar YUV 4:2:0 frame with optional alpha, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub a: Option<&'a [u8]>,
    pub y_stride: i32,
    pub u_stride: i32,
    pub v_stride: i32,
    pub a_stride: i32,
}

impl<'a> VideoFrame<'a> {
    /// A tightly packed, top-down frame.
    pub fn new(width: u32, height: u32, y: &'a [u8], u: &'a [u8], v: &'a [u8]) -> Self {
        let chroma = width.div_ceil(2) as i32;
        Self {
            width,
            height,
            y,
            u,
            v,
            a: None,
            y_stride: width as i32,
            u_stride: chroma,
            v_stride: chroma,
            a_stride: width as i32,
        }
    }

    pub fn with_strides(mut self, y_stride: i32, u_stride: i32, v_stride: i32) -> Self {
        self.y_stride = y_stride;
        self.u_stride = u_stride;
        self.v_stride = v_stride;
        self
    }

    pub fn with_alpha(mut self, a: &'a [u8], a_stride: i32) -> Self {
        self.a = Some(a);
        self.a_stride = a_stride;
        self
    }

    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    pub fn y_layout(&self) -> PlaneLayout {
        PlaneLayout::new(self.width, self.height, self.y_stride)
    }

    pub fn u_layout(&self) -> PlaneLayout {
        PlaneLayout::new(self.chroma_width(), self.chroma_height(), self.u_stride)
    }

    pub fn v_layout(&self) -> PlaneLayout {
        PlaneLayout::new(self.chroma_width(), self.chroma_height(), self.v_stride)
    }

    pub fn a_layout(&self) -> PlaneLayout {
        PlaneLayout::new(self.width, self.height, self.a_stride)
    }

    /// Mandatory planes present and not empty.
    pub fn check_planes(&self) -> Result<(), FrameError> {
        if self.y.is_empty() {
            return Err(FrameError::MissingPlane("y plane"));
        }
        if self.u.is_empty() {
            return Err(FrameError::MissingPlane("u plane"));
        }
        if self.v.is_empty() {
            return Err(FrameError::MissingPlane("v plane"));
        }
        if self.a.is_some_and(|a| a.is_empty()) {
            return Err(FrameError::MissingPlane("a plane"));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        self.check_planes()?;
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        self.y_layout().check("y", self.y)?;
        self.u_layout().check("u", self.u)?;
        self.v_layout().check("v", self.v)?;
        if let Some(a) = self.a {
            self.a_layout().check("a", a)?;
        }
        Ok(())
    }

    /// Validate and copy the planes into an owned frame.
    pub fn to_owned_frame(&self) -> Result<OwnedVideoFrame, FrameError> {
        self.validate()?;
        let a = match self.a {
            Some(a) => Some(copy_prefix(a, self.a_layout().check("a", a)?)?),
            None => None,
        };
        Ok(OwnedVideoFrame {
            width: self.width,
            height: self.height,
            y: copy_prefix(self.y, self.y_layout().check("y", self.y)?)?,
            u: copy_prefix(self.u, self.u_layout().check("u", self.u)?)?,
            v: copy_prefix(self.v, self.v_layout().check("v", self.v)?)?,
            a,
            y_stride: self.y_stride,
            u_stride: self.u_stride,
            v_stride: self.v_stride,
            a_stride: self.a_stride,
        })
    }
}

/// Owned counterpart of [`VideoFrame`]; strides keep their sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedVideoFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub a: Option<Vec<u8>>,
    pub y_stride: i32,
    pub u_stride: i32,
    pub v_stride: i32,
    pub a_stride: i32,
}

impl OwnedVideoFrame {
    pub fn as_frame(&self) -> VideoFrame<'_> {
        VideoFrame {
            width: self.width,
            height: self.height,
            y: &self.y,
            u: &self.u,
            v: &self.v,
            a: self.a.as_deref(),
            y_stride: self.y_stride,
            u_stride: self.u_stride,
            v_stride: self.v_stride,
            a_stride: self.a_stride,
        }
    }
}

/// Interleaved 16-bit PCM, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub pcm: &'a [i16],
    /// Samples per channel.
    pub sample_count: usize,
    pub channels: u8,
    pub sampling_rate: u32,
}

impl<'a> AudioFrame<'a> {
    pub fn new(pcm: &'a [i16], sample_count: usize, channels: u8, sampling_rate: u32) -> Self {
        Self {
            pcm,
            sample_count,
            channels,
            sampling_rate,
        }
    }

    /// Playback time of the frame. Saturates for absurd sample counts.
    pub fn duration(&self) -> Duration {
        if self.sampling_rate == 0 {
            return Duration::ZERO;
        }
        let micros = self.sample_count as u128 * 1_000_000 / self.sampling_rate as u128;
        Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    /// Interleaved samples the frame covers, `None` on overflow.
    fn required_len(&self) -> Option<usize> {
        self.sample_count.checked_mul(self.channels as usize)
    }

    fn invalid_sample_count(&self) -> FrameError {
        FrameError::InvalidSampleCount {
            sample_count: self.sample_count,
            sampling_rate: self.sampling_rate,
        }
    }

    pub fn validate(&self, config: &AvConfig) -> Result<(), FrameError> {
        if self.pcm.is_empty() {
            return Err(FrameError::MissingPlane("pcm"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(FrameError::UnsupportedChannels(self.channels));
        }
        if !config.is_supported_sampling_rate(self.sampling_rate) {
            return Err(FrameError::UnsupportedSamplingRate(self.sampling_rate));
        }
        let scaled = u64::try_from(self.sample_count)
            .ok()
            .and_then(|n| n.checked_mul(10_000))
            .ok_or_else(|| self.invalid_sample_count())?;
        let rate = self.sampling_rate as u64;
        if scaled % rate != 0 || !FRAME_DURATIONS_TENTHS_MS.contains(&(scaled / rate)) {
            return Err(self.invalid_sample_count());
        }
        let required = self
            .required_len()
            .ok_or_else(|| self.invalid_sample_count())?;
        if self.pcm.len() < required {
            return Err(FrameError::PcmTooShort {
                len: self.pcm.len(),
                required,
            });
        }
        Ok(())
    }

    pub fn to_owned_frame(&self, config: &AvConfig) -> Result<OwnedAudioFrame, FrameError> {
        self.validate(config)?;
        let required = self
            .required_len()
            .ok_or_else(|| self.invalid_sample_count())?;
        Ok(OwnedAudioFrame {
            pcm: copy_prefix(self.pcm, required)?,
            sample_count: self.sample_count,
            channels: self.channels,
            sampling_rate: self.sampling_rate,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedAudioFrame {
    pub pcm: Vec<i16>,
    pub sample_count: usize,
    pub channels: u8,
    pub sampling_rate: u32,
}

impl OwnedAudioFrame {
    pub fn as_frame(&self) -> AudioFrame<'_> {
        AudioFrame::new(&self.pcm, self.sample_count, self.channels, self.sampling_rate)
    }
}

/// What travels over the best-effort media channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    Audio(OwnedAudioFrame),
    Video(OwnedVideoFrame),
}

impl MediaPayload {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Audio(_) => MediaKind::Audio,
            Self::Video(_) => MediaKind::Video,
        }
    }
}

fn copy_prefix<T: Copy>(src: &[T], len: usize) -> Result<Vec<T>, FrameError> {
    let src = src.get(..len).ok_or(FrameError::PcmTooShort {
        len: src.len(),
        required: len,
    })?;
    let mut out = Vec::new();
    out.try_reserve_exact(len).map_err(|_| FrameError::Alloc)?;
    out.extend_from_slice(src);
    Ok(out)
}
