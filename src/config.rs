use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::calls::{MediaKind, NewError};

/// Tunables for an [`AvSession`](crate::calls::AvSession).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AvConfig {
    /// Audio bit rates (kb/s) a call may use besides 0.
    pub audio_bit_rates: Vec<u32>,
    /// Video bit rates (kb/s) a call may use besides 0.
    pub video_bit_rates: Vec<u32>,
    /// PCM sampling rates accepted for audio frames.
    pub sampling_rates: Vec<u32>,
    /// Interval returned by `iterate()` when no stream is active.
    pub idle_interval_ms: u64,
    /// Interval while at least one call sends audio.
    pub audio_interval_ms: u64,
    /// Interval while at least one call sends video.
    pub video_interval_ms: u64,
    /// Upper bound on inbound items processed per `iterate()`.
    pub max_inbound_per_iteration: usize,
}

impl Default for AvConfig {
    fn default() -> Self {
        Self {
            audio_bit_rates: vec![8, 16, 24, 32, 48, 64, 96, 128],
            video_bit_rates: vec![100, 250, 500, 1000, 2500, 5000],
            sampling_rates: vec![8000, 12000, 16000, 24000, 48000],
            idle_interval_ms: 200,
            audio_interval_ms: 20,
            video_interval_ms: 40,
            max_inbound_per_iteration: 64,
        }
    }
}

impl AvConfig {
    pub fn from_json_str(json: &str) -> Result<Self, NewError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| NewError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, NewError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| NewError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), NewError> {
        let sets = [
            ("audio_bit_rates", &self.audio_bit_rates),
            ("video_bit_rates", &self.video_bit_rates),
            ("sampling_rates", &self.sampling_rates),
        ];
        for (name, set) in sets {
            if set.is_empty() {
                return Err(NewError::InvalidConfig(format!("{name} is empty")));
            }
            if set.contains(&0) {
                return Err(NewError::InvalidConfig(format!("{name} contains 0")));
            }
        }
        if self.idle_interval_ms == 0 || self.audio_interval_ms == 0 || self.video_interval_ms == 0
        {
            return Err(NewError::InvalidConfig("intervals must be non-zero".into()));
        }
        if self.max_inbound_per_iteration == 0 {
            return Err(NewError::InvalidConfig(
                "max_inbound_per_iteration must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// 0 (disabled) or a member of the supported set for `kind`.
    pub fn is_supported_bit_rate(&self, kind: MediaKind, bit_rate: u32) -> bool {
        bit_rate == 0
            || match kind {
                MediaKind::Audio => self.audio_bit_rates.contains(&bit_rate),
                MediaKind::Video => self.video_bit_rates.contains(&bit_rate),
            }
    }

    pub fn is_supported_sampling_rate(&self, sampling_rate: u32) -> bool {
        self.sampling_rates.contains(&sampling_rate)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}
