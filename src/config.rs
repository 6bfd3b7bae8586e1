//! Runtime configuration
//!
//! Loaded from a JSON file with serde defaults for every field, then
//! optionally overridden from `FOURTRACK_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::error::{FourTrackError, Result};
use crate::state::Tier;

/// Environment override for the engine sample rate
pub const ENV_SAMPLE_RATE: &str = "FOURTRACK_SAMPLE_RATE";
/// Environment override for the recordings directory
pub const ENV_RECORDINGS_DIR: &str = "FOURTRACK_RECORDINGS_DIR";
/// Environment override for the store root
pub const ENV_STORE_ROOT: &str = "FOURTRACK_STORE_ROOT";

/// Real-time engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate used when no device dictates one
    pub sample_rate: u32,
    /// Largest block the renderer processes in one pass; scratch buffers are sized to this
    pub max_block_frames: usize,
    /// Ramp length for parameter changes, in milliseconds
    pub smoothing_ms: f32,
    /// Capacity of the control-to-render command queue
    pub command_capacity: usize,
    /// Seconds of microphone input the capture ring can hold between pumps
    pub input_ring_secs: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: INTERNAL_SAMPLE_RATE,
            max_block_frames: 1024,
            smoothing_ms: 20.0,
            command_capacity: 256,
            input_ring_secs: 2.0,
        }
    }
}

impl EngineConfig {
    /// Validate ranges that would otherwise break the render domain
    pub fn validate(&self) -> Result<()> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(FourTrackError::InvalidConfig {
                reason: format!("sample_rate {} outside 8000-192000", self.sample_rate),
            });
        }
        if self.max_block_frames == 0 || self.max_block_frames > 16_384 {
            return Err(FourTrackError::InvalidConfig {
                reason: format!("max_block_frames {} outside 1-16384", self.max_block_frames),
            });
        }
        if self.command_capacity == 0 {
            return Err(FourTrackError::InvalidConfig {
                reason: "command_capacity must be positive".to_string(),
            });
        }
        if !(self.smoothing_ms >= 0.0 && self.smoothing_ms <= 500.0) {
            return Err(FourTrackError::InvalidConfig {
                reason: format!("smoothing_ms {} outside 0-500", self.smoothing_ms),
            });
        }
        if !(self.input_ring_secs > 0.0) {
            return Err(FourTrackError::InvalidConfig {
                reason: "input_ring_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Number of frames a parameter ramp lasts at the given rate
    pub fn smoothing_frames(&self, sample_rate: u32) -> usize {
        ((self.smoothing_ms / 1000.0) * sample_rate as f32).round() as usize
    }
}

/// Top-level configuration for a studio context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub engine: EngineConfig,
    /// Where new takes are written
    pub recordings_dir: PathBuf,
    /// Root of the JSON session/mix store
    pub store_root: PathBuf,
    /// Bit depth of bounced files (16, 24 or 32)
    pub bounce_bit_depth: u16,
    /// Tier applied to newly created sessions
    pub tier: Tier,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            recordings_dir: PathBuf::from("recordings"),
            store_root: PathBuf::from("fourtrack-store"),
            bounce_bit_depth: 24,
            tier: Tier::Standard,
        }
    }
}

impl StudioConfig {
    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FourTrackError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let config: StudioConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FOURTRACK_*` environment overrides
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(rate) = std::env::var(ENV_SAMPLE_RATE) {
            self.engine.sample_rate =
                rate.trim()
                    .parse()
                    .map_err(|_| FourTrackError::InvalidConfig {
                        reason: format!("{} is not a sample rate: {}", ENV_SAMPLE_RATE, rate),
                    })?;
        }
        if let Ok(dir) = std::env::var(ENV_RECORDINGS_DIR) {
            self.recordings_dir = PathBuf::from(dir);
        }
        if let Ok(root) = std::env::var(ENV_STORE_ROOT) {
            self.store_root = PathBuf::from(root);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if !matches!(self.bounce_bit_depth, 16 | 24 | 32) {
            return Err(FourTrackError::InvalidConfig {
                reason: format!("bounce_bit_depth {} (only 16, 24, 32)", self.bounce_bit_depth),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StudioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.sample_rate, 48000);
        assert_eq!(config.bounce_bit_depth, 24);
    }

    #[test]
    fn test_smoothing_frames() {
        let config = EngineConfig::default();
        assert_eq!(config.smoothing_frames(48000), 960);
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "engine": { "sample_rate": 44100 }, "tier": "Extended" }"#).unwrap();

        let config = StudioConfig::load(&path).unwrap();
        assert_eq!(config.engine.sample_rate, 44100);
        assert_eq!(config.engine.max_block_frames, 1024);
        assert_eq!(config.tier, Tier::Extended);
    }

    #[test]
    fn test_invalid_bit_depth_rejected() {
        let config = StudioConfig {
            bounce_bit_depth: 12,
            ..StudioConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FourTrackError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = StudioConfig::load(Path::new("/nonexistent/fourtrack.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
