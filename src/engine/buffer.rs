//! Audio Buffer Management
//!
//! Decoded audio held in memory: region sources loaded for playback and
//! takes captured by the recorder. All processing uses 32-bit float
//! samples at the engine sample rate.

use crate::error::{FourTrackError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default engine sample rate (48kHz)
pub const INTERNAL_SAMPLE_RATE: u32 = 48000;

/// Level below which a meter reads as silence (-80dBFS)
pub const SILENCE_THRESHOLD_DB: f32 = -80.0;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `-f32::INFINITY` for zero input.
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

/// Absolute peak of a sample slice
#[inline]
pub fn peak_of(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Convert seconds to a whole frame position
#[inline]
pub fn secs_to_frames(secs: f64, sample_rate: u32) -> u64 {
    if secs <= 0.0 {
        0
    } else {
        (secs * sample_rate as f64).round() as u64
    }
}

#[inline]
pub fn frames_to_secs(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    Mono,
    #[default]
    Stereo,
}

impl ChannelLayout {
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// AudioBuffer
// ============================================================================

/// Planar multi-channel audio
///
/// # Example
/// ```
/// use fourtrack::engine::buffer::{AudioBuffer, ChannelLayout, INTERNAL_SAMPLE_RATE};
///
/// let buffer = AudioBuffer::new(INTERNAL_SAMPLE_RATE as usize, ChannelLayout::Stereo, INTERNAL_SAMPLE_RATE);
/// assert_eq!(buffer.channels(), 2);
/// assert_eq!(buffer.duration_secs(), 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data: outer Vec is channels, inner Vec is samples
    pub samples: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Silent buffer of `num_samples` frames
    pub fn new(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Wrap a mono sample vector
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();
        if interleaved.len() % num_channels != 0 {
            return Err(FourTrackError::InvalidAudio {
                reason: format!(
                    "interleaved length {} is not divisible by {} channels",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let frames = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Samples in interleaved order (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.len());
        for i in 0..self.len() {
            for channel in &self.samples {
                interleaved.push(channel[i]);
            }
        }
        interleaved
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Frames per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        ChannelLayout::from_count(self.channels())
    }

    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.samples[index]
    }

    /// Stereo view of one frame; mono sources feed both sides
    #[inline]
    pub fn stereo_frame(&self, index: usize) -> (f32, f32) {
        match self.samples.as_slice() {
            [mono] => {
                let s = mono.get(index).copied().unwrap_or(0.0);
                (s, s)
            }
            [left, right, ..] => (
                left.get(index).copied().unwrap_or(0.0),
                right.get(index).copied().unwrap_or(0.0),
            ),
            [] => (0.0, 0.0),
        }
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }

    /// Absolute peak across all channels
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|ch| peak_of(ch)).fold(0.0, f32::max)
    }

    /// Shorten to at most `frames` frames
    pub fn truncate(&mut self, frames: usize) {
        for channel in &mut self.samples {
            channel.truncate(frames);
        }
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new(0, ChannelLayout::Stereo, INTERNAL_SAMPLE_RATE)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_conversion() {
        assert_relative_eq!(db_to_linear(0.0), 1.0);
        assert_relative_eq!(db_to_linear(-20.0), 0.1, epsilon = 1e-6);
        assert_relative_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
    }

    #[test]
    fn test_frame_conversion() {
        assert_eq!(secs_to_frames(1.5, 48000), 72000);
        assert_eq!(secs_to_frames(-1.0, 48000), 0);
        assert_relative_eq!(frames_to_secs(24000, 48000), 0.5);
    }

    #[test]
    fn test_interleave_roundtrip_keeps_order() {
        let buffer =
            AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], ChannelLayout::Stereo, 48000)
                .unwrap();
        assert_eq!(buffer.channel(0), &[0.1, 0.3]);
        assert_eq!(buffer.channel(1), &[0.2, 0.4]);
        assert_eq!(buffer.to_interleaved(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_interleaved_length_mismatch() {
        let result = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3], ChannelLayout::Stereo, 48000);
        assert!(result.is_err());
    }

    #[test]
    fn test_stereo_frame_from_mono() {
        let buffer = AudioBuffer::from_mono(vec![0.5, -0.5], 48000);
        assert_eq!(buffer.stereo_frame(1), (-0.5, -0.5));
        assert_eq!(buffer.stereo_frame(9), (0.0, 0.0));
    }

    #[test]
    fn test_peak_and_finite() {
        let mut buffer = AudioBuffer::from_mono(vec![0.2, -0.9, 0.4], 48000);
        assert_relative_eq!(buffer.peak(), 0.9);
        assert!(buffer.is_finite());
        buffer.samples[0][1] = f32::NAN;
        assert!(!buffer.is_finite());
    }

    #[test]
    fn test_truncate() {
        let mut buffer = AudioBuffer::new(100, ChannelLayout::Stereo, 48000);
        buffer.truncate(10);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.channel(1).len(), 10);
    }
}
