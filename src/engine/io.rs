//! Audio file I/O
//!
//! WAV import and export through `hound`. Every re-open of a file checks the
//! `RIFF` tag at offset 0 before handing the file to the decoder, so a
//! truncated or foreign file is reported as such instead of surfacing as a
//! decoder error halfway through playback.
//!
//! Imported audio is converted to 32-bit float and resampled to the
//! requested rate with linear interpolation.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::{debug, instrument};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{FourTrackError, Result};

/// Four-byte tag every WAV file starts with
pub const RIFF_TAG: &[u8; 4] = b"RIFF";

/// Export format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24 or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self { bit_depth: 24 }
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Self {
        Self { bit_depth }
    }

    /// 32-bit float, used for recorded takes
    pub fn lossless() -> Self {
        Self { bit_depth: 32 }
    }

    /// WAV header for this format
    pub fn spec(&self, channels: u16, sample_rate: u32) -> Result<WavSpec> {
        let sample_format = match self.bit_depth {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => {
                return Err(FourTrackError::UnsupportedFormat {
                    format: format!("{}-bit audio (only 16, 24, 32 supported)", other),
                })
            }
        };
        Ok(WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format,
        })
    }
}

/// Header facts about a WAV file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u64,
}

impl AudioInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Check that `path` exists and starts with a `RIFF` tag
pub fn validate_riff(path: &Path) -> Result<()> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FourTrackError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => FourTrackError::Io(e),
    })?;

    let mut tag = [0u8; 4];
    match file.read_exact(&mut tag) {
        Ok(()) if &tag == RIFF_TAG => Ok(()),
        Ok(()) => Err(FourTrackError::NotRiff {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FourTrackError::NotRiff {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(FourTrackError::Io(e)),
    }
}

fn open_reader(path: &Path) -> Result<WavReader<std::io::BufReader<File>>> {
    validate_riff(path)?;
    WavReader::open(path).map_err(|e| FourTrackError::InvalidAudio {
        reason: format!("failed to open {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })
}

/// Read the header of a WAV file
pub fn probe(path: &Path) -> Result<AudioInfo> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    Ok(AudioInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration() as u64,
    })
}

/// Length of a WAV file in seconds
pub fn probe_duration(path: &Path) -> Result<f64> {
    Ok(probe(path)?.duration_secs())
}

/// Import a WAV file as float audio at `target_rate`
///
/// # Errors
/// * `FileNotFound` - the file does not exist
/// * `NotRiff` - the file does not start with a RIFF tag
/// * `InvalidAudio` - the decoder rejected the file
/// * `UnsupportedFormat` - more than two channels or an odd bit depth
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn import_audio(path: &Path, target_rate: u32) -> Result<AudioBuffer> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    if channels == 0 || channels > 2 {
        return Err(FourTrackError::UnsupportedFormat {
            format: format!("{}-channel audio (only mono/stereo supported)", channels),
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    let layout = ChannelLayout::from_count(channels).unwrap_or_default();
    let mut buffer = AudioBuffer::from_interleaved(&interleaved, layout, spec.sample_rate)?;

    if spec.sample_rate != target_rate {
        debug!(
            path = %path.display(),
            from = spec.sample_rate,
            to = target_rate,
            "Resampling source"
        );
        buffer = resample(&buffer, target_rate);
    }

    Ok(buffer)
}

/// Write a buffer to a WAV file at the buffer's own sample rate
pub fn export_audio(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let spec = format.spec(buffer.channels() as u16, buffer.sample_rate)?;
    let mut writer = create_writer(path, spec)?;
    for sample in buffer.to_interleaved() {
        write_sample(&mut writer, sample, format.bit_depth)
            .map_err(|e| disk_write_error(path, e))?;
    }
    writer.finalize().map_err(|e| disk_write_error(path, e))?;
    Ok(())
}

/// Open a WAV writer, reporting failures as disk-write errors
pub fn create_writer(path: &Path, spec: WavSpec) -> Result<WavWriter<BufWriter<File>>> {
    WavWriter::create(path, spec).map_err(|e| disk_write_error(path, e))
}

/// Write one float sample scaled to the writer's bit depth
#[inline]
pub fn write_sample<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    sample: f32,
    bit_depth: u16,
) -> std::result::Result<(), hound::Error> {
    match bit_depth {
        16 => writer.write_sample((sample * 32767.0).clamp(-32768.0, 32767.0) as i16),
        // 24-bit is stored as i32 in hound
        24 => writer.write_sample((sample * 8_388_607.0).clamp(-8_388_608.0, 8_388_607.0) as i32),
        _ => writer.write_sample(sample),
    }
}

pub(crate) fn disk_write_error(path: &Path, e: hound::Error) -> FourTrackError {
    FourTrackError::DiskWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Generate a mono sine tone
pub fn generate_test_tone(
    frequency: f32,
    amplitude: f32,
    duration_secs: f64,
    sample_rate: u32,
) -> AudioBuffer {
    let frames = (duration_secs * sample_rate as f64).round() as usize;
    let angular = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..frames)
        .map(|i| amplitude * (angular * i as f32).sin())
        .collect();
    AudioBuffer::from_mono(samples, sample_rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn read_samples_as_f32<R: Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let decode_error = |e: hound::Error| FourTrackError::InvalidAudio {
        reason: format!("failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_error),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_error),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_error),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_error),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(decode_error),
        (SampleFormat::Int, bits) => Err(FourTrackError::UnsupportedFormat {
            format: format!("{}-bit integer audio", bits),
        }),
    }
}

/// Resample every channel of a buffer to `target_rate`
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    AudioBuffer {
        samples: buffer
            .samples
            .iter()
            .map(|channel| resample_linear(channel, ratio))
            .collect(),
        sample_rate: target_rate,
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() || !(ratio > 0.0) {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).round() as usize;
    (0..target_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let idx = src_pos.floor() as usize;
            let frac = (src_pos - idx as f64) as f32;
            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&a), Some(&b)) => a + (b - a) * frac,
                (Some(&a), None) => a,
                _ => 0.0,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_riff_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.wav");
        fs::write(&path, b"ID3\x03not a wave").unwrap();
        assert!(matches!(
            validate_riff(&path),
            Err(FourTrackError::NotRiff { .. })
        ));
    }

    #[test]
    fn test_validate_riff_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.wav");
        fs::write(&path, b"RI").unwrap();
        assert!(matches!(
            validate_riff(&path),
            Err(FourTrackError::NotRiff { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = import_audio(Path::new("/nonexistent/take.wav"), 48000).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_export_import_24bit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.5, 0.25, 48000);
        export_audio(&tone, &path, ExportFormat::default()).unwrap();

        let info = probe(&path).unwrap();
        assert_eq!(info.channels, 1);
        assert_eq!(info.frames, 12000);
        assert_relative_eq!(info.duration_secs(), 0.25);

        let loaded = import_audio(&path, 48000).unwrap();
        assert_eq!(loaded.len(), tone.len());
        for (a, b) in loaded.channel(0).iter().zip(tone.channel(0)) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_import_resamples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let tone = generate_test_tone(440.0, 0.5, 1.0, 44100);
        export_audio(&tone, &path, ExportFormat::lossless()).unwrap();

        let loaded = import_audio(&path, 48000).unwrap();
        assert_eq!(loaded.sample_rate, 48000);
        assert_eq!(loaded.len(), 48000);
    }

    #[test]
    fn test_unsupported_bit_depth() {
        let dir = TempDir::new().unwrap();
        let tone = generate_test_tone(440.0, 0.5, 0.1, 48000);
        let result = export_audio(&tone, &dir.path().join("x.wav"), ExportFormat::new(12));
        assert!(matches!(result, Err(FourTrackError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_resample_linear_identity() {
        let input = vec![0.0, 0.5, 1.0];
        assert_eq!(resample_linear(&input, 1.0), input);
        assert_eq!(resample_linear(&input, 2.0).len(), 6);
    }
}
