//! Recording
//!
//! One track is armed at a time. While recording, the input side (a device
//! callback or a test) writes microphone frames into an `InputPort`, which
//! feeds a lock-free SPSC ring. The control domain drains the ring with
//! `pump` and, when the take stops, writes it to disk and places it on the
//! armed track as a new region.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::buffer::{frames_to_secs, peak_of, secs_to_frames, AudioBuffer};
use crate::engine::io::{export_audio, ExportFormat};
use crate::engine::{AudioEngine, Schedule, Timeline, TransportState};
use crate::error::{FourTrackError, Result};
use crate::state::{Region, Session, TrackIndex};

/// Per-block multiplier applied to the held input level
const LEVEL_DECAY: f32 = 0.9;

// ============================================================================
// Permission
// ============================================================================

/// Source of the microphone-access decision
pub trait MicrophonePermission: Send {
    /// Whether recording may open the microphone
    fn request(&mut self) -> bool;
}

/// Fixed answer; for hosts that settle permission elsewhere, and for tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPermission(pub bool);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(true)
    }

    pub fn denied() -> Self {
        Self(false)
    }
}

impl MicrophonePermission for StaticPermission {
    fn request(&mut self) -> bool {
        self.0
    }
}

// ============================================================================
// Input port
// ============================================================================

/// Write end of a take's capture ring
///
/// Never blocks or allocates; frames that do not fit are counted as dropped.
pub struct InputPort {
    producer: HeapProd<f32>,
    level: Arc<AtomicU32>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for InputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputPort")
            .field("capacity_left", &self.capacity_left())
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl InputPort {
    /// Push mono frames; returns how many were accepted
    pub fn push(&mut self, frames: &[f32]) -> usize {
        let accepted = self.producer.push_slice(frames);
        self.finish_block(peak_of(frames), frames.len() - accepted);
        accepted
    }

    /// Push interleaved frames, mixing channels down to mono
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) -> usize {
        let channels = channels.max(1);
        let scale = 1.0 / channels as f32;
        let mut accepted = 0;
        let mut offered = 0;
        let mut peak = 0.0f32;
        for frame in data.chunks_exact(channels) {
            let sample = frame.iter().sum::<f32>() * scale;
            peak = peak.max(sample.abs());
            offered += 1;
            if self.producer.try_push(sample).is_ok() {
                accepted += 1;
            }
        }
        self.finish_block(peak, offered - accepted);
        accepted
    }

    fn finish_block(&self, peak: f32, dropped: usize) {
        let held = f32::from_bits(self.level.load(Ordering::Relaxed)) * LEVEL_DECAY;
        let level = if peak.is_finite() { peak.max(held) } else { held };
        self.level.store(level.min(1.0).to_bits(), Ordering::Relaxed);
        if dropped > 0 {
            self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    /// Free space left in the ring
    pub fn capacity_left(&self) -> usize {
        self.producer.vacant_len()
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// How a take ended
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    /// The take was written and placed on its track
    Recorded {
        track: TrackIndex,
        region: Region,
        file: PathBuf,
    },
    /// Nothing was captured; no file or region was created
    Discarded { track: TrackIndex },
}

struct ActiveTake {
    track: TrackIndex,
    start_time: f64,
    sample_rate: u32,
    consumer: HeapCons<f32>,
    samples: Vec<f32>,
    /// Frames that fit before the session limit
    max_frames: usize,
}

impl ActiveTake {
    fn drain(&mut self) -> usize {
        let before = self.samples.len();
        let room = self.max_frames.saturating_sub(before);
        self.samples.extend(self.consumer.pop_iter().take(room));
        // Anything past the limit is thrown away
        let overflow = self.consumer.occupied_len();
        if overflow > 0 {
            self.consumer.skip(overflow);
        }
        self.samples.len() - before
    }
}

pub struct Recorder {
    armed: Option<TrackIndex>,
    permission: Box<dyn MicrophonePermission>,
    recordings_dir: PathBuf,
    ring_secs: f32,
    take: Option<ActiveTake>,
    level: Arc<AtomicU32>,
    dropped: Arc<AtomicU64>,
}

impl Recorder {
    pub fn new(
        permission: Box<dyn MicrophonePermission>,
        recordings_dir: impl Into<PathBuf>,
        ring_secs: f32,
    ) -> Self {
        Self {
            armed: None,
            permission,
            recordings_dir: recordings_dir.into(),
            ring_secs,
            take: None,
            level: Arc::new(AtomicU32::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arm a track, disarming any other
    pub fn arm(&mut self, track: TrackIndex) -> Result<()> {
        if self.take.is_some() {
            return Err(FourTrackError::InvalidTransition {
                operation: "arm",
                state: "recording".to_string(),
            });
        }
        self.armed = Some(track);
        debug!(%track, "Track armed");
        Ok(())
    }

    pub fn disarm(&mut self) -> Result<()> {
        if self.take.is_some() {
            return Err(FourTrackError::InvalidTransition {
                operation: "disarm",
                state: "recording".to_string(),
            });
        }
        self.armed = None;
        Ok(())
    }

    pub fn armed(&self) -> Option<TrackIndex> {
        self.armed
    }

    pub fn is_recording(&self) -> bool {
        self.take.is_some()
    }

    pub fn recordings_dir(&self) -> &Path {
        &self.recordings_dir
    }

    /// Start a take on the armed track at the playhead
    ///
    /// `backing` is what plays on the other tracks while recording. The
    /// returned port is where input frames go.
    pub fn start_recording(
        &mut self,
        session: &Session,
        timeline: &mut Timeline,
        engine: &mut AudioEngine,
        backing: Schedule,
    ) -> Result<InputPort> {
        if !timeline.is_stopped() || self.take.is_some() {
            return Err(FourTrackError::InvalidTransition {
                operation: "record",
                state: timeline.state().to_string(),
            });
        }
        let track = self.armed.ok_or(FourTrackError::NoTrackArmed)?;
        if !self.permission.request() {
            warn!("Microphone permission denied");
            return Err(FourTrackError::PermissionDenied);
        }
        if !engine.is_running() {
            return Err(FourTrackError::EngineUnavailable {
                reason: format!("engine is {}", engine.lifecycle()),
            });
        }

        let sample_rate = engine.sample_rate();
        if timeline.sample_rate() != sample_rate {
            timeline.set_sample_rate(sample_rate);
        }
        let start_time = timeline.playhead();
        if let Some(existing) = session.track(track).region_at(start_time) {
            return Err(FourTrackError::RegionOverlap {
                track: track.number(),
                start: existing.start_time,
                end: existing.end_time(),
            });
        }
        let limit = session.max_duration();
        if start_time >= limit {
            return Err(FourTrackError::InvalidRegion {
                reason: format!("playhead {:.3}s is at the {:.0}s session limit", start_time, limit),
            });
        }

        let start_frame = timeline.playhead_frames();
        let end_frame = secs_to_frames(limit, sample_rate);
        let max_frames = end_frame.saturating_sub(start_frame) as usize;
        let ring_frames = ((self.ring_secs * sample_rate as f32) as usize).max(1);
        let (producer, consumer) = HeapRb::<f32>::new(ring_frames).split();

        timeline.record();
        timeline.set_end(Some(limit));
        if let Err(e) = engine.start_transport(
            TransportState::Recording,
            start_frame,
            Arc::new(backing),
            None,
            Some(end_frame),
        ) {
            timeline.stop(false);
            return Err(e);
        }

        self.level.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.take = Some(ActiveTake {
            track,
            start_time,
            sample_rate,
            consumer,
            samples: Vec::with_capacity(ring_frames),
            max_frames,
        });
        info!(%track, start_time, sample_rate, "Recording started");

        Ok(InputPort {
            producer,
            level: self.level.clone(),
            dropped: self.dropped.clone(),
        })
    }

    /// Move captured input into the take; returns frames moved
    pub fn pump(&mut self) -> usize {
        match self.take.as_mut() {
            Some(take) => take.drain(),
            None => 0,
        }
    }

    /// Finish the take: write it to disk and place it on the armed track
    ///
    /// The timeline is stopped whatever the outcome. A take that would
    /// overlap an existing region is rejected and its file removed.
    pub fn stop_recording(
        &mut self,
        session: &mut Session,
        timeline: &mut Timeline,
        engine: &mut AudioEngine,
    ) -> Result<RecordingOutcome> {
        let Some(mut take) = self.take.take() else {
            return Err(FourTrackError::InvalidTransition {
                operation: "stop recording",
                state: "not recording".to_string(),
            });
        };
        timeline.sync(&engine.telemetry());
        if let Err(e) = engine.stop_transport() {
            warn!(error = %e, "Engine did not acknowledge recording stop");
        }
        timeline.stop(false);
        take.drain();

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            warn!(dropped, "Input frames dropped while recording");
        }
        self.level.store(0, Ordering::Relaxed);

        let track = take.track;
        if take.samples.is_empty() {
            info!(%track, "Empty take discarded");
            return Ok(RecordingOutcome::Discarded { track });
        }

        let frames = take.samples.len() as u64;
        let duration = frames_to_secs(frames, take.sample_rate);
        let file = self.write_take(&take)?;

        let region = Region::new(&file, take.start_time, duration, 0.0)
            .and_then(|region| session.insert_region(track, region.clone()).map(|_| region));
        match region {
            Ok(region) => {
                info!(%track, start = take.start_time, duration, file = %file.display(), "Take recorded");
                Ok(RecordingOutcome::Recorded { track, region, file })
            }
            Err(e) => {
                warn!(%track, error = %e, "Take rejected; removing file");
                if let Err(remove) = fs::remove_file(&file) {
                    warn!(file = %file.display(), error = %remove, "Could not remove rejected take");
                }
                Err(e)
            }
        }
    }

    fn write_take(&self, take: &ActiveTake) -> Result<PathBuf> {
        fs::create_dir_all(&self.recordings_dir).map_err(|e| FourTrackError::DiskWrite {
            path: self.recordings_dir.clone(),
            reason: e.to_string(),
        })?;
        let file = self
            .recordings_dir
            .join(format!("take-{}-{}.wav", take.track.number(), Uuid::new_v4()));
        let buffer = AudioBuffer::from_mono(take.samples.clone(), take.sample_rate);
        if let Err(e) = export_audio(&buffer, &file, ExportFormat::lossless()) {
            if file.exists() {
                if let Err(remove) = fs::remove_file(&file) {
                    warn!(file = %file.display(), error = %remove, "Could not remove partial take");
                }
            }
            return Err(e);
        }
        Ok(file)
    }

    /// Held input peak in [0, 1]
    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed)).clamp(0.0, 1.0)
    }

    /// Length of the take so far, in seconds
    pub fn recorded_duration(&self) -> f64 {
        self.take
            .as_ref()
            .map(|take| frames_to_secs(take.samples.len() as u64, take.sample_rate))
            .unwrap_or(0.0)
    }

    /// Input frames that did not fit in the ring during this take
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{ManualClock, ManualDriver};

    fn setup(dir: &Path) -> (Recorder, AudioEngine, ManualClock, Timeline) {
        let mut engine = AudioEngine::new(EngineConfig {
            sample_rate: 1000,
            ..EngineConfig::default()
        })
        .unwrap();
        let (driver, clock) = ManualDriver::new();
        engine.start(Box::new(driver)).unwrap();
        let recorder = Recorder::new(Box::new(StaticPermission::granted()), dir, 2.0);
        (recorder, engine, clock, Timeline::new(1000))
    }

    fn t(n: usize) -> TrackIndex {
        TrackIndex::new(n).unwrap()
    }

    #[test]
    fn test_requires_armed_track() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, mut engine, _clock, mut timeline) = setup(dir.path());
        let session = Session::new("unarmed");
        let err = recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_TRACK_ARMED");
        assert!(timeline.is_stopped());
    }

    #[test]
    fn test_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut engine, _clock, mut timeline) = setup(dir.path());
        let mut recorder = Recorder::new(Box::new(StaticPermission::denied()), dir.path(), 2.0);
        recorder.arm(t(1)).unwrap();
        let err = recorder
            .start_recording(&Session::new("denied"), &mut timeline, &mut engine, Schedule::default())
            .unwrap_err();
        assert!(matches!(err, FourTrackError::PermissionDenied));
        assert!(timeline.is_stopped());
    }

    #[test]
    fn test_playhead_inside_region_rejected_early() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, mut engine, _clock, mut timeline) = setup(dir.path());
        let mut session = Session::new("early");
        session
            .insert_region(t(2), Region::new(dir.path().join("x.wav"), 1.0, 2.0, 0.0).unwrap())
            .unwrap();
        recorder.arm(t(2)).unwrap();
        timeline.seek(1.5);
        let err = recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "REGION_OVERLAP");
        assert!(timeline.is_stopped());
    }

    #[test]
    fn test_take_becomes_region() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, mut engine, mut clock, mut timeline) = setup(dir.path());
        let mut session = Session::new("take");
        recorder.arm(t(3)).unwrap();
        timeline.seek(0.5);

        let mut port = recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap();
        assert!(timeline.is_recording());
        assert!(recorder.arm(t(1)).is_err());

        for _ in 0..4 {
            assert_eq!(port.push(&[0.25; 250]), 250);
            clock.pull(250);
            recorder.pump();
        }
        assert_eq!(recorder.recorded_duration(), 1.0);
        assert!(recorder.input_level() > 0.2);

        let outcome = recorder.stop_recording(&mut session, &mut timeline, &mut engine).unwrap();
        let RecordingOutcome::Recorded { track, region, file } = outcome else {
            panic!("expected a recorded take");
        };
        assert_eq!(track, t(3));
        assert_eq!(region.start_time, 0.5);
        assert_eq!(region.duration, 1.0);
        assert_eq!(region.file_start_offset, 0.0);
        assert!(file.exists());
        assert_eq!(session.track(t(3)).regions.len(), 1);
        assert!(timeline.is_stopped());
    }

    #[test]
    fn test_empty_take_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, mut engine, _clock, mut timeline) = setup(dir.path());
        let mut session = Session::new("empty");
        recorder.arm(t(1)).unwrap();
        recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap();
        let outcome = recorder.stop_recording(&mut session, &mut timeline, &mut engine).unwrap();
        assert_eq!(outcome, RecordingOutcome::Discarded { track: t(1) });
        assert!(session.is_empty());
    }

    #[test]
    fn test_overlapping_take_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut recorder, mut engine, _clock, mut timeline) = setup(dir.path());
        let mut session = Session::new("overlap");
        recorder.arm(t(1)).unwrap();
        let mut port = recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap();
        port.push(&[0.1; 500]);

        // Another edit lands on the track mid-take
        session
            .insert_region(t(1), Region::new(dir.path().join("other.wav"), 0.25, 1.0, 0.0).unwrap())
            .unwrap();

        let err = recorder.stop_recording(&mut session, &mut timeline, &mut engine).unwrap_err();
        assert_eq!(err.error_code(), "REGION_OVERLAP");
        assert!(timeline.is_stopped());
        let takes = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("take-"))
            .count();
        assert_eq!(takes, 0);
    }

    #[test]
    fn test_full_ring_counts_dropped_frames() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut engine, _clock, mut timeline) = setup(dir.path());
        let mut recorder = Recorder::new(Box::new(StaticPermission::granted()), dir.path(), 0.1);
        recorder.arm(t(1)).unwrap();
        let mut port = recorder
            .start_recording(&Session::new("ring"), &mut timeline, &mut engine, Schedule::default())
            .unwrap();
        assert_eq!(port.push_interleaved(&[0.5; 400], 2), 100);
        assert_eq!(recorder.dropped_frames(), 100);
        assert!(format!("{:?}", port).contains("dropped: 100"));
    }

    #[test]
    fn test_unwritable_take_leaves_no_region() {
        let dir = tempfile::tempdir().unwrap();
        let (_, mut engine, _clock, mut timeline) = setup(dir.path());
        // A plain file where the recordings directory should be
        let blocked = dir.path().join("recordings");
        fs::write(&blocked, b"not a directory").unwrap();
        let mut recorder = Recorder::new(Box::new(StaticPermission::granted()), &blocked, 2.0);
        let mut session = Session::new("blocked");
        recorder.arm(t(1)).unwrap();
        let mut port = recorder
            .start_recording(&session, &mut timeline, &mut engine, Schedule::default())
            .unwrap();
        port.push(&[0.2; 100]);

        let err = recorder.stop_recording(&mut session, &mut timeline, &mut engine).unwrap_err();
        assert_eq!(err.error_code(), "DISK_WRITE");
        assert!(session.is_empty());
        assert!(timeline.is_stopped());
        assert!(!recorder.is_recording());
    }
}
