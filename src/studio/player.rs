//! Session playback
//!
//! Turns a session's regions into a frame-accurate `Schedule` and starts
//! the engine's transport with it. Decoded sources are cached by path and
//! modification time so replaying a session does not decode again.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::buffer::{secs_to_frames, AudioBuffer};
use crate::engine::io::{import_audio, validate_riff};
use crate::engine::{AudioEngine, Schedule, ScheduledRegion, Timeline, TransportState};
use crate::error::{FourTrackError, Result};
use crate::state::{Region, Session, TrackIndex};

/// A region left out of a schedule because its source could not be read
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRegion {
    pub track: TrackIndex,
    pub region_id: Uuid,
    pub source: PathBuf,
    pub reason: String,
}

/// What `play` actually scheduled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackReport {
    pub scheduled: usize,
    pub skipped: Vec<SkippedRegion>,
    /// Transport command sequence number
    pub seq: u64,
}

impl PlaybackReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

// ============================================================================
// Source cache
// ============================================================================

struct CachedSource {
    modified: Option<SystemTime>,
    sample_rate: u32,
    audio: Arc<AudioBuffer>,
}

/// Decoded region sources keyed by path
#[derive(Default)]
pub(crate) struct SourceCache {
    entries: HashMap<PathBuf, CachedSource>,
}

impl SourceCache {
    /// Decode `path` at `sample_rate`, reusing a cached copy if the file is unchanged
    pub(crate) fn load(&mut self, path: &Path, sample_rate: u32) -> Result<Arc<AudioBuffer>> {
        validate_riff(path)?;
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        if let Some(cached) = self.entries.get(path) {
            if cached.sample_rate == sample_rate && cached.modified == modified && modified.is_some() {
                return Ok(cached.audio.clone());
            }
        }

        let audio = Arc::new(import_audio(path, sample_rate)?);
        debug!(path = %path.display(), frames = audio.len(), "Decoded region source");
        self.entries.insert(
            path.to_path_buf(),
            CachedSource {
                modified,
                sample_rate,
                audio: audio.clone(),
            },
        );
        Ok(audio)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Resolve one region to frames at `sample_rate`
fn schedule_region(
    track: TrackIndex,
    region: &Region,
    sample_rate: u32,
    cache: &mut SourceCache,
) -> Result<ScheduledRegion> {
    let audio = cache.load(&region.source, sample_rate)?;
    let source_offset = secs_to_frames(region.file_start_offset, sample_rate);
    if source_offset >= audio.len() as u64 {
        return Err(FourTrackError::InvalidRegion {
            reason: format!(
                "file offset {:.3}s is past the end of {}",
                region.file_start_offset,
                region.source.display()
            ),
        });
    }
    Ok(ScheduledRegion {
        track,
        start_frame: secs_to_frames(region.start_time, sample_rate),
        end_frame: secs_to_frames(region.end_time(), sample_rate),
        source_offset,
        audio,
    })
}

/// Schedule every region intersecting `[from, until)` on all tracks but `exclude`
///
/// Regions whose sources fail to load are returned as skipped.
pub(crate) fn build_schedule(
    session: &Session,
    from: f64,
    until: f64,
    sample_rate: u32,
    exclude: Option<TrackIndex>,
    cache: &mut SourceCache,
) -> (Schedule, Vec<SkippedRegion>) {
    let mut regions = Vec::new();
    let mut skipped = Vec::new();

    for track in &session.tracks {
        if Some(track.index) == exclude {
            continue;
        }
        for region in track.regions_intersecting(from, until) {
            match schedule_region(track.index, region, sample_rate, cache) {
                Ok(scheduled) => regions.push(scheduled),
                Err(e) => {
                    warn!(
                        track = %track.index,
                        source = %region.source.display(),
                        error = %e,
                        "Skipping region"
                    );
                    skipped.push(SkippedRegion {
                        track: track.index,
                        region_id: region.id,
                        source: region.source.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    (Schedule::new(regions), skipped)
}

// ============================================================================
// Player
// ============================================================================

#[derive(Default)]
pub struct SessionPlayer {
    cache: SourceCache,
}

impl SessionPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start playback of every track from the playhead
    ///
    /// In loop mode only the loop range is scheduled and the renderer wraps
    /// at the loop end. Otherwise playback stops at the last region end, or
    /// at the session limit when the playhead is already past every region.
    pub fn play(
        &mut self,
        session: &Session,
        timeline: &mut Timeline,
        engine: &mut AudioEngine,
    ) -> Result<PlaybackReport> {
        if !timeline.is_stopped() {
            return Err(FourTrackError::InvalidTransition {
                operation: "play",
                state: timeline.state().to_string(),
            });
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
        timeline.play();

        let from = timeline.playhead();
        let looping = timeline.frame_loop();
        let (schedule, skipped) = match timeline.active_loop() {
            Some(range) => build_schedule(session, range.start, range.end, sample_rate, None, &mut self.cache),
            None => build_schedule(session, from, f64::INFINITY, sample_rate, None, &mut self.cache),
        };

        let end_secs = if looping.is_some() {
            None
        } else {
            let last_end = session.max_region_end();
            Some(if last_end > from { last_end } else { session.max_duration() })
        };
        timeline.set_end(end_secs);
        let end = end_secs.map(|t| secs_to_frames(t, sample_rate));

        let scheduled = schedule.len();
        let seq = match engine.start_transport(
            TransportState::Playing,
            timeline.playhead_frames(),
            Arc::new(schedule),
            looping,
            end,
        ) {
            Ok(seq) => seq,
            Err(e) => {
                timeline.stop(false);
                return Err(e);
            }
        };

        info!(
            from,
            scheduled,
            skipped = skipped.len(),
            looping = looping.is_some(),
            "Playback started"
        );
        Ok(PlaybackReport {
            scheduled,
            skipped,
            seq,
        })
    }

    /// Stop playback; the playhead stays where the engine stopped unless reset
    pub fn stop(&mut self, timeline: &mut Timeline, engine: &mut AudioEngine, reset_playhead: bool) -> Result<bool> {
        let snapshot = engine.telemetry();
        if timeline.state().is_running() {
            timeline.sync(&snapshot);
        }
        let result = engine.stop_transport();
        let was_running = timeline.stop(reset_playhead);
        result?;
        if was_running {
            info!(playhead = timeline.playhead(), "Playback stopped");
        }
        Ok(was_running)
    }

    pub fn seek(&self, timeline: &mut Timeline, time: f64) -> bool {
        timeline.seek(time)
    }

    /// Schedule the session for recording over, leaving out the armed track
    pub(crate) fn backing_schedule(
        &mut self,
        session: &Session,
        from: f64,
        sample_rate: u32,
        armed: TrackIndex,
    ) -> (Schedule, Vec<SkippedRegion>) {
        build_schedule(session, from, f64::INFINITY, sample_rate, Some(armed), &mut self.cache)
    }

    /// Forget decoded sources
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_sources(&self) -> usize {
        self.cache.len()
    }
}
