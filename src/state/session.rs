//! Session model
//!
//! A session is the unit a musician works in: four tracks, a tempo, a tier
//! that bounds how long the timeline may run. Every region edit goes through
//! `Session` so the non-overlap invariant is checked in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::track::{Region, Track, TrackIndex, TRACK_COUNT};
use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::error::{FourTrackError, Result};

/// Tempo range accepted by a session
pub const MIN_TEMPO_BPM: f64 = 20.0;
pub const MAX_TEMPO_BPM: f64 = 300.0;

/// Product tier; bounds the session length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tier {
    #[default]
    Standard,
    Extended,
}

impl Tier {
    /// Maximum session length in seconds
    pub fn max_duration(self) -> f64 {
        match self {
            Tier::Standard => 6.0 * 60.0,
            Tier::Extended => 8.0 * 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub tempo_bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    pub tracks: [Track; TRACK_COUNT],
}

fn default_sample_rate() -> u32 {
    INTERNAL_SAMPLE_RATE
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tier(name, Tier::Standard)
    }

    pub fn with_tier(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            tempo_bpm: 120.0,
            time_signature: TimeSignature::default(),
            tier,
            sample_rate: INTERNAL_SAMPLE_RATE,
            tracks: TrackIndex::ALL.map(Track::new),
        }
    }

    pub fn max_duration(&self) -> f64 {
        self.tier.max_duration()
    }

    pub fn set_tempo(&mut self, bpm: f64) {
        if bpm.is_finite() {
            self.tempo_bpm = bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM);
        }
    }

    pub fn track(&self, index: TrackIndex) -> &Track {
        &self.tracks[index.zero_based()]
    }

    pub fn track_mut(&mut self, index: TrackIndex) -> &mut Track {
        &mut self.tracks[index.zero_based()]
    }

    fn check_limit(&self, region: &Region) -> Result<()> {
        if region.end_time() > self.max_duration() + 1e-9 {
            return Err(FourTrackError::InvalidRegion {
                reason: format!(
                    "region ends at {:.3}s, past the {:.0}s session limit",
                    region.end_time(),
                    self.max_duration()
                ),
            });
        }
        Ok(())
    }

    fn check_placement(&self, index: TrackIndex, region: &Region, exclude: Option<Uuid>) -> Result<()> {
        region.validate()?;
        self.check_limit(region)?;
        if let Some(existing) =
            self.track(index)
                .overlapping_except(region.start_time, region.end_time(), exclude)
        {
            return Err(FourTrackError::RegionOverlap {
                track: index.number(),
                start: existing.start_time,
                end: existing.end_time(),
            });
        }
        Ok(())
    }

    /// Place a region on a track
    ///
    /// Fails with `RegionOverlap` if any existing region on the track
    /// intersects `[start_time, end_time)`; the session is left unchanged.
    pub fn insert_region(&mut self, index: TrackIndex, region: Region) -> Result<Uuid> {
        self.check_placement(index, &region, None)?;
        let id = region.id;
        self.track_mut(index).insert_sorted(region);
        Ok(id)
    }

    pub fn remove_region(&mut self, index: TrackIndex, id: Uuid) -> Result<Region> {
        self.track_mut(index)
            .take_region(id)
            .ok_or_else(|| FourTrackError::RegionNotFound { id: id.to_string() })
    }

    /// Reposition a region on its track
    pub fn move_region(&mut self, index: TrackIndex, id: Uuid, new_start: f64) -> Result<()> {
        let mut moved = self
            .track(index)
            .region(id)
            .cloned()
            .ok_or_else(|| FourTrackError::RegionNotFound { id: id.to_string() })?;
        moved.start_time = new_start;
        self.replace_region(index, moved)
    }

    /// Non-destructive trim: change which slice of the file the region plays
    pub fn trim_region(
        &mut self,
        index: TrackIndex,
        id: Uuid,
        file_start_offset: f64,
        duration: f64,
    ) -> Result<()> {
        let mut trimmed = self
            .track(index)
            .region(id)
            .cloned()
            .ok_or_else(|| FourTrackError::RegionNotFound { id: id.to_string() })?;
        trimmed.file_start_offset = file_start_offset;
        trimmed.duration = duration;
        self.replace_region(index, trimmed)
    }

    fn replace_region(&mut self, index: TrackIndex, updated: Region) -> Result<()> {
        self.check_placement(index, &updated, Some(updated.id))?;
        let track = self.track_mut(index);
        if track.take_region(updated.id).is_none() {
            return Err(FourTrackError::RegionNotFound {
                id: updated.id.to_string(),
            });
        }
        track.insert_sorted(updated);
        Ok(())
    }

    /// End of the last region across all tracks, 0 when empty
    pub fn max_region_end(&self) -> f64 {
        self.tracks.iter().map(Track::last_end).fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.iter().all(Track::is_empty)
    }

    pub fn region_count(&self) -> usize {
        self.tracks.iter().map(|t| t.regions.len()).sum()
    }

    /// Re-check every invariant; used after deserializing
    pub fn validate(&self) -> Result<()> {
        for (slot, track) in self.tracks.iter().enumerate() {
            if track.index.zero_based() != slot {
                return Err(FourTrackError::InvalidTrack {
                    index: track.index.number(),
                });
            }
            for (i, region) in track.regions.iter().enumerate() {
                region.validate()?;
                self.check_limit(region)?;
                if let Some(next) = track.regions.get(i + 1) {
                    if next.start_time < region.start_time {
                        return Err(FourTrackError::InvalidRegion {
                            reason: format!("regions on {} are not sorted", track.index),
                        });
                    }
                    if next.start_time < region.end_time() {
                        return Err(FourTrackError::RegionOverlap {
                            track: track.index.number(),
                            start: region.start_time,
                            end: region.end_time(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
