//! Tracks and regions
//!
//! A track is an ordered lane of non-overlapping regions. Regions are
//! half-open intervals `[start_time, start_time + duration)` on the session
//! timeline, each pointing at a slice of one audio file.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fx::TrackFx;
use crate::error::{FourTrackError, Result};

/// Number of tracks in every session
pub const TRACK_COUNT: usize = 4;

/// Track number, 1 to 4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct TrackIndex(u8);

impl TrackIndex {
    pub const ALL: [TrackIndex; TRACK_COUNT] =
        [TrackIndex(1), TrackIndex(2), TrackIndex(3), TrackIndex(4)];

    pub fn new(number: usize) -> Result<Self> {
        if (1..=TRACK_COUNT).contains(&number) {
            Ok(Self(number as u8))
        } else {
            Err(FourTrackError::InvalidTrack { index: number })
        }
    }

    /// The 1-based track number
    pub fn number(self) -> usize {
        self.0 as usize
    }

    /// Position in a `[_; TRACK_COUNT]` array
    pub fn zero_based(self) -> usize {
        self.0 as usize - 1
    }
}

impl TryFrom<u8> for TrackIndex {
    type Error = FourTrackError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value as usize)
    }
}

impl From<TrackIndex> for u8 {
    fn from(index: TrackIndex) -> u8 {
        index.0
    }
}

impl fmt::Display for TrackIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track {}", self.0)
    }
}

/// A placed slice of an audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: Uuid,
    /// Audio file backing this region
    pub source: PathBuf,
    /// Position on the session timeline, in seconds
    pub start_time: f64,
    /// Length on the timeline, in seconds
    pub duration: f64,
    /// Where in the source file playback begins, in seconds
    pub file_start_offset: f64,
}

impl Region {
    /// Create a region with a fresh id
    ///
    /// # Arguments
    /// * `source` - Audio file the region reads from
    /// * `start_time` - Timeline position in seconds (>= 0)
    /// * `duration` - Length in seconds (> 0)
    /// * `file_start_offset` - Offset into the file in seconds (>= 0)
    pub fn new(
        source: impl Into<PathBuf>,
        start_time: f64,
        duration: f64,
        file_start_offset: f64,
    ) -> Result<Self> {
        let region = Self {
            id: Uuid::new_v4(),
            source: source.into(),
            start_time,
            duration,
            file_start_offset,
        };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(FourTrackError::InvalidRegion {
                reason: format!("start time {} must be >= 0", self.start_time),
            });
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(FourTrackError::InvalidRegion {
                reason: format!("duration {} must be > 0", self.duration),
            });
        }
        if !self.file_start_offset.is_finite() || self.file_start_offset < 0.0 {
            return Err(FourTrackError::InvalidRegion {
                reason: format!("file offset {} must be >= 0", self.file_start_offset),
            });
        }
        Ok(())
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Half-open intersection test against `[start, end)`
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start_time < end && start < self.end_time()
    }

    /// Whether a timeline position falls inside this region
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }
}

/// One of the four lanes of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub index: TrackIndex,
    /// Sorted by `start_time`, never overlapping
    pub regions: Vec<Region>,
    #[serde(default)]
    pub fx: TrackFx,
    #[serde(default)]
    pub muted: bool,
}

impl Track {
    pub fn new(index: TrackIndex) -> Self {
        Self {
            index,
            regions: Vec::new(),
            fx: TrackFx::default(),
            muted: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions_sorted(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: Uuid) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// First region intersecting `[start, end)`, ignoring `exclude`
    pub fn overlapping(&self, start: f64, end: f64) -> Option<&Region> {
        self.overlapping_except(start, end, None)
    }

    pub(crate) fn overlapping_except(
        &self,
        start: f64,
        end: f64,
        exclude: Option<Uuid>,
    ) -> Option<&Region> {
        self.regions
            .iter()
            .filter(|r| Some(r.id) != exclude)
            .find(|r| r.overlaps(start, end))
    }

    /// Region covering a timeline position
    pub fn region_at(&self, time: f64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(time))
    }

    /// Regions intersecting `[start, end)`; pass `f64::INFINITY` for open-ended
    pub fn regions_intersecting(&self, start: f64, end: f64) -> impl Iterator<Item = &Region> {
        self.regions.iter().filter(move |r| r.overlaps(start, end))
    }

    pub fn last_end(&self) -> f64 {
        self.regions.iter().map(Region::end_time).fold(0.0, f64::max)
    }

    /// Insert keeping the start-time order
    pub(crate) fn insert_sorted(&mut self, region: Region) {
        let pos = self
            .regions
            .partition_point(|r| r.start_time <= region.start_time);
        self.regions.insert(pos, region);
    }

    pub(crate) fn take_region(&mut self, id: Uuid) -> Option<Region> {
        let pos = self.regions.iter().position(|r| r.id == id)?;
        Some(self.regions.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn region(start: f64, duration: f64) -> Region {
        Region::new("take.wav", start, duration, 0.0).unwrap()
    }

    #[test]
    fn test_track_index_bounds() {
        assert!(TrackIndex::new(0).is_err());
        assert!(TrackIndex::new(5).is_err());
        assert_eq!(TrackIndex::new(4).unwrap().zero_based(), 3);
        assert_eq!(TrackIndex::ALL.len(), TRACK_COUNT);
    }

    #[test]
    fn test_track_index_serde() {
        let idx = TrackIndex::new(2).unwrap();
        assert_eq!(serde_json::to_string(&idx).unwrap(), "2");
        assert!(serde_json::from_str::<TrackIndex>("7").is_err());
    }

    #[test_case(-1.0, 1.0, 0.0 ; "negative start")]
    #[test_case(0.0, 0.0, 0.0 ; "zero duration")]
    #[test_case(0.0, 1.0, -0.5 ; "negative offset")]
    #[test_case(f64::NAN, 1.0, 0.0 ; "nan start")]
    fn test_region_validation(start: f64, duration: f64, offset: f64) {
        assert!(matches!(
            Region::new("a.wav", start, duration, offset),
            Err(FourTrackError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn test_half_open_overlap() {
        let r = region(2.0, 2.0);
        assert!(r.overlaps(3.0, 5.0));
        assert!(r.overlaps(0.0, 2.5));
        // Touching boundaries do not overlap
        assert!(!r.overlaps(4.0, 6.0));
        assert!(!r.overlaps(0.0, 2.0));
    }

    #[test]
    fn test_insert_sorted() {
        let mut track = Track::new(TrackIndex::new(1).unwrap());
        track.insert_sorted(region(5.0, 1.0));
        track.insert_sorted(region(0.0, 1.0));
        track.insert_sorted(region(2.0, 1.0));
        let starts: Vec<f64> = track.regions_sorted().iter().map(|r| r.start_time).collect();
        assert_eq!(starts, vec![0.0, 2.0, 5.0]);
        assert_eq!(track.last_end(), 6.0);
    }

    #[test]
    fn test_regions_intersecting_open_ended() {
        let mut track = Track::new(TrackIndex::new(1).unwrap());
        track.insert_sorted(region(0.0, 1.0));
        track.insert_sorted(region(2.0, 1.0));
        track.insert_sorted(region(5.0, 1.0));
        let hits: Vec<f64> = track
            .regions_intersecting(2.5, f64::INFINITY)
            .map(|r| r.start_time)
            .collect();
        assert_eq!(hits, vec![2.0, 5.0]);
        assert!(track.region_at(0.5).is_some());
        assert!(track.region_at(1.5).is_none());
    }
}
