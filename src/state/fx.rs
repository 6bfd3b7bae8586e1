//! Per-track effect settings
//!
//! Strongly typed parameter structs, one per effect. Values are clamped at
//! the boundary so the engine only ever sees in-range snapshots.

use serde::{Deserialize, Serialize};

/// Track volume range in dB
pub const MIN_VOLUME_DB: f32 = -60.0;
pub const MAX_VOLUME_DB: f32 = 12.0;

/// Delay time range in seconds
pub const MIN_DELAY_SECS: f32 = 0.01;
pub const MAX_DELAY_SECS: f32 = 2.0;

/// Feedback above this would ring forever
pub const MAX_FEEDBACK_PERCENT: f32 = 95.0;

/// Saturation pre-gain range in dB
pub const MIN_PRE_GAIN_DB: f32 = -40.0;
pub const MAX_PRE_GAIN_DB: f32 = 20.0;

#[inline]
fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[inline]
fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// Reverb room model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoomSize {
    #[default]
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbSettings {
    /// Wet/dry mix, 0-100 %
    pub wet_mix: f32,
    pub room: RoomSize,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            wet_mix: 0.0,
            room: RoomSize::Small,
        }
    }
}

impl ReverbSettings {
    pub fn clamped(self) -> Self {
        Self {
            wet_mix: clamp_percent(self.wet_mix),
            room: self.room,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    /// Wet/dry mix, 0-100 %
    pub wet_mix: f32,
    /// Delay time in seconds
    pub time_secs: f32,
    /// Feedback, 0-95 %
    pub feedback: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            wet_mix: 0.0,
            time_secs: 0.25,
            feedback: 30.0,
        }
    }
}

impl DelaySettings {
    pub fn clamped(self) -> Self {
        Self {
            wet_mix: clamp_percent(self.wet_mix),
            time_secs: clamp_finite(self.time_secs, MIN_DELAY_SECS, MAX_DELAY_SECS, 0.25),
            feedback: clamp_finite(self.feedback, 0.0, MAX_FEEDBACK_PERCENT, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationSettings {
    /// Wet/dry mix, 0-100 %
    pub wet_mix: f32,
    /// Drive into the waveshaper, in dB
    pub pre_gain_db: f32,
}

impl Default for SaturationSettings {
    fn default() -> Self {
        Self {
            wet_mix: 0.0,
            pre_gain_db: 0.0,
        }
    }
}

impl SaturationSettings {
    pub fn clamped(self) -> Self {
        Self {
            wet_mix: clamp_percent(self.wet_mix),
            pre_gain_db: clamp_finite(self.pre_gain_db, MIN_PRE_GAIN_DB, MAX_PRE_GAIN_DB, 0.0),
        }
    }
}

/// Complete effect settings for one track
///
/// `Copy` so the control domain can hand snapshots to the render domain
/// through a channel without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFx {
    pub volume_db: f32,
    /// -1 (hard left) to 1 (hard right)
    pub pan: f32,
    pub reverb: ReverbSettings,
    pub delay: DelaySettings,
    pub saturation: SaturationSettings,
}

impl Default for TrackFx {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            pan: 0.0,
            reverb: ReverbSettings::default(),
            delay: DelaySettings::default(),
            saturation: SaturationSettings::default(),
        }
    }
}

impl TrackFx {
    /// Range-clamp every field
    pub fn clamped(self) -> Self {
        Self {
            volume_db: clamp_finite(self.volume_db, MIN_VOLUME_DB, MAX_VOLUME_DB, 0.0),
            pan: clamp_finite(self.pan, -1.0, 1.0, 0.0),
            reverb: self.reverb.clamped(),
            delay: self.delay.clamped(),
            saturation: self.saturation.clamped(),
        }
    }

    pub fn set_volume_db(&mut self, db: f32) {
        self.volume_db = clamp_finite(db, MIN_VOLUME_DB, MAX_VOLUME_DB, 0.0);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = clamp_finite(pan, -1.0, 1.0, 0.0);
    }

    pub fn set_reverb(&mut self, reverb: ReverbSettings) {
        self.reverb = reverb.clamped();
    }

    pub fn set_delay(&mut self, delay: DelaySettings) {
        self.delay = delay.clamped();
    }

    pub fn set_saturation(&mut self, saturation: SaturationSettings) {
        self.saturation = saturation.clamped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-100.0, MIN_VOLUME_DB ; "volume below range")]
    #[test_case(40.0, MAX_VOLUME_DB ; "volume above range")]
    #[test_case(-6.0, -6.0 ; "volume in range")]
    #[test_case(f32::NAN, 0.0 ; "volume nan")]
    fn test_volume_clamp(input: f32, expected: f32) {
        let mut fx = TrackFx::default();
        fx.set_volume_db(input);
        assert_eq!(fx.volume_db, expected);
    }

    #[test]
    fn test_clamped_snapshot() {
        let fx = TrackFx {
            volume_db: 3.0,
            pan: 2.0,
            reverb: ReverbSettings {
                wet_mix: 150.0,
                room: RoomSize::Large,
            },
            delay: DelaySettings {
                wet_mix: -10.0,
                time_secs: 5.0,
                feedback: 120.0,
            },
            saturation: SaturationSettings {
                wet_mix: 50.0,
                pre_gain_db: -90.0,
            },
        }
        .clamped();

        assert_eq!(fx.pan, 1.0);
        assert_eq!(fx.reverb.wet_mix, 100.0);
        assert_eq!(fx.reverb.room, RoomSize::Large);
        assert_eq!(fx.delay.wet_mix, 0.0);
        assert_eq!(fx.delay.time_secs, MAX_DELAY_SECS);
        assert_eq!(fx.delay.feedback, MAX_FEEDBACK_PERCENT);
        assert_eq!(fx.saturation.pre_gain_db, MIN_PRE_GAIN_DB);
    }

    #[test]
    fn test_serde_defaults_for_missing_fields() {
        let fx: TrackFx = serde_json::from_str(r#"{ "volume_db": -3.0 }"#).unwrap();
        assert_eq!(fx.volume_db, -3.0);
        assert_eq!(fx.delay, DelaySettings::default());
    }
}
