//! Integration Tests
//!
//! End-to-end tests for a studio context driven by a manual clock.

use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;

use fourtrack::engine::io::{export_audio, generate_test_tone, probe, probe_duration, ExportFormat};
use fourtrack::state::{JsonFileStore, SaturationSettings, SessionStore};
use fourtrack::studio::{RecordingOutcome, StaticPermission};
use fourtrack::{
    BounceError, FourTrackError, ManualClock, ManualDriver, Region, Session, StudioConfig,
    StudioContext, TrackFx, TrackIndex, TransportState,
};

const RATE: u32 = 48000;

fn track(n: usize) -> TrackIndex {
    TrackIndex::new(n).unwrap()
}

/// Helper to write a mono sine file
fn write_tone(dir: &Path, name: &str, frequency: f32, secs: f64) -> PathBuf {
    let path = dir.join(name);
    let tone = generate_test_tone(frequency, 0.5, secs, RATE);
    export_audio(&tone, &path, ExportFormat::lossless()).unwrap();
    path
}

fn config(dir: &Path) -> StudioConfig {
    StudioConfig {
        recordings_dir: dir.join("recordings"),
        store_root: dir.join("store"),
        ..StudioConfig::default()
    }
}

fn studio(dir: &Path, session: Session) -> (StudioContext, ManualClock) {
    let mut ctx = StudioContext::new(config(dir), session, Box::new(StaticPermission::granted())).unwrap();
    let (driver, clock) = ManualDriver::new();
    ctx.start_engine(Box::new(driver)).unwrap();
    (ctx, clock)
}

// === Region Placement ===

#[test]
fn test_adjacent_regions_do_not_overlap() {
    let mut session = Session::new("adjacent");
    session
        .insert_region(track(1), Region::new("a.wav", 0.0, 2.0, 0.0).unwrap())
        .unwrap();
    session
        .insert_region(track(1), Region::new("b.wav", 2.0, 2.0, 0.0).unwrap())
        .unwrap();

    let regions = session.track(track(1)).regions_sorted();
    assert_eq!(regions.len(), 2);
    for pair in regions.windows(2) {
        assert!(pair[0].end_time() <= pair[1].start_time);
    }
}

#[test]
fn test_overlapping_region_is_rejected() {
    let mut session = Session::new("overlap");
    session
        .insert_region(track(2), Region::new("long.wav", 0.0, 5.0, 0.0).unwrap())
        .unwrap();
    let before = session.clone();

    let err = session
        .insert_region(track(2), Region::new("short.wav", 2.0, 2.0, 0.0).unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        FourTrackError::RegionOverlap { track: 2, start, end } if start == 0.0 && end == 5.0
    ));
    assert_eq!(session, before);

    // Other tracks are independent
    session
        .insert_region(track(3), Region::new("short.wav", 2.0, 2.0, 0.0).unwrap())
        .unwrap();
}

// === Recording ===

#[test]
fn test_three_second_recording_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), Session::new("record"));
    ctx.arm(track(1)).unwrap();

    let mut port = ctx.start_recording().unwrap();
    assert_eq!(ctx.timeline().state(), TransportState::Recording);

    let block = vec![0.3f32; 1000];
    for _ in 0..(3 * RATE as usize / 1000) {
        assert_eq!(port.push(&block), 1000);
        clock.pull(1000);
        assert!(ctx.poll().unwrap().is_none());
    }
    let telemetry = ctx.telemetry();
    assert_abs_diff_eq!(telemetry.recording_duration, 3.0, epsilon = 1e-9);
    assert!(telemetry.input_level > 0.25);

    let outcome = ctx.stop(false).unwrap();
    let Some(RecordingOutcome::Recorded { region, file, .. }) = outcome else {
        panic!("expected a recorded take, got {:?}", outcome);
    };
    assert_eq!(region.start_time, 0.0);
    assert_abs_diff_eq!(region.duration, 3.0, epsilon = 1.0 / RATE as f64);
    assert_eq!(region.file_start_offset, 0.0);
    assert_abs_diff_eq!(probe_duration(&file).unwrap(), 3.0, epsilon = 1.0 / RATE as f64);

    assert_eq!(ctx.session().track(track(1)).regions.len(), 1);
    assert_eq!(ctx.timeline().state(), TransportState::Stopped);
}

#[test]
fn test_recording_plays_other_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "backing.wav", 220.0, 2.0);
    let mut session = Session::new("overdub");
    session
        .insert_region(track(2), Region::new(&tone, 0.0, 2.0, 0.0).unwrap())
        .unwrap();

    let (mut ctx, mut clock) = studio(dir.path(), session);
    ctx.arm(track(1)).unwrap();
    let _port = ctx.start_recording().unwrap();
    clock.pull(4800);
    ctx.poll().unwrap();

    let telemetry = ctx.telemetry();
    assert!(telemetry.track_peaks[1] > 0.1);
    assert!(telemetry.master_peak > 0.1);
}

// === Bounce ===

#[test]
fn test_empty_session_bounce() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, _clock) = studio(dir.path(), Session::new("empty"));
    let output = dir.path().join("empty.wav");

    let err = ctx.bounce(&output, |_| {}).unwrap_err();
    assert!(matches!(err, FourTrackError::Bounce(BounceError::SessionEmpty)));
    assert_eq!(err.error_code(), "SESSION_EMPTY");
    assert!(!output.exists());
}

#[test]
fn test_bounce_duration_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 330.0, 1.25);
    let mut session = Session::new("mixdown");
    session
        .insert_region(track(1), Region::new(&tone, 0.0, 1.25, 0.0).unwrap())
        .unwrap();
    session
        .insert_region(track(4), Region::new(&tone, 0.7, 1.0, 0.1).unwrap())
        .unwrap();
    let max_end = session.max_region_end();

    let (ctx, _clock) = studio(dir.path(), session);
    let output = dir.path().join("mix.wav");
    let mut updates = 0;
    let mix = ctx.bounce(&output, |_| updates += 1).unwrap();

    assert!(updates > 0);
    assert_abs_diff_eq!(probe_duration(&output).unwrap(), max_end, epsilon = 1.0 / RATE as f64);
    assert_abs_diff_eq!(mix.duration, max_end, epsilon = 1.0 / RATE as f64);
    let info = probe(&output).unwrap();
    assert_eq!(info.channels, 2);
    assert_eq!(info.sample_rate, RATE);

    let store = JsonFileStore::open(dir.path().join("store")).unwrap();
    store.save_mix(&mix).unwrap();
    let listed = store.list_mixes().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, mix.id);
    assert_eq!(listed[0].file, output);
}

// === Transport ===

#[test]
fn test_stop_and_resume_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 220.0, 1.0);
    let mut session = Session::new("lifecycle");
    session
        .insert_region(track(1), Region::new(&tone, 0.0, 1.0, 0.0).unwrap())
        .unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), session);

    assert!(ctx.stop(false).unwrap().is_none());
    assert!(ctx.stop(true).unwrap().is_none());

    ctx.play().unwrap();
    clock.pull(512);
    ctx.suspend_engine().unwrap();
    ctx.suspend_engine().unwrap();
    assert_eq!(ctx.timeline().state(), TransportState::Stopped);
    assert_eq!(clock.pull(512), 0);

    ctx.resume_engine().unwrap();
    ctx.resume_engine().unwrap();
    assert!(ctx.diagnostics().is_healthy());

    let report = ctx.play().unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(clock.pull(512), 512);
    ctx.poll().unwrap();
    assert_eq!(ctx.timeline().state(), TransportState::Playing);
}

#[test]
fn test_loop_keeps_playhead_in_range() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), Session::new("loop"));
    ctx.set_loop(true, 2.0, 5.0).unwrap();
    ctx.seek(0.0).unwrap();
    ctx.play().unwrap();
    assert_abs_diff_eq!(ctx.timeline().playhead(), 2.0);

    let blocks = 20 * RATE as usize / 441;
    for _ in 0..blocks {
        clock.pull(441);
        ctx.poll().unwrap();
        let playhead = ctx.timeline().playhead();
        assert!((2.0..5.0).contains(&playhead), "playhead {} escaped the loop", playhead);
    }
    assert_eq!(ctx.timeline().state(), TransportState::Playing);
    assert!(ctx.engine().telemetry().loop_count >= 6);
}

#[test]
fn test_playback_stops_at_last_region_end() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "short.wav", 220.0, 0.5);
    let mut session = Session::new("end");
    session
        .insert_region(track(3), Region::new(&tone, 0.0, 0.5, 0.0).unwrap())
        .unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), session);

    ctx.play().unwrap();
    clock.run(RATE as usize, 1024);
    ctx.poll().unwrap();
    assert_eq!(ctx.timeline().state(), TransportState::Stopped);
    assert_abs_diff_eq!(ctx.timeline().playhead(), 0.5, epsilon = 1e-9);
}

#[test]
fn test_missing_source_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 220.0, 1.0);
    let mut session = Session::new("missing");
    session
        .insert_region(track(1), Region::new(&tone, 0.0, 1.0, 0.0).unwrap())
        .unwrap();
    session
        .insert_region(track(2), Region::new(dir.path().join("deleted.wav"), 0.0, 1.0, 0.0).unwrap())
        .unwrap();
    let (mut ctx, _clock) = studio(dir.path(), session);

    let report = ctx.play().unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].track, track(2));
}

// === Effects ===

#[test]
fn test_fx_change_during_playback_has_no_discontinuity() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 220.0, 2.0);
    let mut session = Session::new("fx");
    session
        .insert_region(track(1), Region::new(&tone, 0.0, 2.0, 0.0).unwrap())
        .unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), session);
    ctx.play().unwrap();

    let mut left = vec![0.0f32; 512];
    let mut right = vec![0.0f32; 512];
    let mut previous = (0.0f32, 0.0f32);
    let mut max_step = 0.0f32;

    for block in 0..60 {
        if block == 20 {
            ctx.set_track_fx(
                track(1),
                TrackFx {
                    volume_db: -12.0,
                    pan: 0.5,
                    saturation: SaturationSettings {
                        wet_mix: 100.0,
                        pre_gain_db: 6.0,
                    },
                    ..TrackFx::default()
                },
            );
        }
        clock.pull_into(&mut left, &mut right);
        for (&l, &r) in left.iter().zip(&right) {
            max_step = max_step.max((l - previous.0).abs()).max((r - previous.1).abs());
            previous = (l, r);
        }
    }

    // A 220 Hz sine at 0.5 moves at most ~0.015 per sample; a hard gain
    // switch at a peak would jump by several tenths.
    assert!(max_step < 0.05, "step of {} at the transition", max_step);
    assert_eq!(ctx.session().track(track(1)).fx.volume_db, -12.0);
}

#[test]
fn test_mute_during_playback_fades() {
    let dir = tempfile::tempdir().unwrap();
    let tone = write_tone(dir.path(), "tone.wav", 220.0, 2.0);
    let mut session = Session::new("mute");
    session
        .insert_region(track(2), Region::new(&tone, 0.0, 2.0, 0.0).unwrap())
        .unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), session);
    ctx.play().unwrap();

    let mut left = vec![0.0f32; 512];
    let mut right = vec![0.0f32; 512];
    let mut previous = 0.0f32;
    let mut max_step = 0.0f32;
    for block in 0..40 {
        if block == 10 {
            ctx.set_track_muted(track(2), true);
        }
        if block == 25 {
            ctx.set_track_muted(track(2), false);
        }
        clock.pull_into(&mut left, &mut right);
        for &l in &left {
            max_step = max_step.max((l - previous).abs());
            previous = l;
        }
        if block == 24 {
            assert!(left.iter().all(|&s| s == 0.0));
        }
    }

    assert!(max_step < 0.05, "step of {} around the mute", max_step);
    assert!(!ctx.session().track(track(2)).muted);
}

#[test]
fn test_load_session_resets_timeline() {
    let dir = tempfile::tempdir().unwrap();
    let (mut ctx, mut clock) = studio(dir.path(), Session::new("first"));
    ctx.set_loop(true, 1.0, 2.0).unwrap();
    ctx.seek(1.5).unwrap();
    ctx.play().unwrap();
    clock.pull(1024);

    let next = Session::new("second");
    let id = next.id;
    ctx.load_session(next).unwrap();
    assert_eq!(ctx.session().id, id);
    assert_eq!(ctx.timeline().state(), TransportState::Stopped);
    assert_eq!(ctx.timeline().playhead(), 0.0);
    assert!(!ctx.timeline().loop_enabled());
}
