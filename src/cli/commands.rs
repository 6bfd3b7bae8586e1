//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command against a
//! `JsonFileStore`.

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StudioConfig;
use crate::engine::io::{probe_duration, validate_riff, ExportFormat};
use crate::engine::{AudioEngine, ManualDriver};
use crate::error::{FourTrackError, Result};
use crate::state::{JsonFileStore, Region, Session, SessionStore, Tier, TrackIndex};
use crate::studio::SessionBouncer;

/// Create a new session and store it.
pub fn new_session(
    config: &StudioConfig,
    name: &str,
    tier: Option<Tier>,
    tempo: Option<f64>,
) -> Result<Uuid> {
    let store = JsonFileStore::open(&config.store_root)?;
    let mut session = Session::with_tier(name, tier.unwrap_or(config.tier));
    session.sample_rate = config.engine.sample_rate;
    if let Some(bpm) = tempo {
        session.set_tempo(bpm);
    }
    store.save_session(&session)?;
    info!(id = %session.id, "Session created");

    println!("Session created: {} ({})", session.name, session.id);
    println!("Tier: {:?}, max {:.0}s", session.tier, session.max_duration());
    Ok(session.id)
}

/// List stored sessions.
pub fn list_sessions(config: &StudioConfig) -> Result<()> {
    let store = JsonFileStore::open(&config.store_root)?;
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("No sessions in {}", config.store_root.display());
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {:<24} {:>2} regions  {:>7.2}s",
            session.id,
            session.name,
            session.region_count(),
            session.max_region_end()
        );
    }
    Ok(())
}

/// Print a session's tracks and regions.
pub fn inspect(config: &StudioConfig, id: Uuid) -> Result<()> {
    let store = JsonFileStore::open(&config.store_root)?;
    let session = store.load_session(id)?;

    println!("Session: {} ({})", session.name, session.id);
    println!("Created: {}", session.created_at);
    println!(
        "Tempo: {:.1} BPM, {}/{}",
        session.tempo_bpm, session.time_signature.beats_per_bar, session.time_signature.beat_unit
    );
    println!("Sample rate: {} Hz", session.sample_rate);
    println!("Length: {:.3}s of {:.0}s", session.max_region_end(), session.max_duration());

    for track in &session.tracks {
        let mute = if track.muted { " (muted)" } else { "" };
        println!(
            "\n{}{}: {:+.1} dB, pan {:+.2}",
            track.index, mute, track.fx.volume_db, track.fx.pan
        );
        if track.is_empty() {
            println!("  (empty)");
        }
        for region in track.regions_sorted() {
            println!(
                "  {:>8.3}s - {:>8.3}s  {}  [{}]",
                region.start_time,
                region.end_time(),
                region.source.display(),
                region.id
            );
        }
    }
    Ok(())
}

/// Place a WAV file on a track.
pub fn add_region(
    config: &StudioConfig,
    id: Uuid,
    track: usize,
    wav: &Path,
    start: f64,
    offset: f64,
    duration: Option<f64>,
) -> Result<Uuid> {
    let store = JsonFileStore::open(&config.store_root)?;
    let mut session = store.load_session(id)?;
    let track = TrackIndex::new(track)?;

    let file_length = probe_duration(wav)?;
    let duration = duration.unwrap_or(file_length - offset);
    if offset + duration > file_length + 1e-6 {
        return Err(FourTrackError::InvalidRegion {
            reason: format!(
                "{:.3}s from offset {:.3}s runs past the {:.3}s file",
                duration, offset, file_length
            ),
        });
    }

    let source = wav.canonicalize()?;
    let region_id = session.insert_region(track, Region::new(source, start, duration, offset)?)?;
    store.save_session(&session)?;

    println!(
        "Added region {} to {} at {:.3}s ({:.3}s long)",
        region_id, track, start, duration
    );
    Ok(region_id)
}

/// Bounce a session and record the mix.
pub fn bounce(config: &StudioConfig, id: Uuid, output: &Path) -> Result<()> {
    let store = JsonFileStore::open(&config.store_root)?;
    let session = store.load_session(id)?;
    let bouncer = SessionBouncer::new(ExportFormat::new(config.bounce_bit_depth));

    let mut last_percent = 0;
    let mix = bouncer.bounce(&session, output, |progress| {
        let percent = progress.percent as u32;
        if percent >= last_percent + 10 {
            last_percent = percent;
            info!(percent, "Bouncing");
        }
    })?;
    store.save_mix(&mix)?;

    println!("Bounced {} to {} ({:.3}s)", session.name, output.display(), mix.duration);
    Ok(())
}

/// List bounced mixes.
pub fn list_mixes(config: &StudioConfig) -> Result<()> {
    let store = JsonFileStore::open(&config.store_root)?;
    let mixes = store.list_mixes()?;
    if mixes.is_empty() {
        println!("No mixes in {}", config.store_root.display());
        return Ok(());
    }
    for mix in mixes {
        let missing = if mix.file.exists() { "" } else { "  (file missing)" };
        println!(
            "{}  {:<24} {:>7.2}s  {}{}",
            mix.id,
            mix.name,
            mix.duration,
            mix.file.display(),
            missing
        );
    }
    Ok(())
}

/// Run engine diagnostics for a session against a headless engine.
pub fn diagnose(config: &StudioConfig, id: Uuid) -> Result<()> {
    let store = JsonFileStore::open(&config.store_root)?;
    let session = store.load_session(id)?;

    let mut engine = AudioEngine::new(config.engine.clone())?;
    let (driver, _clock) = ManualDriver::new();
    engine.start(Box::new(driver))?;

    let diagnostics = engine.diagnostics(&session);
    println!("{}", diagnostics);

    let mut missing = 0;
    for track in &session.tracks {
        for region in track.regions_sorted() {
            if let Err(e) = validate_riff(&region.source) {
                warn!(track = %track.index, error = %e, "Unreadable region source");
                println!("  - {} region at {:.3}s: {}", track.index, region.start_time, e);
                missing += 1;
            }
        }
    }
    if missing == 0 {
        println!("All {} region sources readable", session.region_count());
    }

    engine.shutdown()?;
    Ok(())
}
