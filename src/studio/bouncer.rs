//! Offline mixdown
//!
//! A bounce renders the whole session through its own `Renderer`, never the
//! live engine, as fast as the machine allows, and writes one stereo WAV.
//! Output goes to `<output>.<uuid>.partial` first and is renamed into place
//! after the writer finalizes, so a failed bounce never clobbers an earlier
//! one and two bounces to the same path never share a scratch file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::engine::io::{create_writer, write_sample, ExportFormat};
use crate::engine::{Renderer, TransportState};
use crate::state::{Mix, Session};
use crate::studio::player::{build_schedule, SourceCache};

/// Frames rendered per pass
const BOUNCE_BLOCK: usize = 4096;

/// Why a bounce did not produce a file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BounceError {
    #[error("session has no regions to bounce")]
    SessionEmpty,

    #[error("failed to write {}: {reason}", path.display())]
    WriteFailed { path: PathBuf, reason: String },

    #[error("render failed: {reason}")]
    RenderFailed { reason: String },

    #[error("session {session_id} is already being bounced")]
    AlreadyInProgress { session_id: Uuid },

    #[error("bounce cancelled")]
    Cancelled,
}

impl BounceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BounceError::SessionEmpty => "SESSION_EMPTY",
            BounceError::WriteFailed { .. } => "BOUNCE_WRITE_FAILED",
            BounceError::RenderFailed { .. } => "BOUNCE_RENDER_FAILED",
            BounceError::AlreadyInProgress { .. } => "BOUNCE_IN_PROGRESS",
            BounceError::Cancelled => "BOUNCE_CANCELLED",
        }
    }
}

/// Progress reported after every rendered block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceProgress {
    pub rendered_frames: u64,
    pub total_frames: u64,
    /// 0-100
    pub percent: f32,
}

impl BounceProgress {
    fn new(rendered_frames: u64, total_frames: u64) -> Self {
        let percent = if total_frames == 0 {
            100.0
        } else {
            (rendered_frames as f64 / total_frames as f64 * 100.0) as f32
        };
        Self {
            rendered_frames,
            total_frames,
            percent,
        }
    }

    pub fn is_done(&self) -> bool {
        self.rendered_frames >= self.total_frames
    }
}

/// Removes a session id from the in-flight set when dropped
struct InFlight {
    sessions: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.sessions.lock().remove(&self.id);
    }
}

/// Scratch file next to `output`, unique to one bounce
fn partial_path(output: &Path, bounce: Uuid) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(format!(".{}.partial", bounce));
    PathBuf::from(name)
}

// ============================================================================
// Bouncer
// ============================================================================

#[derive(Clone)]
pub struct SessionBouncer {
    format: ExportFormat,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Default for SessionBouncer {
    fn default() -> Self {
        Self::new(ExportFormat::default())
    }
}

impl SessionBouncer {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Whether a bounce of this session is running
    pub fn is_bouncing(&self, session_id: Uuid) -> bool {
        self.in_flight.lock().contains(&session_id)
    }

    fn register(&self, session_id: Uuid) -> Result<InFlight, BounceError> {
        if !self.in_flight.lock().insert(session_id) {
            return Err(BounceError::AlreadyInProgress { session_id });
        }
        Ok(InFlight {
            sessions: self.in_flight.clone(),
            id: session_id,
        })
    }

    /// Render the session to `output` on the calling thread
    pub fn bounce<F>(&self, session: &Session, output: &Path, progress: F) -> Result<Mix, BounceError>
    where
        F: FnMut(BounceProgress),
    {
        let _guard = self.register(session.id)?;
        render_session(session, output, self.format, progress, &AtomicBool::new(false))
    }

    /// Render on a worker thread
    ///
    /// Fails immediately with `AlreadyInProgress` if this session is being
    /// bounced already.
    pub fn spawn<F>(&self, session: Session, output: PathBuf, progress: F) -> Result<BounceHandle, BounceError>
    where
        F: FnMut(BounceProgress) + Send + 'static,
    {
        let guard = self.register(session.id)?;
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let format = self.format;
        let thread = std::thread::Builder::new()
            .name("fourtrack-bounce".to_string())
            .spawn(move || {
                let _guard = guard;
                render_session(&session, &output, format, progress, &flag)
            })
            .map_err(|e| BounceError::RenderFailed {
                reason: format!("could not start bounce worker: {}", e),
            })?;
        Ok(BounceHandle {
            thread: Some(thread),
            cancel,
        })
    }
}

/// A bounce running on a worker thread
pub struct BounceHandle {
    thread: Option<JoinHandle<Result<Mix, BounceError>>>,
    cancel: Arc<AtomicBool>,
}

impl BounceHandle {
    /// Ask the worker to stop; `join` then returns `Cancelled`
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the worker and take its result
    pub fn join(mut self) -> Result<Mix, BounceError> {
        match self.thread.take() {
            Some(thread) => thread.join().unwrap_or_else(|_| {
                Err(BounceError::RenderFailed {
                    reason: "bounce worker panicked".to_string(),
                })
            }),
            None => Err(BounceError::RenderFailed {
                reason: "bounce already joined".to_string(),
            }),
        }
    }
}

/// Interleave one stereo block into the writer
fn write_block<W: std::io::Write + std::io::Seek>(
    writer: &mut hound::WavWriter<W>,
    left: &[f32],
    right: &[f32],
    bit_depth: u16,
) -> Result<(), hound::Error> {
    for (&l, &r) in left.iter().zip(right) {
        write_sample(writer, l, bit_depth)?;
        write_sample(writer, r, bit_depth)?;
    }
    Ok(())
}

#[instrument(skip(session, progress, cancel), fields(session_name = %session.name))]
fn render_session<F>(
    session: &Session,
    output: &Path,
    format: ExportFormat,
    mut progress: F,
    cancel: &AtomicBool,
) -> Result<Mix, BounceError>
where
    F: FnMut(BounceProgress),
{
    if session.is_empty() {
        return Err(BounceError::SessionEmpty);
    }

    let sample_rate = if session.sample_rate > 0 {
        session.sample_rate
    } else {
        INTERNAL_SAMPLE_RATE
    };
    let duration = session.max_region_end();
    let total_frames = (duration * sample_rate as f64).ceil() as u64;

    let mut cache = SourceCache::default();
    let (schedule, skipped) = build_schedule(session, 0.0, f64::INFINITY, sample_rate, None, &mut cache);
    if let Some(first) = skipped.first() {
        return Err(BounceError::RenderFailed {
            reason: format!("cannot read {}: {}", first.source.display(), first.reason),
        });
    }

    let mut renderer = Renderer::offline(sample_rate, BOUNCE_BLOCK, 0);
    for track in &session.tracks {
        renderer.apply_fx_immediate(track.index, &track.fx);
        renderer.set_track_muted_immediate(track.index, track.muted);
    }
    renderer.start(TransportState::Playing, 0, Arc::new(schedule), None, None);

    let write_failed = |path: &Path, e: &dyn std::fmt::Display| BounceError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let partial = partial_path(output, Uuid::new_v4());
    let spec = format
        .spec(2, sample_rate)
        .map_err(|e| write_failed(&partial, &e))?;
    let mut writer = create_writer(&partial, spec).map_err(|e| write_failed(&partial, &e))?;
    debug!(total_frames, sample_rate, partial = %partial.display(), "Bounce started");

    let discard = |reason: BounceError| {
        if let Err(e) = fs::remove_file(&partial) {
            warn!(file = %partial.display(), error = %e, "Could not remove partial bounce");
        }
        reason
    };

    let mut left = vec![0.0f32; BOUNCE_BLOCK];
    let mut right = vec![0.0f32; BOUNCE_BLOCK];
    let mut rendered = 0u64;
    while rendered < total_frames {
        if cancel.load(Ordering::Relaxed) {
            drop(writer);
            info!(rendered, total_frames, "Bounce cancelled");
            return Err(discard(BounceError::Cancelled));
        }

        let len = (total_frames - rendered).min(BOUNCE_BLOCK as u64) as usize;
        renderer.render(&mut left[..len], &mut right[..len]);
        if renderer.telemetry().snapshot().nonfinite_blocks > 0 {
            drop(writer);
            return Err(discard(BounceError::RenderFailed {
                reason: format!("non-finite audio near {:.3}s", rendered as f64 / sample_rate as f64),
            }));
        }

        if let Err(e) = write_block(&mut writer, &left[..len], &right[..len], format.bit_depth) {
            drop(writer);
            return Err(discard(write_failed(&partial, &e)));
        }

        rendered += len as u64;
        progress(BounceProgress::new(rendered, total_frames));
    }

    if let Err(e) = writer.finalize() {
        return Err(discard(write_failed(&partial, &e)));
    }
    if let Err(e) = fs::rename(&partial, output) {
        return Err(discard(write_failed(output, &e)));
    }

    let seconds = total_frames as f64 / sample_rate as f64;
    info!(output = %output.display(), seconds, "Bounce complete");
    Ok(Mix::new(session, output.to_path_buf(), seconds))
}
