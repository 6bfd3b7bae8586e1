//! Engine self-checks
//!
//! Advisory only: nothing here changes engine state.

use std::fmt;

use serde::Serialize;

use crate::state::TrackIndex;

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineLifecycle {
    Running,
    Suspended,
    Shutdown,
}

impl fmt::Display for EngineLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineLifecycle::Running => write!(f, "running"),
            EngineLifecycle::Suspended => write!(f, "suspended"),
            EngineLifecycle::Shutdown => write!(f, "shut down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DiagnosticIssue {
    /// The session was made at a different rate than the engine runs at
    SampleRateMismatch { engine: u32, session: u32 },
    /// A bus can no longer be reached from the control domain
    DisconnectedBus(TrackIndex),
    /// The engine is running but no output route is open
    InactiveOutputRoute,
    EngineSuspended,
    EngineShutdown,
    /// Blocks replaced with silence because they were not finite
    NonFiniteOutput { blocks: u64 },
}

impl fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticIssue::SampleRateMismatch { engine, session } => write!(
                f,
                "session sample rate {} Hz differs from engine rate {} Hz",
                session, engine
            ),
            DiagnosticIssue::DisconnectedBus(track) => write!(f, "{} bus is disconnected", track),
            DiagnosticIssue::InactiveOutputRoute => write!(f, "no active output route"),
            DiagnosticIssue::EngineSuspended => write!(f, "engine is suspended"),
            DiagnosticIssue::EngineShutdown => write!(f, "engine is shut down"),
            DiagnosticIssue::NonFiniteOutput { blocks } => {
                write!(f, "{} output blocks were not finite and were silenced", blocks)
            }
        }
    }
}

/// Result of `AudioEngine::diagnostics`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineDiagnostics {
    pub lifecycle: EngineLifecycle,
    pub sample_rate: u32,
    pub issues: Vec<DiagnosticIssue>,
}

impl EngineDiagnostics {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, issue: &DiagnosticIssue) -> bool {
        self.issues.contains(issue)
    }
}

impl fmt::Display for EngineDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "engine {} at {} Hz", self.lifecycle, self.sample_rate)?;
        if self.issues.is_empty() {
            return write!(f, "  no issues");
        }
        for issue in &self.issues {
            writeln!(f, "  - {}", issue)?;
        }
        Ok(())
    }
}
