//! Error handling for fourtrack
//!
//! Every failure surfaced by the control domain is a typed `FourTrackError`.
//! Errors are grouped into kinds so the presentation layer can pick a message
//! without matching on individual variants.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for fourtrack operations
pub type Result<T> = std::result::Result<T, FourTrackError>;

/// Broad classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Microphone access denied; recoverable by user action
    Permission,
    /// Disk full, file missing or corrupt
    Resource,
    /// Invalid transition or invalid edit; state is left unchanged
    State,
    /// Offline render failure
    Render,
    /// Engine construction or channel failures
    Internal,
}

/// Main error type for fourtrack operations
#[derive(Error, Debug)]
pub enum FourTrackError {
    // Permission Errors
    #[error("Microphone access denied")]
    PermissionDenied,

    // File Errors
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Not a RIFF wave file: {}", path.display())]
    NotRiff { path: PathBuf },

    #[error("Invalid audio file: {reason}")]
    InvalidAudio {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Disk write failed: {}: {reason}", path.display())]
    DiskWrite { path: PathBuf, reason: String },

    // State Errors
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: String,
    },

    #[error("No track is armed for recording")]
    NoTrackArmed,

    #[error("Track index {index} out of range (1-4)")]
    InvalidTrack { index: usize },

    #[error("Region overlaps an existing region on track {track} ({start:.3}s-{end:.3}s)")]
    RegionOverlap { track: usize, start: f64, end: f64 },

    #[error("Invalid region: {reason}")]
    InvalidRegion { reason: String },

    #[error("Region not found: {id}")]
    RegionNotFound { id: String },

    #[error("Invalid loop range: {start:.3}s-{end:.3}s")]
    InvalidLoop { start: f64, end: f64 },

    // Render Errors
    #[error("Bounce failed: {0}")]
    Bounce(#[from] crate::studio::BounceError),

    // Engine Errors
    #[error("Audio engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    #[error("Audio engine construction failed: {reason}")]
    EngineConstruction { reason: String },

    // Store Errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Mix not found: {id}")]
    MixNotFound { id: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FourTrackError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            FourTrackError::PermissionDenied => "PERMISSION_DENIED",
            FourTrackError::FileNotFound { .. } => "FILE_NOT_FOUND",
            FourTrackError::NotRiff { .. } => "NOT_RIFF",
            FourTrackError::InvalidAudio { .. } => "INVALID_AUDIO",
            FourTrackError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            FourTrackError::DiskWrite { .. } => "DISK_WRITE",
            FourTrackError::InvalidTransition { .. } => "INVALID_TRANSITION",
            FourTrackError::NoTrackArmed => "NO_TRACK_ARMED",
            FourTrackError::InvalidTrack { .. } => "INVALID_TRACK",
            FourTrackError::RegionOverlap { .. } => "REGION_OVERLAP",
            FourTrackError::InvalidRegion { .. } => "INVALID_REGION",
            FourTrackError::RegionNotFound { .. } => "REGION_NOT_FOUND",
            FourTrackError::InvalidLoop { .. } => "INVALID_LOOP",
            FourTrackError::Bounce(e) => e.error_code(),
            FourTrackError::EngineUnavailable { .. } => "ENGINE_UNAVAILABLE",
            FourTrackError::EngineConstruction { .. } => "ENGINE_CONSTRUCTION",
            FourTrackError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            FourTrackError::MixNotFound { .. } => "MIX_NOT_FOUND",
            FourTrackError::InvalidConfig { .. } => "INVALID_CONFIG",
            FourTrackError::Io(_) => "IO_ERROR",
            FourTrackError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            FourTrackError::PermissionDenied => ErrorKind::Permission,
            FourTrackError::FileNotFound { .. }
            | FourTrackError::NotRiff { .. }
            | FourTrackError::InvalidAudio { .. }
            | FourTrackError::UnsupportedFormat { .. }
            | FourTrackError::DiskWrite { .. }
            | FourTrackError::SessionNotFound { .. }
            | FourTrackError::MixNotFound { .. }
            | FourTrackError::Io(_)
            | FourTrackError::Serialization(_) => ErrorKind::Resource,
            FourTrackError::InvalidTransition { .. }
            | FourTrackError::NoTrackArmed
            | FourTrackError::InvalidTrack { .. }
            | FourTrackError::RegionOverlap { .. }
            | FourTrackError::InvalidRegion { .. }
            | FourTrackError::RegionNotFound { .. }
            | FourTrackError::InvalidLoop { .. } => ErrorKind::State,
            FourTrackError::Bounce(_) => ErrorKind::Render,
            FourTrackError::EngineUnavailable { .. }
            | FourTrackError::EngineConstruction { .. }
            | FourTrackError::InvalidConfig { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable without restarting the engine
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            FourTrackError::EngineConstruction { .. } | FourTrackError::InvalidConfig { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            FourTrackError::PermissionDenied => vec![
                "Allow microphone access in the system privacy settings",
                "Recording stays unavailable until access is granted",
            ],
            FourTrackError::FileNotFound { .. } | FourTrackError::NotRiff { .. } => vec![
                "The audio file may have been moved or deleted",
                "Re-record the region or remove it from the track",
            ],
            FourTrackError::DiskWrite { .. } => vec![
                "Free up disk space",
                "Change the recordings directory to a drive with more space",
            ],
            FourTrackError::RegionOverlap { .. } => vec![
                "Move the playhead to an empty part of the track",
                "Arm a different track",
            ],
            FourTrackError::InvalidTransition { .. } => vec!["Stop the transport first"],
            FourTrackError::EngineConstruction { .. } => vec![
                "Check that an audio output device is connected",
                "Close other applications using the audio device",
            ],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = FourTrackError::FileNotFound {
            path: PathBuf::from("take.wav"),
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_state_errors_are_recoverable() {
        let err = FourTrackError::InvalidTransition {
            operation: "seek",
            state: "Playing".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::State);
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
        assert_eq!(err.to_string(), "Cannot seek while Playing");
    }

    #[test]
    fn test_permission_kind() {
        assert_eq!(FourTrackError::PermissionDenied.kind(), ErrorKind::Permission);
    }

    #[test]
    fn test_bounce_errors_are_render_kind() {
        let err: FourTrackError = crate::studio::BounceError::SessionEmpty.into();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(err.error_code(), "SESSION_EMPTY");
    }
}
