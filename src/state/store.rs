//! Session and mix persistence
//!
//! Records are pretty-printed JSON files under a store root:
//!
//! ```text
//! <root>/
//!   sessions/<session-id>.json
//!   mixes/<mix-id>.json
//! ```
//!
//! Writes go to a `.tmp` sibling first and are renamed into place so a crash
//! mid-save never leaves a truncated record.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use super::mix::Mix;
use super::session::Session;
use crate::error::{FourTrackError, Result};

pub const SESSIONS_DIR: &str = "sessions";
pub const MIXES_DIR: &str = "mixes";

/// Persistence for sessions and mixes
pub trait SessionStore {
    fn save_session(&self, session: &Session) -> Result<()>;
    fn load_session(&self, id: Uuid) -> Result<Session>;
    fn list_sessions(&self) -> Result<Vec<Session>>;
    fn delete_session(&self, id: Uuid) -> Result<()>;

    fn save_mix(&self, mix: &Mix) -> Result<()>;
    fn load_mix(&self, id: Uuid) -> Result<Mix>;
    fn list_mixes(&self) -> Result<Vec<Mix>>;
    /// Remove a mix record, and its audio file when `remove_audio` is set
    fn delete_mix(&self, id: Uuid, remove_audio: bool) -> Result<()>;
}

/// JSON-file store rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [SESSIONS_DIR, MIXES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(|e| FourTrackError::DiskWrite {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.root.join(SESSIONS_DIR).join(format!("{}.json", id))
    }

    fn mix_path(&self, id: Uuid) -> PathBuf {
        self.root.join(MIXES_DIR).join(format!("{}.json", id))
    }

    fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| FourTrackError::DiskWrite {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp, path).map_err(|e| FourTrackError::DiskWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every `*.json` record in a store subdirectory; unreadable files are skipped
    fn list_records<T: DeserializeOwned>(&self, dir: &str) -> Vec<T> {
        WalkDir::new(self.root.join(dir))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "json"))
            .filter_map(|entry| match Self::read_record(entry.path()) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable record");
                    None
                }
            })
            .collect()
    }
}

impl SessionStore for JsonFileStore {
    #[instrument(skip(self, session), fields(session = %session.id))]
    fn save_session(&self, session: &Session) -> Result<()> {
        Self::write_record(&self.session_path(session.id), session)?;
        debug!("Session saved");
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_session(&self, id: Uuid) -> Result<Session> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(FourTrackError::SessionNotFound { id: id.to_string() });
        }
        let session: Session = Self::read_record(&path)?;
        session.validate()?;
        Ok(session)
    }

    fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self.list_records(SESSIONS_DIR);
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn delete_session(&self, id: Uuid) -> Result<()> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(FourTrackError::SessionNotFound { id: id.to_string() });
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn save_mix(&self, mix: &Mix) -> Result<()> {
        Self::write_record(&self.mix_path(mix.id), mix)
    }

    fn load_mix(&self, id: Uuid) -> Result<Mix> {
        let path = self.mix_path(id);
        if !path.exists() {
            return Err(FourTrackError::MixNotFound { id: id.to_string() });
        }
        Self::read_record(&path)
    }

    fn list_mixes(&self) -> Result<Vec<Mix>> {
        let mut mixes: Vec<Mix> = self.list_records(MIXES_DIR);
        mixes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(mixes)
    }

    fn delete_mix(&self, id: Uuid, remove_audio: bool) -> Result<()> {
        let mix = self.load_mix(id)?;
        fs::remove_file(self.mix_path(id))?;
        if remove_audio && mix.file.exists() {
            fs::remove_file(&mix.file)?;
        }
        Ok(())
    }
}
