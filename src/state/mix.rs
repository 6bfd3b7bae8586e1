//! Bounced mixes

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::Session;

/// A finished stereo bounce of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mix {
    pub id: Uuid,
    pub name: String,
    pub session_id: Uuid,
    pub session_name: String,
    /// Length of the bounced file in seconds
    pub duration: f64,
    pub file: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub cover_image: Option<PathBuf>,
}

impl Mix {
    pub fn new(session: &Session, file: PathBuf, duration: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: session.name.clone(),
            session_id: session.id,
            session_name: session.name.clone(),
            duration,
            file,
            created_at: Utc::now(),
            cover_image: None,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_cover(&mut self, image: Option<PathBuf>) {
        self.cover_image = image;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_from_session() {
        let session = Session::new("Sketch");
        let mut mix = Mix::new(&session, PathBuf::from("sketch.wav"), 12.5);
        assert_eq!(mix.session_id, session.id);
        assert_eq!(mix.name, "Sketch");

        mix.rename("Sketch v2");
        mix.set_cover(Some(PathBuf::from("cover.png")));
        assert_eq!(mix.name, "Sketch v2");
        assert_eq!(mix.session_name, "Sketch");
        assert!(mix.cover_image.is_some());
    }
}
