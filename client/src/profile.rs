//! Local participant profile
//!
//! Remembers the last display name, avatar and language between runs. A
//! missing or unreadable file is never an error: the client falls back to
//! defaults and overwrites the file on the next successful join.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use shared::{clamp_avatar, clamp_name, Language, DEFAULT_AVATAR};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const PROFILE_FILE: &str = ".quiz-party-profile.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub avatar: String,
    pub language: Language,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: String::new(),
            avatar: DEFAULT_AVATAR.to_string(),
            language: Language::default(),
        }
    }
}

impl Profile {
    /// Applies the same bounds the host enforces
    fn normalized(self) -> Self {
        Self {
            name: clamp_name(&self.name),
            avatar: clamp_avatar(&self.avatar),
            language: self.language,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.quiz-party-profile.json`, or the temp dir without a home
    pub fn default_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
            .join(PROFILE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Profile {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No profile at {}", self.path.display());
                return Profile::default();
            }
            Err(e) => {
                warn!("Cannot read profile {}: {}", self.path.display(), e);
                return Profile::default();
            }
        };

        match serde_json::from_str::<Profile>(&contents) {
            Ok(profile) => profile.normalized(),
            Err(e) => {
                warn!("Ignoring corrupt profile {}: {}", self.path.display(), e);
                Profile::default()
            }
        }
    }

    pub fn save(&self, profile: &Profile) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(profile).map_err(io::Error::other)?;
        fs::write(&self.path, json)
    }
}
