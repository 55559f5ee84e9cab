//! Persistent session state: folders, master list and the staged mod list.
//!
//! Stored as JSON in the user's home directory. Files written by older
//! releases (empty folder strings, bare-url master lists) load unchanged.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{FolderSet, MasterEntry, ModReference};

pub const SETTINGS_FILE_NAME: &str = ".mod_organizer_settings.json";
pub const SETTINGS_ENV: &str = "MOD_ORGANIZER_SETTINGS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine home directory")]
    NoHome,

    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub root_folder: Option<PathBuf>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub production_folder: Option<PathBuf>,
    #[serde(default)]
    pub master_list: Vec<MasterEntry>,
    #[serde(default)]
    pub mod_list: Vec<ModReference>,
}

impl Settings {
    pub fn folders(&self) -> Option<FolderSet> {
        self.root_folder
            .as_ref()
            .map(|root| FolderSet::derive(root, self.production_folder.clone()))
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from))
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$MOD_ORGANIZER_SETTINGS`, else `~/.mod_organizer_settings.json`.
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV).filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(SETTINGS_FILE_NAME))
            .ok_or(SettingsError::NoHome)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means first run: defaults.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let raw = serde_json::to_string_pretty(settings).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, raw).map_err(io_err)?;

        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }
}
