/*
 * Manages the persisted settings of the profile store: where profile documents live,
 * how long the save debounce window is, and whether failed saves are retried. Settings
 * are kept as `settings.json` in the application's local configuration directory and
 * every field has a default, so a missing or partial file is never an error.
 *
 * It uses a trait-based approach (`ConfigManagerOperations`) to allow for different
 * storage backends or mock implementations for testing. The concrete implementation
 * (`CoreConfigManager`) resolves its directory through `path_utils` unless an explicit
 * directory is given.
 */
use super::path_utils;
use super::profile::ProfileContent;
use super::profiles::ProfileManagerBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILENAME: &str = "settings.json";
pub const DEFAULT_SAVE_DELAY_MS: u64 = 500;

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Serde(serde_json::Error),
    NoConfigDirectory,
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Serde(err)
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Configuration I/O error: {e}"),
            ConfigError::Serde(e) => write!(f, "Configuration file format error: {e}"),
            ConfigError::NoConfigDirectory => {
                write!(f, "Could not determine the configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileStoreSettings {
    /// Overrides the platform default profiles directory.
    pub profiles_directory: Option<PathBuf>,
    pub save_delay_ms: u64,
    pub retry_failed_saves: bool,
}

impl Default for ProfileStoreSettings {
    fn default() -> Self {
        ProfileStoreSettings {
            profiles_directory: None,
            save_delay_ms: DEFAULT_SAVE_DELAY_MS,
            retry_failed_saves: false,
        }
    }
}

impl ProfileStoreSettings {
    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    /*
     * The configured profiles directory, or the platform default for `app_name`.
     * The directory is created if needed; `None` means it could not be determined or
     * created.
     */
    pub fn resolve_profiles_directory(&self, app_name: &str) -> Option<PathBuf> {
        match &self.profiles_directory {
            Some(dir) => path_utils::ensure_dir(dir),
            None => path_utils::get_default_profiles_dir(app_name),
        }
    }

    pub fn configure<P: ProfileContent>(
        &self,
        builder: ProfileManagerBuilder<P>,
    ) -> ProfileManagerBuilder<P> {
        builder
            .save_delay(self.save_delay())
            .retry_failed_saves(self.retry_failed_saves)
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn load_settings(&self, app_name: &str) -> Result<ProfileStoreSettings>;
    fn save_settings(&self, app_name: &str, settings: &ProfileStoreSettings) -> Result<()>;
}

pub struct CoreConfigManager {
    config_dir_override: Option<PathBuf>,
}

impl CoreConfigManager {
    pub fn new() -> Self {
        CoreConfigManager {
            config_dir_override: None,
        }
    }

    /// Uses `config_dir` instead of the platform configuration directory.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        CoreConfigManager {
            config_dir_override: Some(config_dir.into()),
        }
    }

    fn config_dir(&self, app_name: &str) -> Result<PathBuf> {
        let dir = match &self.config_dir_override {
            Some(dir) => path_utils::ensure_dir(dir),
            None => path_utils::get_base_app_config_local_dir(app_name),
        };
        dir.ok_or(ConfigError::NoConfigDirectory)
    }

    fn settings_path(&self, app_name: &str) -> Result<PathBuf> {
        Ok(self.config_dir(app_name)?.join(SETTINGS_FILENAME))
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn is_effectively_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_to_string(path)?.trim().is_empty())
}

impl ConfigManagerOperations for CoreConfigManager {
    /*
     * Loads the store settings for `app_name`. A missing or blank settings file yields
     * the defaults; fields absent from the file take their default values.
     */
    fn load_settings(&self, app_name: &str) -> Result<ProfileStoreSettings> {
        log::trace!("CoreConfigManager: Loading settings for app '{app_name}'");
        let file_path = self.settings_path(app_name)?;

        if !file_path.exists() {
            log::debug!("CoreConfigManager: Settings file {file_path:?} does not exist; using defaults.");
            return Ok(ProfileStoreSettings::default());
        }
        if is_effectively_empty(&file_path)? {
            log::debug!("CoreConfigManager: Settings file {file_path:?} is empty; using defaults.");
            return Ok(ProfileStoreSettings::default());
        }

        let reader = BufReader::new(File::open(&file_path)?);
        let settings: ProfileStoreSettings = serde_json::from_reader(reader)?;
        log::debug!("CoreConfigManager: Loaded settings from {file_path:?}: {settings:?}");
        Ok(settings)
    }

    fn save_settings(&self, app_name: &str, settings: &ProfileStoreSettings) -> Result<()> {
        log::trace!("CoreConfigManager: Saving settings for app '{app_name}'");
        let file_path = self.settings_path(app_name)?;
        let writer = BufWriter::new(File::create(&file_path)?);
        serde_json::to_writer_pretty(writer, settings)?;
        log::debug!("CoreConfigManager: Saved settings to {file_path:?}.");
        Ok(())
    }
}
