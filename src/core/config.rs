/*
 * Manages application configuration: `settings.json` (presets location,
 * application root, host exclusion rules, model context windows and tokenizer)
 * and `last_root_path.txt`, the root the previous command worked on. Both live
 * in the per-user local config directory returned by
 * `path_utils::get_base_app_config_local_dir`, unless the manager was created
 * with an explicit directory.
 *
 * Callers go through `ConfigManagerOperations` so the storage can be replaced
 * in tests.
 */
use crate::core::exclusion::ExclusionRules;
use crate::core::flattener::{ModelContextInfo, default_models};
use crate::core::path_utils;
use crate::core::tokenizer_utils::TokenizerKind;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "TreePacker";
const SETTINGS_FILENAME: &str = "settings.json";
const LAST_ROOT_PATH_FILENAME: &str = "last_root_path.txt";
const PRESETS_SUBFOLDER_NAME: &str = "presets";

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
            ConfigError::Serde(e) => write!(f, "Configuration format error: {e}"),
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
            ConfigError::NoConfigDirectory => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/*
 * Contents of `settings.json`. Every field is optional on disk; missing fields
 * take their defaults, so an empty object is a valid settings file.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub presets_dir: Option<PathBuf>,
    pub app_root: Option<PathBuf>,
    pub exclusion_rules: ExclusionRules,
    pub models: Vec<ModelContextInfo>,
    pub tokenizer: TokenizerKind,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            presets_dir: None,
            app_root: None,
            exclusion_rules: ExclusionRules::default(),
            models: default_models(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

impl AppSettings {
    pub fn resolved_presets_dir(&self, config_dir: &Path) -> PathBuf {
        self.presets_dir
            .clone()
            .unwrap_or_else(|| config_dir.join(PRESETS_SUBFOLDER_NAME))
    }

    /*
     * Base for relative paths inside presets. Defaults to the config directory.
     */
    pub fn resolved_app_root(&self, config_dir: &Path) -> PathBuf {
        self.app_root
            .clone()
            .unwrap_or_else(|| config_dir.to_path_buf())
    }
}

pub trait ConfigManagerOperations: Send + Sync {
    fn config_dir(&self, app_name: &str) -> Result<PathBuf>;
    fn load_settings(&self, app_name: &str) -> Result<AppSettings>;
    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()>;
    fn load_last_root_path(&self, app_name: &str) -> Result<Option<PathBuf>>;
    fn save_last_root_path(&self, app_name: &str, root_path: Option<&Path>) -> Result<()>;
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

    /*
     * A manager that reads and writes inside `dir` instead of the platform
     * config directory.
     */
    pub fn with_config_dir(dir: impl Into<PathBuf>) -> Self {
        CoreConfigManager {
            config_dir_override: Some(dir.into()),
        }
    }
}

impl Default for CoreConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManagerOperations for CoreConfigManager {
    fn config_dir(&self, app_name: &str) -> Result<PathBuf> {
        match &self.config_dir_override {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(dir.clone())
            }
            None => path_utils::get_base_app_config_local_dir(app_name)
                .ok_or(ConfigError::NoConfigDirectory),
        }
    }

    fn load_settings(&self, app_name: &str) -> Result<AppSettings> {
        let file_path = self.config_dir(app_name)?.join(SETTINGS_FILENAME);
        if !file_path.exists() {
            log::debug!("CoreConfigManager: No settings file at {file_path:?}; using defaults.");
            return Ok(AppSettings::default());
        }
        let reader = BufReader::new(File::open(&file_path)?);
        let settings: AppSettings = serde_json::from_reader(reader)?;
        log::debug!("CoreConfigManager: Loaded settings from {file_path:?}.");
        Ok(settings)
    }

    fn save_settings(&self, app_name: &str, settings: &AppSettings) -> Result<()> {
        let file_path = self.config_dir(app_name)?.join(SETTINGS_FILENAME);
        let mut writer = BufWriter::new(File::create(&file_path)?);
        serde_json::to_writer_pretty(&mut writer, settings)?;
        writer.flush()?;
        log::debug!("CoreConfigManager: Saved settings to {file_path:?}.");
        Ok(())
    }

    fn load_last_root_path(&self, app_name: &str) -> Result<Option<PathBuf>> {
        let file_path = self.config_dir(app_name)?.join(LAST_ROOT_PATH_FILENAME);
        if !file_path.exists() {
            log::debug!("CoreConfigManager: Last root file {file_path:?} does not exist.");
            return Ok(None);
        }
        let contents = fs::read_to_string(&file_path)?;
        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        log::debug!("CoreConfigManager: Loaded last root path '{trimmed}'.");
        Ok(Some(PathBuf::from(trimmed)))
    }

    /*
     * Passing `None` clears the stored value.
     */
    fn save_last_root_path(&self, app_name: &str, root_path: Option<&Path>) -> Result<()> {
        let file_path = self.config_dir(app_name)?.join(LAST_ROOT_PATH_FILENAME);
        let mut file = File::create(&file_path)?;
        if let Some(path) = root_path {
            file.write_all(path.to_string_lossy().as_bytes())?;
        }
        log::debug!("CoreConfigManager: Saved last root path {root_path:?} to {file_path:?}.");
        Ok(())
    }
}
