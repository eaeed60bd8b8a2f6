/*
 * This module manages selection presets: named lists of paths stored as JSON
 * arrays under `<presets_dir>/selections/<scope>/<name>.json`. Two scopes
 * exist. `default` presets ship with the installation and are read-only to
 * clients; `user` presets can be created, loaded and deleted. Presets are
 * addressed by `scope/name`.
 *
 * Paths inside the application root are written relative to it so a preset
 * survives moving the installation; anything else is written absolute. Loading
 * resolves both forms back to absolute, lexically normalized paths.
 */
use super::path_utils::{normalize_lexically, relative_display};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const PRESET_FILE_EXTENSION: &str = "json";
const SELECTIONS_SUBFOLDER_NAME: &str = "selections";
pub const SEED_PRESET_NAME: &str = "default";

#[derive(Debug)]
pub enum PresetError {
    Io(io::Error),
    Serde(serde_json::Error),
    InvalidId(String),
    InvalidName(String),
    NotFound(String),
    ReadOnly(String),
    InvalidFormat(PathBuf),
}

impl From<io::Error> for PresetError {
    fn from(err: io::Error) -> Self {
        PresetError::Io(err)
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(err: serde_json::Error) -> Self {
        PresetError::Serde(err)
    }
}

impl std::fmt::Display for PresetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresetError::Io(e) => write!(f, "I/O error: {e}"),
            PresetError::Serde(e) => write!(f, "Serialization/Deserialization error: {e}"),
            PresetError::InvalidId(id) => {
                write!(f, "Invalid preset ID '{id}'. Expected 'default/<name>' or 'user/<name>'.")
            }
            PresetError::InvalidName(name) => write!(f, "Invalid preset name: '{name}'"),
            PresetError::NotFound(id) => write!(f, "Preset '{id}' not found"),
            PresetError::ReadOnly(id) => {
                write!(f, "Preset '{id}' is read-only. Only user presets can be deleted.")
            }
            PresetError::InvalidFormat(path) => {
                write!(f, "Invalid preset file format: {path:?}")
            }
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PresetError::Io(e) => Some(e),
            PresetError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PresetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetScope {
    Default,
    User,
}

impl PresetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetScope::Default => "default",
            PresetScope::User => "user",
        }
    }
}

impl std::fmt::Display for PresetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresetId {
    pub scope: PresetScope,
    pub name: String,
}

impl PresetId {
    pub fn new(scope: PresetScope, name: impl Into<String>) -> Self {
        PresetId {
            scope,
            name: name.into(),
        }
    }
}

impl FromStr for PresetId {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self> {
        let (scope, name) = s
            .split_once('/')
            .ok_or_else(|| PresetError::InvalidId(s.to_string()))?;
        let scope = match scope {
            "default" => PresetScope::Default,
            "user" => PresetScope::User,
            _ => return Err(PresetError::InvalidId(s.to_string())),
        };
        if name.is_empty() {
            return Err(PresetError::InvalidId(s.to_string()));
        }
        Ok(PresetId::new(scope, name))
    }
}

impl std::fmt::Display for PresetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub scope: PresetScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPreset {
    pub saved: bool,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedPreset {
    pub deleted: bool,
}

pub fn sanitize_preset_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

pub trait PresetStoreOperations: Send + Sync {
    fn list(&self) -> Result<Vec<PresetEntry>>;
    /*
     * Saves `paths` as the user preset `name`, replacing any existing one.
     */
    fn save(&self, name: &str, paths: &[PathBuf]) -> Result<SavedPreset>;
    fn load(&self, id: &str) -> Result<Vec<PathBuf>>;
    fn delete(&self, id: &str) -> Result<DeletedPreset>;
}

pub struct CorePresetStore {
    presets_dir: PathBuf,
    app_root: PathBuf,
}

impl CorePresetStore {
    /*
     * Creates a store rooted at `presets_dir`, creating the scope folders and
     * seeding an empty `default/default` preset when missing.
     */
    pub fn new(presets_dir: impl Into<PathBuf>, app_root: impl Into<PathBuf>) -> Result<Self> {
        let store = CorePresetStore {
            presets_dir: presets_dir.into(),
            app_root: normalize_lexically(&app_root.into()),
        };
        store.ensure_layout()?;
        Ok(store)
    }

    pub fn presets_dir(&self) -> &Path {
        &self.presets_dir
    }

    fn scope_dir(&self, scope: PresetScope) -> PathBuf {
        self.presets_dir
            .join(SELECTIONS_SUBFOLDER_NAME)
            .join(scope.as_str())
    }

    fn ensure_layout(&self) -> Result<()> {
        for scope in [PresetScope::Default, PresetScope::User] {
            fs::create_dir_all(self.scope_dir(scope))?;
        }
        let seed = self.preset_file(PresetScope::Default, SEED_PRESET_NAME);
        if !seed.exists() {
            self.write_paths(&seed, &[])?;
            log::info!("CorePresetStore: Created empty default selection preset {seed:?}");
        }
        Ok(())
    }

    fn preset_file(&self, scope: PresetScope, safe_name: &str) -> PathBuf {
        self.scope_dir(scope)
            .join(format!("{safe_name}.{PRESET_FILE_EXTENSION}"))
    }

    fn resolve_id(&self, id: &str) -> Result<(PresetId, PathBuf)> {
        let parsed: PresetId = id.parse()?;
        let safe_name = sanitize_preset_name(&parsed.name);
        if safe_name.is_empty() {
            return Err(PresetError::InvalidName(parsed.name));
        }
        let file = self.preset_file(parsed.scope, &safe_name);
        Ok((parsed, file))
    }

    fn to_stored_form(&self, path: &Path) -> String {
        let normalized = normalize_lexically(path);
        match relative_display(&normalized, &self.app_root) {
            Some(relative) if !relative.is_empty() => relative,
            _ => normalized.to_string_lossy().into_owned(),
        }
    }

    fn from_stored_form(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        if path.is_absolute() {
            normalize_lexically(path)
        } else {
            normalize_lexically(&self.app_root.join(path))
        }
    }

    fn write_paths(&self, file: &Path, stored: &[String]) -> Result<()> {
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(file)?);
        serde_json::to_writer_pretty(&mut writer, stored)?;
        writer.flush()?;
        Ok(())
    }

    fn list_scope(&self, scope: PresetScope) -> Result<Vec<PresetEntry>> {
        let dir = self.scope_dir(scope);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some(PRESET_FILE_EXTENSION)
            {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| PresetEntry {
                id: PresetId::new(scope, name.clone()).to_string(),
                name,
                scope,
            })
            .collect())
    }
}

impl PresetStoreOperations for CorePresetStore {
    fn list(&self) -> Result<Vec<PresetEntry>> {
        let mut entries = self.list_scope(PresetScope::Default)?;
        entries.extend(self.list_scope(PresetScope::User)?);
        log::debug!("CorePresetStore: Listed {} preset(s).", entries.len());
        Ok(entries)
    }

    fn save(&self, name: &str, paths: &[PathBuf]) -> Result<SavedPreset> {
        let safe_name = sanitize_preset_name(name);
        if safe_name.is_empty() {
            return Err(PresetError::InvalidName(name.to_string()));
        }
        let file = self.preset_file(PresetScope::User, &safe_name);
        let stored: Vec<String> = paths.iter().map(|p| self.to_stored_form(p)).collect();
        self.write_paths(&file, &stored)?;
        let id = PresetId::new(PresetScope::User, safe_name.clone());
        log::info!(
            "CorePresetStore: Saved preset '{id}' with {} path(s) to {file:?}.",
            stored.len()
        );
        Ok(SavedPreset {
            saved: true,
            id: id.to_string(),
            name: safe_name,
        })
    }

    fn load(&self, id: &str) -> Result<Vec<PathBuf>> {
        let (parsed, file) = self.resolve_id(id)?;
        if !file.exists() {
            log::debug!("CorePresetStore: Preset file {file:?} not found for '{parsed}'.");
            return Err(PresetError::NotFound(parsed.to_string()));
        }
        let reader = BufReader::new(File::open(&file)?);
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        let serde_json::Value::Array(items) = value else {
            return Err(PresetError::InvalidFormat(file));
        };
        let mut paths = Vec::with_capacity(items.len());
        for item in items {
            match item {
                serde_json::Value::String(s) => paths.push(self.from_stored_form(&s)),
                other => log::warn!(
                    "CorePresetStore: Ignoring non-string entry {other} in preset '{parsed}'."
                ),
            }
        }
        log::debug!("CorePresetStore: Loaded preset '{parsed}' ({} path(s)).", paths.len());
        Ok(paths)
    }

    fn delete(&self, id: &str) -> Result<DeletedPreset> {
        let (parsed, file) = self.resolve_id(id)?;
        if parsed.scope != PresetScope::User {
            return Err(PresetError::ReadOnly(parsed.to_string()));
        }
        if !file.exists() {
            return Err(PresetError::NotFound(parsed.to_string()));
        }
        fs::remove_file(&file)?;
        log::info!("CorePresetStore: Deleted preset '{parsed}'.");
        Ok(DeletedPreset { deleted: true })
    }
}
