/*
 * Path helpers shared by the local services: locating the per-user config
 * directory, lexical normalization, common ancestors and slash-separated
 * relative display strings.
 */
use directories::ProjectDirs;
use std::fs;
use std::path::{Component, Path, PathBuf};

/*
 * Retrieves (and creates if needed) the platform-specific local config
 * directory for `app_name`. Returns `None` if it cannot be determined or
 * created.
 */
pub fn get_base_app_config_local_dir(app_name: &str) -> Option<PathBuf> {
    log::trace!("PathUtils: Resolving base app config local dir for '{app_name}'");
    ProjectDirs::from("", "", app_name).and_then(|proj_dirs| {
        let config_path = proj_dirs.config_local_dir();
        if !config_path.exists() {
            if let Err(e) = fs::create_dir_all(config_path) {
                log::error!(
                    "PathUtils: Failed to create base app config directory {config_path:?}: {e}"
                );
                return None;
            }
            log::debug!("PathUtils: Created base app config directory: {config_path:?}");
        }
        Some(config_path.to_path_buf())
    })
}

/*
 * Resolves `.` and `..` components without touching the filesystem. A `..`
 * that would climb above an absolute root is dropped; leading `..` runs of a
 * relative path are kept.
 */
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let at_relative_top = matches!(
                    out.components().next_back(),
                    None | Some(Component::ParentDir)
                );
                if path.is_absolute() || !at_relative_top {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/*
 * Deepest path that is an ancestor of (or equal to) every input.
 */
pub fn common_ancestor<P: AsRef<Path>>(paths: &[P]) -> Option<PathBuf> {
    let mut iter = paths.iter();
    let mut common: Vec<Component> = iter.next()?.as_ref().components().collect();
    for path in iter {
        let shared = common
            .iter()
            .zip(path.as_ref().components())
            .take_while(|(a, b)| **a == *b)
            .count();
        common.truncate(shared);
    }
    if common.is_empty() {
        return None;
    }
    Some(common.iter().map(|c| c.as_os_str()).collect())
}

/*
 * `path` relative to `base`, joined with `/` regardless of platform. `None`
 * when `path` is not beneath `base`.
 */
pub fn relative_display(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
    )
}
