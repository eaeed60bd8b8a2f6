/*
 * The local flatten service. It takes the explicit selection sent by the
 * engine, re-applies the host exclusion rules, expands selected directories
 * into their files, and renders one text artifact: an ASCII structure header
 * followed by the contents of every surviving file. Tokens are counted over the
 * whole artifact and reported per model as a share of its context window.
 */
use super::exclusion::{CompiledExclusionRules, ExclusionRules};
use super::flatten_contract::{
    FlattenRequest, FlattenResponse, ModelPercentage, TOKENIZATION_FAILED,
};
use super::path_utils::{common_ancestor, relative_display};
use super::tokenizer_utils::TokenCounterOperations;
use super::tree_node::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub const NOTHING_SELECTED_TEXT: &str = "No files selected or all selected items are excluded.";
const NO_FILES_ACCESSIBLE_TEXT: &str = "No files selected/accessible (after exclusion).\n";

#[derive(Debug)]
pub enum FlattenError {
    Io(io::Error),
    Walk(walkdir::Error),
}

impl From<io::Error> for FlattenError {
    fn from(err: io::Error) -> Self {
        FlattenError::Io(err)
    }
}

impl From<walkdir::Error> for FlattenError {
    fn from(err: walkdir::Error) -> Self {
        FlattenError::Walk(err)
    }
}

impl std::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlattenError::Io(e) => write!(f, "I/O error: {e}"),
            FlattenError::Walk(e) => write!(f, "Directory walk error: {e}"),
        }
    }
}

impl std::error::Error for FlattenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlattenError::Io(e) => Some(e),
            FlattenError::Walk(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlattenError>;

/*
 * A model and the size of its context window in tokens.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelContextInfo {
    pub name: String,
    pub window: u64,
}

impl ModelContextInfo {
    pub fn new(name: impl Into<String>, window: u64) -> Self {
        ModelContextInfo {
            name: name.into(),
            window,
        }
    }
}

pub fn default_models() -> Vec<ModelContextInfo> {
    vec![
        ModelContextInfo::new("4o", 128_000),
        ModelContextInfo::new("o3", 200_000),
        ModelContextInfo::new("GmP", 1_000_000),
        ModelContextInfo::new("Grk3", 1_000_000),
    ]
}

pub trait FlattenOperations: Send + Sync {
    fn flatten(&self, request: &FlattenRequest) -> Result<FlattenResponse>;
}

pub struct CoreFlattener {
    rules: CompiledExclusionRules,
    models: Vec<ModelContextInfo>,
    token_counter: Arc<dyn TokenCounterOperations>,
}

impl CoreFlattener {
    pub fn new(
        rules: &ExclusionRules,
        models: Vec<ModelContextInfo>,
        token_counter: Arc<dyn TokenCounterOperations>,
    ) -> Self {
        CoreFlattener {
            rules: rules.compile(),
            models,
            token_counter,
        }
    }

    /*
     * Drops requested paths that no longer exist or that the host rules
     * exclude. Directory-name rules are applied to every component below the
     * parent of the selection's common ancestor, so a project that happens to
     * live inside e.g. a `build` directory is not excluded wholesale.
     */
    fn filter_requested(&self, paths: &[PathBuf]) -> Vec<(PathBuf, NodeKind)> {
        let scope = common_ancestor(paths)
            .and_then(|ancestor| ancestor.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let mut kept = Vec::new();
        for path in paths {
            let kind = match fs::metadata(path) {
                Ok(meta) if meta.is_dir() => NodeKind::Directory,
                Ok(_) => NodeKind::File,
                Err(e) => {
                    log::warn!("CoreFlattener: Skipping inaccessible path {path:?}: {e}");
                    continue;
                }
            };
            let relative = path.strip_prefix(&scope).unwrap_or(path);
            if self.rules.has_excluded_dir_component(relative) {
                log::debug!("CoreFlattener: Excluded by directory rule: {path:?}");
                continue;
            }
            if let Some(info) = self.rules.check_item(path, kind) {
                log::debug!("CoreFlattener: Excluded {path:?} ({info})");
                continue;
            }
            kept.push((path.clone(), kind));
        }
        kept
    }

    /*
     * All non-excluded files beneath `dir`, pruning excluded subtrees. Only a
     * failure to open `dir` itself is an error; deeper failures are logged.
     */
    fn expand_directory(&self, dir: &Path, files: &mut BTreeSet<PathBuf>) -> Result<()> {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 {
                    return true;
                }
                let kind = if entry.file_type().is_dir() {
                    NodeKind::Directory
                } else {
                    NodeKind::File
                };
                self.rules.check_item(entry.path(), kind).is_none()
            });
        for entry_result in walker {
            match entry_result {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        files.insert(entry.into_path());
                    }
                }
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => log::warn!("CoreFlattener: Skipping unreadable entry under {dir:?}: {e}"),
            }
        }
        Ok(())
    }

    fn model_percentages(&self, token_count: usize) -> Vec<ModelPercentage> {
        if token_count == 0 {
            return Vec::new();
        }
        self.models
            .iter()
            .filter(|m| m.window > 0)
            .map(|m| {
                let raw = token_count as f64 / m.window as f64 * 100.0;
                let mut percentage = (raw * 100.0).round() / 100.0;
                if percentage < 0.01 {
                    percentage = 0.01;
                }
                ModelPercentage {
                    name: m.name.clone(),
                    percentage: serde_json::json!(percentage),
                }
            })
            .collect()
    }

    fn finish(&self, text: String) -> FlattenResponse {
        let (token_count, model_percentages) = match self.token_counter.count_tokens(&text) {
            Ok(count) => (count as i64, self.model_percentages(count)),
            Err(e) => {
                log::error!("CoreFlattener: Tokenization failed: {e}");
                (TOKENIZATION_FAILED, Vec::new())
            }
        };
        FlattenResponse {
            text: Some(text),
            token_count,
            model_percentages,
            error: None,
        }
    }
}

impl FlattenOperations for CoreFlattener {
    fn flatten(&self, request: &FlattenRequest) -> Result<FlattenResponse> {
        log::debug!("CoreFlattener: Flattening {} requested path(s).", request.paths.len());
        let kept = self.filter_requested(&request.paths);
        if kept.is_empty() {
            return Ok(self.finish(NOTHING_SELECTED_TEXT.to_string()));
        }

        let mut files = BTreeSet::new();
        let mut structure: BTreeSet<PathBuf> = BTreeSet::new();
        for (path, kind) in &kept {
            structure.insert(path.clone());
            match kind {
                NodeKind::File => {
                    files.insert(path.clone());
                }
                NodeKind::Directory => self.expand_directory(path, &mut files)?,
            }
        }
        structure.extend(files.iter().cloned());

        let structure_paths: Vec<PathBuf> = structure.into_iter().collect();
        let base = display_base(&structure_paths);
        let mut text = render_structure(&structure_paths, &base);

        text.push_str("Content of selected files:\n");
        if files.is_empty() {
            text.push_str(NO_FILES_ACCESSIBLE_TEXT);
        }
        for file in &files {
            let display = relative_display(file, &base)
                .unwrap_or_else(|| fallback_display(file));
            match fs::read(file) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(content) => text.push_str(&format!("# File: {display}\n{content}\n\n")),
                    Err(_) => text.push_str(&format!("# File: {display}\n[binary file skipped]\n\n")),
                },
                Err(e) => {
                    log::warn!("CoreFlattener: Could not read {file:?}: {e}");
                    text.push_str(&format!("# File: {display}\n[Error reading file: {e}]\n\n"));
                }
            }
        }
        log::debug!("CoreFlattener: Flattened {} file(s) into {} bytes.", files.len(), text.len());
        Ok(self.finish(text))
    }
}

/*
 * Directory the structure header is rooted at: the common ancestor of every
 * listed path, or its parent when that ancestor is itself a file.
 */
fn display_base(paths: &[PathBuf]) -> PathBuf {
    match common_ancestor(paths) {
        Some(ancestor) if ancestor.is_dir() => ancestor,
        Some(ancestor) => ancestor
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(ancestor),
        None => PathBuf::new(),
    }
}

fn fallback_display(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.parent().and_then(|p| p.file_name()) {
        Some(parent) => format!(".../{}/{}", parent.to_string_lossy(), name),
        None => name,
    }
}

#[derive(Default)]
struct StructureNode {
    children: BTreeMap<String, StructureNode>,
}

fn render_structure(paths: &[PathBuf], base: &Path) -> String {
    let mut root = StructureNode::default();
    for path in paths {
        let parts: Vec<String> = match path.strip_prefix(base) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
            Err(_) => vec![fallback_display(path)],
        };
        let mut cursor = &mut root;
        for part in parts {
            cursor = cursor.children.entry(part).or_default();
        }
    }

    let root_name = match base.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None if base.as_os_str().is_empty() => "Selected Items".to_string(),
        None => base.to_string_lossy().into_owned(),
    };

    let mut lines = Vec::new();
    ascii_tree(&root, "", &mut lines);
    format!(
        "Structure of selected items:\n{root_name}/\n{}\n\n",
        lines.join("\n")
    )
}

fn ascii_tree(node: &StructureNode, prefix: &str, lines: &mut Vec<String>) {
    let count = node.children.len();
    for (i, (name, child)) in node.children.iter().enumerate() {
        let is_last = i + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        lines.push(format!("{prefix}{connector}{name}"));
        if !child.children.is_empty() {
            let extension = if is_last { "    " } else { "│   " };
            ascii_tree(child, &format!("{prefix}{extension}"), lines);
        }
    }
}
