/*
 * Exclusion handling in two halves. `ExclusionResolver` answers questions about
 * nodes already in a `TreeNodeStore`, using only the descriptors the listing
 * service attached to them. `ExclusionRules` is the host-side rule set the local
 * listing and flatten services use to produce those descriptors in the first
 * place; the engine itself never evaluates rules.
 */
use super::tree_node::{ExclusionInfo, NodeKind};
use super::tree_store::TreeNodeStore;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const RULE_TYPE_DIRECTORY_NAME: &str = "Directory Name";
pub const RULE_TYPE_DIRECTORY_PATTERN: &str = "Directory Pattern";
pub const RULE_TYPE_FILE_NAME: &str = "File Name";
pub const RULE_TYPE_FILE_PATTERN: &str = "File Pattern";

/*
 * Read-only view over a store that resolves exclusion locks.
 *
 * A node is *excluded* when it carries a descriptor itself. It is *locked* when
 * it or any ancestor is excluded: descendants of an excluded directory cannot be
 * selected even though the server did not mark them.
 */
pub struct ExclusionResolver<'a> {
    store: &'a TreeNodeStore,
}

impl<'a> ExclusionResolver<'a> {
    pub fn new(store: &'a TreeNodeStore) -> Self {
        ExclusionResolver { store }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.store.get_node(path).is_some_and(|n| n.is_excluded())
    }

    pub fn lock_reason(&self, path: &Path) -> Option<&'a ExclusionInfo> {
        self.store.get_node(path).and_then(|n| n.exclusion.as_ref())
    }

    /*
     * Returns the nearest node at or above `path` that carries an exclusion
     * descriptor.
     */
    pub fn blocking_node(&self, path: &Path) -> Option<&'a Path> {
        let node = self.store.get_node(path)?;
        if node.is_excluded() {
            return Some(node.path.as_path());
        }
        let mut current = self.store.parent_of(path);
        while let Some(parent) = current {
            let parent_node = self.store.get_node(parent)?;
            if parent_node.is_excluded() {
                return Some(parent_node.path.as_path());
            }
            current = self.store.parent_of(parent);
        }
        None
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.blocking_node(path).is_some()
    }

    /*
     * Reason shown for a locked node: its own descriptor, or the one of the
     * excluded ancestor that blocks it.
     */
    pub fn effective_lock_reason(&self, path: &Path) -> Option<&'a ExclusionInfo> {
        self.blocking_node(path)
            .and_then(|blocker| self.lock_reason(blocker))
    }

    pub fn is_checkbox_enabled(&self, path: &Path) -> bool {
        self.store.contains(path) && !self.is_locked(path)
    }
}

/*
 * Host exclusion rules: exact directory names, exact file names, and glob
 * patterns matched against the entry name (or the whole path when the pattern
 * contains a separator).
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionRules {
    pub description: String,
    pub dirs: Vec<String>,
    pub files: Vec<String>,
    pub patterns: Vec<String>,
}

impl Default for ExclusionRules {
    fn default() -> Self {
        ExclusionRules {
            description: "Hardcoded system default exclusions.".to_string(),
            dirs: [
                ".git",
                ".venv",
                "venv",
                ".env",
                "env",
                "node_modules",
                ".next",
                "__pycache__",
                ".pytest_cache",
                ".mypy_cache",
                "build",
                "dist",
                "target",
                "out",
                "site",
                ".vscode",
                ".idea",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            files: [".DS_Store", "Thumbs.db", ".env"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            patterns: [
                "*.pyc", "*.pyo", "*.swp", "*.swo", "*.swn", "*.log", "*.tmp", "*.temp",
                "*ignore", "*.lock",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ExclusionRules {
    pub fn empty() -> Self {
        ExclusionRules {
            description: String::new(),
            dirs: Vec::new(),
            files: Vec::new(),
            patterns: Vec::new(),
        }
    }

    /*
     * Compiles the glob patterns once. Invalid patterns are logged and skipped
     * instead of failing the whole rule set.
     */
    pub fn compile(&self) -> CompiledExclusionRules {
        let mut patterns = Vec::with_capacity(self.patterns.len());
        for raw in &self.patterns {
            match Pattern::new(raw) {
                Ok(p) => patterns.push((raw.clone(), p)),
                Err(e) => log::warn!("ExclusionRules: Invalid pattern '{raw}': {e}"),
            }
        }
        CompiledExclusionRules {
            dirs: self.dirs.clone(),
            files: self.files.clone(),
            patterns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledExclusionRules {
    dirs: Vec<String>,
    files: Vec<String>,
    patterns: Vec<(String, Pattern)>,
}

impl CompiledExclusionRules {
    /*
     * Returns the descriptor for the first rule that excludes the entry, or
     * `None`. Name rules are checked before patterns.
     */
    pub fn check_item(&self, path: &Path, kind: NodeKind) -> Option<ExclusionInfo> {
        let name = path.file_name()?.to_string_lossy();
        match kind {
            NodeKind::Directory => {
                if self.dirs.iter().any(|d| *d == name) {
                    return Some(ExclusionInfo::new(RULE_TYPE_DIRECTORY_NAME, name));
                }
                self.first_matching_pattern(path, &name)
                    .map(|p| ExclusionInfo::new(RULE_TYPE_DIRECTORY_PATTERN, p))
            }
            NodeKind::File => {
                if self.files.iter().any(|f| *f == name) {
                    return Some(ExclusionInfo::new(RULE_TYPE_FILE_NAME, name));
                }
                self.first_matching_pattern(path, &name)
                    .map(|p| ExclusionInfo::new(RULE_TYPE_FILE_PATTERN, p))
            }
        }
    }

    /*
     * True when any component of `path` (the path itself included) is an
     * excluded directory name. A selected file whose parent directory is
     * excluded must not be flattened even if it was requested explicitly.
     */
    pub fn has_excluded_dir_component(&self, path: &Path) -> bool {
        path.ancestors().any(|p| {
            p.file_name()
                .is_some_and(|n| self.dirs.iter().any(|d| *d == n.to_string_lossy()))
        })
    }

    fn first_matching_pattern(&self, path: &Path, name: &str) -> Option<String> {
        self.patterns.iter().find_map(|(raw, pattern)| {
            let hit = if raw.contains('/') {
                pattern.matches_path(path)
            } else {
                pattern.matches(name)
            };
            hit.then(|| raw.clone())
        })
    }
}
