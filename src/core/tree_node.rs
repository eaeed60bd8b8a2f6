use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/*
 * Represents the checkbox state of a file or folder in the selection tree.
 * Leaves and directories without loaded children carry an explicit state; a
 * loaded directory with children derives its state from them, which is the only
 * way `Indeterminate` can arise.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionState {
    #[default]
    Unchecked,
    Checked,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/*
 * Tracks whether the children of a node have been fetched from the listing
 * service. `Loading` doubles as the guard that coalesces duplicate fetches.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

/*
 * Server-supplied reason for locking a node out of selection.
 * The serialized field names follow the listing wire format
 * (`{"type": "Directory Name", "rule": "node_modules"}`).
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionInfo {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub rule: String,
}

impl ExclusionInfo {
    pub fn new(rule_type: impl Into<String>, rule: impl Into<String>) -> Self {
        ExclusionInfo {
            rule_type: rule_type.into(),
            rule: rule.into(),
        }
    }
}

impl std::fmt::Display for ExclusionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.rule_type, self.rule)
    }
}

/*
 * A node of the materialized tree, owned by `TreeNodeStore`.
 * Children are referenced by path only and the parent is never stored here;
 * the store answers parent queries from its own map so nodes stay free of
 * back-references.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub children: Vec<PathBuf>,
    pub load_state: LoadState,
    pub state: SelectionState,
    pub exclusion: Option<ExclusionInfo>,
}

impl TreeNode {
    /*
     * Creates an unloaded, unchecked node. Files are marked `Loaded` right away
     * since there is nothing to fetch beneath them.
     */
    pub fn new(
        path: PathBuf,
        name: String,
        kind: NodeKind,
        exclusion: Option<ExclusionInfo>,
    ) -> Self {
        let load_state = match kind {
            NodeKind::File => LoadState::Loaded,
            NodeKind::Directory => LoadState::Unloaded,
        };
        TreeNode {
            path,
            name,
            kind,
            children: Vec::new(),
            load_state,
            state: SelectionState::default(),
            exclusion,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn is_checked(&self) -> bool {
        self.state == SelectionState::Checked
    }

    pub fn is_excluded(&self) -> bool {
        self.exclusion.is_some()
    }

    /*
     * A node derives its state from children only once they are loaded and
     * there is at least one of them.
     */
    pub fn has_derived_state(&self) -> bool {
        self.is_dir() && self.load_state == LoadState::Loaded && !self.children.is_empty()
    }
}

/*
 * Describes a node as delivered by the listing service, before it enters the
 * store. `children` is `None` when the listing did not include them (lazy),
 * and `Some` when they were delivered inline.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    pub exclusion: Option<ExclusionInfo>,
    pub children: Option<Vec<NodeDescriptor>>,
}

impl NodeDescriptor {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::leaf(path.into(), NodeKind::File)
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::leaf(path.into(), NodeKind::Directory)
    }

    fn leaf(path: PathBuf, kind: NodeKind) -> Self {
        let name = display_name_for(&path);
        NodeDescriptor {
            path,
            name,
            kind,
            exclusion: None,
            children: None,
        }
    }

    pub fn excluded(mut self, exclusion: ExclusionInfo) -> Self {
        self.exclusion = Some(exclusion);
        self
    }

    pub fn with_children(mut self, children: Vec<NodeDescriptor>) -> Self {
        self.children = Some(children);
        self
    }
}

pub fn display_name_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_node_new_defaults() {
        let dir = TreeNode::new(
            PathBuf::from("/proj/src"),
            "src".into(),
            NodeKind::Directory,
            None,
        );
        assert_eq!(dir.state, SelectionState::Unchecked);
        assert_eq!(dir.load_state, LoadState::Unloaded);
        assert!(dir.children.is_empty());
        assert!(!dir.has_derived_state());

        let file = TreeNode::new(
            PathBuf::from("/proj/a.txt"),
            "a.txt".into(),
            NodeKind::File,
            None,
        );
        assert_eq!(file.load_state, LoadState::Loaded);
        assert!(!file.has_derived_state());
    }

    #[test]
    fn test_exclusion_info_wire_names() {
        let info = ExclusionInfo::new("Directory Name", "node_modules");
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"type":"Directory Name","rule":"node_modules"}"#);
        assert_eq!(info.to_string(), "Directory Name: node_modules");
    }

    #[test]
    fn test_descriptor_name_from_path() {
        let d = NodeDescriptor::file("/proj/b/c.txt");
        assert_eq!(d.name, "c.txt");
        let root = NodeDescriptor::directory("/");
        assert_eq!(root.name, "/");
    }
}
