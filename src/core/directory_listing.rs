use super::exclusion::{CompiledExclusionRules, ExclusionRules};
use super::tree_node::{ExclusionInfo, NodeDescriptor, NodeKind, display_name_for};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

/*
 * This module defines the directory listing contract and a local implementation.
 * A listing returns one node and its immediate children in the jstree-style wire
 * shape (`id`, `text`, `type`, `children`, `data.excluded_info`). Directory
 * children usually carry `children: true` meaning "has children, not loaded";
 * the engine fetches them lazily when the directory is expanded.
 */

#[derive(Debug)]
pub enum ListingError {
    Io(io::Error),
    Walk(ignore::Error),
    NotFound(PathBuf),
    NotADirectory(PathBuf),
    Malformed(String),
}

impl From<io::Error> for ListingError {
    fn from(err: io::Error) -> Self {
        ListingError::Io(err)
    }
}

impl From<ignore::Error> for ListingError {
    fn from(err: ignore::Error) -> Self {
        ListingError::Walk(err)
    }
}

impl std::fmt::Display for ListingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingError::Io(e) => write!(f, "I/O error: {e}"),
            ListingError::Walk(e) => write!(f, "Directory walk error: {e}"),
            ListingError::NotFound(p) => write!(f, "Path not found: {p:?}"),
            ListingError::NotADirectory(p) => write!(f, "Not a directory: {p:?}"),
            ListingError::Malformed(msg) => write!(f, "Malformed listing: {msg}"),
        }
    }
}

impl std::error::Error for ListingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListingError::Io(e) => Some(e),
            ListingError::Walk(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ListingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListedNodeType {
    File,
    #[serde(rename = "directory", alias = "folder")]
    Folder,
    Error,
}

/*
 * `true` / `false` announce whether unloaded children exist; an array delivers
 * them inline.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListedChildren {
    Flag(bool),
    Nodes(Vec<ListedNode>),
}

impl Default for ListedChildren {
    fn default() -> Self {
        ListedChildren::Flag(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ListedNodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_info: Option<ExclusionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedNode {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub node_type: ListedNodeType,
    #[serde(default)]
    pub children: ListedChildren,
    #[serde(default)]
    pub data: ListedNodeData,
}

impl ListedNode {
    fn entry(path: &Path, kind: NodeKind, exclusion: Option<ExclusionInfo>) -> Self {
        let (node_type, children) = match kind {
            NodeKind::File => (ListedNodeType::File, ListedChildren::Flag(false)),
            NodeKind::Directory => (ListedNodeType::Folder, ListedChildren::Flag(true)),
        };
        ListedNode {
            id: path.to_string_lossy().into_owned(),
            text: display_name_for(path),
            node_type,
            children,
            data: ListedNodeData {
                excluded_info: exclusion,
            },
        }
    }

    fn error(id: String, message: String) -> Self {
        ListedNode {
            id,
            text: message,
            node_type: ListedNodeType::Error,
            children: ListedChildren::Flag(false),
            data: ListedNodeData::default(),
        }
    }

    /*
     * Converts the node and any inline children into a store descriptor. Error
     * nodes have no counterpart in the tree and yield `None`.
     */
    pub fn into_descriptor(self) -> Option<NodeDescriptor> {
        let kind = match self.node_type {
            ListedNodeType::File => NodeKind::File,
            ListedNodeType::Folder => NodeKind::Directory,
            ListedNodeType::Error => {
                log::warn!("DirectoryListing: Skipping error node '{}': {}", self.id, self.text);
                return None;
            }
        };
        let children = match (kind, self.children) {
            (NodeKind::File, _) => None,
            (NodeKind::Directory, ListedChildren::Flag(true)) => None,
            (NodeKind::Directory, ListedChildren::Flag(false)) => Some(Vec::new()),
            (NodeKind::Directory, ListedChildren::Nodes(nodes)) => Some(
                nodes
                    .into_iter()
                    .filter_map(ListedNode::into_descriptor)
                    .collect(),
            ),
        };
        Some(NodeDescriptor {
            path: PathBuf::from(self.id),
            name: self.text,
            kind,
            exclusion: self.data.excluded_info,
            children,
        })
    }

    /*
     * The immediate children of a listed directory. A directory listed without
     * an inline array cannot satisfy an expand request.
     */
    pub fn into_child_descriptors(self) -> Result<Vec<NodeDescriptor>> {
        match self.children {
            ListedChildren::Nodes(nodes) => Ok(nodes
                .into_iter()
                .filter_map(ListedNode::into_descriptor)
                .collect()),
            ListedChildren::Flag(false) => Ok(Vec::new()),
            ListedChildren::Flag(true) => Err(ListingError::Malformed(format!(
                "listing of '{}' announced children but did not deliver them",
                self.id
            ))),
        }
    }
}

/*
 * Lists a single directory level. Implementations attach exclusion metadata
 * but never hide excluded entries; the engine shows them locked.
 */
pub trait DirectoryListingOperations: Send + Sync {
    fn list(&self, path: &Path) -> Result<ListedNode>;
}

/*
 * Local lister built on `ignore::WalkBuilder` limited to depth 1. Standard
 * filters are off so hidden and gitignored entries are listed too; exclusion is
 * decided by the host rules alone. Directories come first, then files, each
 * sorted by name.
 */
pub struct CoreDirectoryLister {
    rules: CompiledExclusionRules,
}

impl CoreDirectoryLister {
    pub fn new(rules: &ExclusionRules) -> Self {
        CoreDirectoryLister {
            rules: rules.compile(),
        }
    }
}

impl Default for CoreDirectoryLister {
    fn default() -> Self {
        Self::new(&ExclusionRules::default())
    }
}

impl DirectoryListingOperations for CoreDirectoryLister {
    fn list(&self, path: &Path) -> Result<ListedNode> {
        if !path.exists() {
            return Err(ListingError::NotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(ListingError::NotADirectory(path.to_path_buf()));
        }
        log::debug!("CoreDirectoryLister: Listing {path:?}");

        let walker = WalkBuilder::new(path)
            .max_depth(Some(1))
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut errors = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("CoreDirectoryLister: Entry under {path:?} unreadable: {e}");
                    errors.push(ListedNode::error(
                        path.to_string_lossy().into_owned(),
                        format!("Error: {e}"),
                    ));
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let entry_path = entry.path();
            let kind = if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            let exclusion = self.rules.check_item(entry_path, kind);
            if let Some(info) = &exclusion {
                log::trace!("CoreDirectoryLister: {entry_path:?} excluded by {info}");
            }
            let listed = ListedNode::entry(entry_path, kind, exclusion);
            match kind {
                NodeKind::Directory => dirs.push(listed),
                NodeKind::File => files.push(listed),
            }
        }

        let mut children = dirs;
        children.extend(files);
        children.extend(errors);
        log::debug!(
            "CoreDirectoryLister: {} entries under {:?}",
            children.len(),
            path
        );

        /* The listed directory's own exclusion comes from its parent's listing. */
        let mut node = ListedNode::entry(path, NodeKind::Directory, None);
        node.children = ListedChildren::Nodes(children);
        Ok(node)
    }
}
