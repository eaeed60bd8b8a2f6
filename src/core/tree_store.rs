/*
 * This module holds the materialized part of the filesystem tree known to a
 * session. Nodes are owned by a path-keyed map and the parent relation lives in
 * a second map, so navigation never needs back-pointers on the nodes
 * themselves. Children arrive lazily through `upsert_children`, which is also
 * how a refresh of an already loaded directory is merged in.
 */
use super::tree_node::{LoadState, NodeDescriptor, NodeKind, TreeNode};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NodeNotFound(PathBuf),
    NotADirectory(PathBuf),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NodeNotFound(p) => write!(f, "Node not found in tree: {p:?}"),
            StoreError::NotADirectory(p) => write!(f, "Node is not a directory: {p:?}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type Result<T> = std::result::Result<T, StoreError>;

/*
 * Answer of `TreeNodeStore::get_parent`. The root is present but has no
 * parent, which is distinct from a path the store has never seen.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLookup<'a> {
    Parent(&'a Path),
    Root,
    Absent,
}

/*
 * Paths that entered or left the store during one `upsert_children` call.
 * The session uses `inserted` to let newly loaded children inherit the
 * selection intent of their parent.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TreeNodeStore {
    root: PathBuf,
    nodes: HashMap<PathBuf, TreeNode>,
    parents: HashMap<PathBuf, PathBuf>,
}

impl TreeNodeStore {
    /*
     * Builds a fresh store around a root descriptor. Inline children in the
     * descriptor (the listing format allows whole subtrees) are inserted
     * recursively and their parents marked loaded.
     */
    pub fn from_root(root: NodeDescriptor) -> Self {
        let root_path = root.path.clone();
        let mut store = TreeNodeStore {
            root: root_path.clone(),
            nodes: HashMap::new(),
            parents: HashMap::new(),
        };
        let node = TreeNode::new(root.path, root.name, root.kind, root.exclusion);
        store.nodes.insert(root_path.clone(), node);
        if let Some(children) = root.children {
            if let Err(e) = store.upsert_children(&root_path, children) {
                log::warn!("TreeNodeStore: Could not insert inline children of root: {e}");
            }
        }
        log::debug!(
            "TreeNodeStore: Created store rooted at {:?} with {} node(s).",
            store.root,
            store.nodes.len()
        );
        store
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn get_node(&self, path: &Path) -> Option<&TreeNode> {
        self.nodes.get(path)
    }

    pub(crate) fn get_node_mut(&mut self, path: &Path) -> Option<&mut TreeNode> {
        self.nodes.get_mut(path)
    }

    pub fn node(&self, path: &Path) -> Result<&TreeNode> {
        self.nodes
            .get(path)
            .ok_or_else(|| StoreError::NodeNotFound(path.to_path_buf()))
    }

    pub fn get_parent(&self, path: &Path) -> ParentLookup<'_> {
        if !self.nodes.contains_key(path) {
            return ParentLookup::Absent;
        }
        match self.parents.get(path) {
            Some(parent) => ParentLookup::Parent(parent.as_path()),
            None => ParentLookup::Root,
        }
    }

    pub fn parent_of(&self, path: &Path) -> Option<&Path> {
        self.parents.get(path).map(PathBuf::as_path)
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.nodes
            .get(path)
            .is_some_and(|n| n.load_state == LoadState::Loaded)
    }

    pub fn set_load_state(&mut self, path: &Path, load_state: LoadState) -> Result<()> {
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NodeNotFound(path.to_path_buf()))?;
        node.load_state = load_state;
        Ok(())
    }

    pub fn children(&self, path: &Path) -> Result<&[PathBuf]> {
        Ok(&self.node(path)?.children)
    }

    /*
     * Returns the ancestors of `path`, nearest first, ending with the root.
     * Unknown paths have no ancestors.
     */
    pub fn ancestors(&self, path: &Path) -> Vec<PathBuf> {
        let mut result = Vec::new();
        let mut current = self.parents.get(path);
        while let Some(parent) = current {
            result.push(parent.clone());
            current = self.parents.get(parent);
        }
        result
    }

    pub fn depth(&self, path: &Path) -> usize {
        self.ancestors(path).len()
    }

    /*
     * Collects every loaded descendant of `path` in pre-order (listing order),
     * not including `path` itself.
     */
    pub fn loaded_descendants(&self, path: &Path) -> Vec<PathBuf> {
        let mut result = Vec::new();
        let mut stack: Vec<&PathBuf> = match self.nodes.get(path) {
            Some(node) => node.children.iter().rev().collect(),
            None => return result,
        };
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                result.push(current.clone());
                stack.extend(node.children.iter().rev());
            }
        }
        result
    }

    /*
     * All nodes in tree order, root first.
     */
    pub fn nodes_in_tree_order(&self) -> Vec<&TreeNode> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        if let Some(root) = self.nodes.get(&self.root) {
            ordered.push(root);
        }
        for path in self.loaded_descendants(&self.root) {
            if let Some(node) = self.nodes.get(&path) {
                ordered.push(node);
            }
        }
        ordered
    }

    /*
     * Replaces the known children of `parent` with `children` and marks it
     * loaded. Children that already exist keep their own children, load state
     * and selection state; only their metadata (name, kind, exclusion) is
     * overwritten. Children that are no longer listed are dropped with their
     * whole subtree. A change of kind resets the node as if newly discovered.
     */
    pub fn upsert_children(
        &mut self,
        parent: &Path,
        children: Vec<NodeDescriptor>,
    ) -> Result<UpsertSummary> {
        let parent_node = self.node(parent)?;
        if !parent_node.is_dir() {
            return Err(StoreError::NotADirectory(parent.to_path_buf()));
        }
        let old_children = parent_node.children.clone();

        let mut summary = UpsertSummary::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut new_child_paths = Vec::with_capacity(children.len());
        let mut pending_inline: Vec<(PathBuf, Vec<NodeDescriptor>)> = Vec::new();

        for descriptor in children {
            if !seen.insert(descriptor.path.clone()) {
                log::warn!(
                    "TreeNodeStore: Duplicate child {:?} listed under {:?}; keeping first.",
                    descriptor.path,
                    parent
                );
                continue;
            }
            let child_path = descriptor.path.clone();
            new_child_paths.push(child_path.clone());

            let reset_subtree = match self.nodes.get_mut(&child_path) {
                Some(existing) => {
                    let kind_changed = existing.kind != descriptor.kind;
                    existing.name = descriptor.name;
                    existing.exclusion = descriptor.exclusion;
                    existing.kind = descriptor.kind;
                    kind_changed
                }
                None => {
                    let node = TreeNode::new(
                        child_path.clone(),
                        descriptor.name,
                        descriptor.kind,
                        descriptor.exclusion,
                    );
                    self.nodes.insert(child_path.clone(), node);
                    summary.inserted.push(child_path.clone());
                    false
                }
            };
            if reset_subtree {
                log::debug!("TreeNodeStore: Kind of {child_path:?} changed; resetting its subtree.");
                let grandchildren = self
                    .nodes
                    .get(&child_path)
                    .map(|n| n.children.clone())
                    .unwrap_or_default();
                for grandchild in grandchildren {
                    self.remove_subtree(&grandchild, &mut summary.removed);
                }
                if let Some(node) = self.nodes.get_mut(&child_path) {
                    node.children.clear();
                    node.load_state = match node.kind {
                        NodeKind::File => LoadState::Loaded,
                        NodeKind::Directory => LoadState::Unloaded,
                    };
                }
            }
            self.parents.insert(child_path.clone(), parent.to_path_buf());

            if let Some(inline) = descriptor.children {
                pending_inline.push((child_path, inline));
            }
        }

        for old_child in old_children {
            if !seen.contains(&old_child) {
                self.remove_subtree(&old_child, &mut summary.removed);
            }
        }

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children = new_child_paths;
            parent_node.load_state = LoadState::Loaded;
        }

        for (child_path, inline) in pending_inline {
            let nested = self.upsert_children(&child_path, inline)?;
            summary.inserted.extend(nested.inserted);
            summary.removed.extend(nested.removed);
        }

        log::trace!(
            "TreeNodeStore: Upserted children of {:?}: {} inserted, {} removed.",
            parent,
            summary.inserted.len(),
            summary.removed.len()
        );
        Ok(summary)
    }

    fn remove_subtree(&mut self, path: &Path, removed: &mut Vec<PathBuf>) {
        let Some(node) = self.nodes.remove(path) else {
            return;
        };
        self.parents.remove(path);
        for child in &node.children {
            self.remove_subtree(child, removed);
        }
        removed.push(path.to_path_buf());
    }
}
