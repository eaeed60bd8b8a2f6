/*
 * This module implements the selection cascade over a `TreeNodeStore`.
 * Setting a node checked or unchecked pushes the same explicit state down to
 * every loaded, unlocked descendant and then re-derives the tri-state of every
 * affected directory from its loaded children, deepest first. Locked nodes
 * (excluded, or beneath an excluded directory) are never checked: attempts are
 * reported as violations, cascades skip them, and every operation finishes with
 * a pass that forces any locked node back to unchecked.
 *
 * The engine is stateless; all state lives in the store passed to each call.
 * It is exposed through `NodeStateApplicatorOperations` so the session can be
 * tested against alternative implementations.
 */
use super::exclusion::ExclusionResolver;
use super::tree_node::{ExclusionInfo, SelectionState};
use super::tree_store::{Result, StoreError, TreeNodeStore, UpsertSummary};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/*
 * An attempt to check a locked node. The engine corrects it on the spot, so
 * this is informational: `blocked_by` is the excluded node (possibly `path`
 * itself) and `reason` its descriptor.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionViolation {
    pub path: PathBuf,
    pub blocked_by: PathBuf,
    pub reason: Option<ExclusionInfo>,
}

/*
 * Outcome of one engine operation: every state transition in the order it was
 * applied, plus the violations that were corrected along the way.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub changes: Vec<(PathBuf, SelectionState)>,
    pub violations: Vec<ExclusionViolation>,
}

impl CascadeReport {
    fn merge(&mut self, other: CascadeReport) {
        self.changes.extend(other.changes);
        self.violations.extend(other.violations);
    }
}

pub trait NodeStateApplicatorOperations: Send + Sync {
    fn check(&self, store: &mut TreeNodeStore, path: &Path) -> Result<CascadeReport>;
    fn uncheck(&self, store: &mut TreeNodeStore, path: &Path) -> Result<CascadeReport>;
    fn set_checked(
        &self,
        store: &mut TreeNodeStore,
        path: &Path,
        checked: bool,
    ) -> Result<CascadeReport>;
    /*
     * Checks every path, then re-derives each affected directory once. The
     * result is identical to calling `check` for each path in turn. Fails
     * without touching the store if any path is unknown.
     */
    fn check_many(&self, store: &mut TreeNodeStore, paths: &[PathBuf]) -> Result<CascadeReport>;
    fn uncheck_all(&self, store: &mut TreeNodeStore) -> CascadeReport;
    /*
     * Integrates freshly loaded children of `parent`: new nodes inherit a
     * checked parent's intent unless locked, and the parent plus its ancestors
     * are re-derived (children may also have disappeared).
     */
    fn integrate_loaded_children(
        &self,
        store: &mut TreeNodeStore,
        parent: &Path,
        summary: &UpsertSummary,
    ) -> CascadeReport;
    fn enforce_locks(&self, store: &mut TreeNodeStore) -> CascadeReport;
    /*
     * The paths currently checked and not locked, in tree order. This is the
     * only input accepted by flatten and preset save.
     */
    fn selection_set(&self, store: &TreeNodeStore) -> Vec<PathBuf>;
}

#[derive(Debug, Default)]
pub struct NodeStateApplicator {}

impl NodeStateApplicator {
    pub fn new() -> Self {
        NodeStateApplicator {}
    }

    fn set_state(
        store: &mut TreeNodeStore,
        path: &Path,
        new_state: SelectionState,
        changes: &mut Vec<(PathBuf, SelectionState)>,
    ) {
        if let Some(node) = store.get_node_mut(path)
            && node.state != new_state
        {
            node.state = new_state;
            changes.push((path.to_path_buf(), new_state));
        }
    }

    fn violation_for(store: &TreeNodeStore, path: &Path) -> Option<ExclusionViolation> {
        let resolver = ExclusionResolver::new(store);
        let blocker = resolver.blocking_node(path)?;
        Some(ExclusionViolation {
            path: path.to_path_buf(),
            blocked_by: blocker.to_path_buf(),
            reason: resolver.lock_reason(blocker).cloned(),
        })
    }

    /*
     * Sets `path` and its loaded descendants to `state`, not entering excluded
     * subtrees. Every visited path is added to `dirty` for re-derivation.
     */
    fn cascade_down(
        store: &mut TreeNodeStore,
        path: &Path,
        state: SelectionState,
        changes: &mut Vec<(PathBuf, SelectionState)>,
        dirty: &mut HashSet<PathBuf>,
    ) {
        let mut stack = vec![path.to_path_buf()];
        while let Some(current) = stack.pop() {
            let Some(node) = store.get_node(&current) else {
                continue;
            };
            if node.is_excluded() && current != path {
                continue;
            }
            let children: Vec<PathBuf> = node.children.iter().rev().cloned().collect();
            Self::set_state(store, &current, state, changes);
            dirty.insert(current);
            stack.extend(children);
        }
    }

    fn derive_state(store: &TreeNodeStore, path: &Path) -> Option<SelectionState> {
        let node = store.get_node(path)?;
        if !node.has_derived_state() {
            return None;
        }
        let mut any_checked = false;
        let mut all_checked = true;
        for child in &node.children {
            match store.get_node(child).map(|c| c.state) {
                Some(SelectionState::Checked) => any_checked = true,
                Some(SelectionState::Indeterminate) => {
                    any_checked = true;
                    all_checked = false;
                }
                Some(SelectionState::Unchecked) | None => all_checked = false,
            }
        }
        Some(if all_checked {
            SelectionState::Checked
        } else if any_checked {
            SelectionState::Indeterminate
        } else {
            SelectionState::Unchecked
        })
    }

    /*
     * Re-derives every dirty path and all of its ancestors exactly once,
     * deepest first so that each directory sees its children's final state.
     */
    fn rederive(
        store: &mut TreeNodeStore,
        dirty: HashSet<PathBuf>,
        changes: &mut Vec<(PathBuf, SelectionState)>,
    ) {
        let mut pending: HashSet<PathBuf> = HashSet::new();
        for path in dirty {
            pending.extend(store.ancestors(&path));
            pending.insert(path);
        }
        let mut ordered: Vec<(usize, PathBuf)> = pending
            .into_iter()
            .map(|p| (store.depth(&p), p))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        for (_, path) in ordered {
            if let Some(derived) = Self::derive_state(store, &path) {
                Self::set_state(store, &path, derived, changes);
            }
        }
    }

    fn apply(
        &self,
        store: &mut TreeNodeStore,
        paths: &[PathBuf],
        checked: bool,
    ) -> Result<CascadeReport> {
        if let Some(missing) = paths.iter().find(|p| !store.contains(p)) {
            log::debug!("NodeStateApplicator: Refusing cascade, {missing:?} is not in the tree.");
            return Err(StoreError::NodeNotFound(missing.clone()));
        }
        let target = if checked {
            SelectionState::Checked
        } else {
            SelectionState::Unchecked
        };

        let mut report = CascadeReport::default();
        let mut dirty = HashSet::new();
        for path in paths {
            if checked {
                if let Some(violation) = Self::violation_for(store, path) {
                    log::debug!(
                        "NodeStateApplicator: Rejected check of locked node {:?} (blocked by {:?}).",
                        violation.path,
                        violation.blocked_by
                    );
                    report.violations.push(violation);
                    continue;
                }
            }
            Self::cascade_down(store, path, target, &mut report.changes, &mut dirty);
        }
        Self::rederive(store, dirty, &mut report.changes);
        report.merge(self.enforce_locks(store));
        log::trace!(
            "NodeStateApplicator: Applied {:?} to {} path(s): {} change(s), {} violation(s).",
            target,
            paths.len(),
            report.changes.len(),
            report.violations.len()
        );
        Ok(report)
    }
}

impl NodeStateApplicatorOperations for NodeStateApplicator {
    fn check(&self, store: &mut TreeNodeStore, path: &Path) -> Result<CascadeReport> {
        self.apply(store, &[path.to_path_buf()], true)
    }

    fn uncheck(&self, store: &mut TreeNodeStore, path: &Path) -> Result<CascadeReport> {
        self.apply(store, &[path.to_path_buf()], false)
    }

    fn set_checked(
        &self,
        store: &mut TreeNodeStore,
        path: &Path,
        checked: bool,
    ) -> Result<CascadeReport> {
        self.apply(store, &[path.to_path_buf()], checked)
    }

    fn check_many(&self, store: &mut TreeNodeStore, paths: &[PathBuf]) -> Result<CascadeReport> {
        self.apply(store, paths, true)
    }

    fn uncheck_all(&self, store: &mut TreeNodeStore) -> CascadeReport {
        let mut report = CascadeReport::default();
        let all: Vec<PathBuf> = store
            .nodes_in_tree_order()
            .iter()
            .map(|n| n.path.clone())
            .collect();
        for path in all {
            Self::set_state(store, &path, SelectionState::Unchecked, &mut report.changes);
        }
        log::debug!(
            "NodeStateApplicator: Unchecked all ({} change(s)).",
            report.changes.len()
        );
        report
    }

    fn integrate_loaded_children(
        &self,
        store: &mut TreeNodeStore,
        parent: &Path,
        summary: &UpsertSummary,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        let mut dirty: HashSet<PathBuf> = HashSet::new();
        dirty.insert(parent.to_path_buf());

        // `inserted` lists parents before their inline children, so a newly
        // checked directory passes its intent on within this same loop.
        for path in &summary.inserted {
            let parent_checked = store
                .parent_of(path)
                .and_then(|p| store.get_node(p))
                .is_some_and(|p| p.state == SelectionState::Checked);
            let locked = ExclusionResolver::new(store).is_locked(path);
            let inherited = if parent_checked && !locked {
                SelectionState::Checked
            } else {
                SelectionState::Unchecked
            };
            Self::set_state(store, path, inherited, &mut report.changes);
            dirty.insert(path.clone());
        }
        Self::rederive(store, dirty, &mut report.changes);
        report.merge(self.enforce_locks(store));
        report
    }

    fn enforce_locks(&self, store: &mut TreeNodeStore) -> CascadeReport {
        let mut report = CascadeReport::default();
        let mut corrected: HashSet<PathBuf> = HashSet::new();

        let mut stack: Vec<(PathBuf, bool)> = vec![(store.root_path().to_path_buf(), false)];
        while let Some((path, blocked_above)) = stack.pop() {
            let Some(node) = store.get_node(&path) else {
                continue;
            };
            let blocked = blocked_above || node.is_excluded();
            let needs_fix = blocked && node.state != SelectionState::Unchecked;
            stack.extend(node.children.iter().map(|c| (c.clone(), blocked)));
            if needs_fix {
                log::debug!("NodeStateApplicator: Forcing locked node {path:?} to unchecked.");
                Self::set_state(store, &path, SelectionState::Unchecked, &mut report.changes);
                corrected.insert(path);
            }
        }

        if !corrected.is_empty() {
            let parents: HashSet<PathBuf> = corrected
                .iter()
                .filter_map(|p| store.parent_of(p).map(Path::to_path_buf))
                .collect();
            Self::rederive(store, parents, &mut report.changes);
        }
        report
    }

    fn selection_set(&self, store: &TreeNodeStore) -> Vec<PathBuf> {
        let resolver = ExclusionResolver::new(store);
        store
            .nodes_in_tree_order()
            .into_iter()
            .filter(|n| n.state == SelectionState::Checked && !resolver.is_locked(&n.path))
            .map(|n| n.path.clone())
            .collect()
    }
}
