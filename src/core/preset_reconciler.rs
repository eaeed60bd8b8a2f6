/*
 * Maps a stored list of paths onto the live, possibly partial tree.
 * Every input path lands in exactly one bucket: `absent` when the store does
 * not know it, `excluded` when it is locked (excluded itself or beneath an
 * excluded directory), `applied` otherwise. Only the applied bucket is handed
 * to the cascade engine. The save direction filters locked paths out of a
 * selection before it is persisted.
 */
use super::exclusion::ExclusionResolver;
use super::node_state_applicator::{CascadeReport, NodeStateApplicatorOperations};
use super::tree_store::{Result, TreeNodeStore};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub applied: Vec<PathBuf>,
    pub excluded: Vec<PathBuf>,
    pub absent: Vec<PathBuf>,
    pub cascade: CascadeReport,
}

impl ReconcileReport {
    pub fn total(&self) -> usize {
        self.applied.len() + self.excluded.len() + self.absent.len()
    }

    pub fn not_selected(&self) -> usize {
        self.excluded.len() + self.absent.len()
    }

    pub fn is_partial(&self) -> bool {
        self.not_selected() > 0
    }

    /*
     * Human-readable summary for partial results, e.g.
     * "2 of 5 items were not selected (1 excluded, 1 not found)."
     */
    pub fn summary_message(&self) -> Option<String> {
        if !self.is_partial() {
            return None;
        }
        Some(format!(
            "{} of {} items were not selected ({} excluded, {} not found).",
            self.not_selected(),
            self.total(),
            self.excluded.len(),
            self.absent.len()
        ))
    }
}

/*
 * Partitions `paths` without touching selection state. Duplicates are
 * classified once, at their first occurrence.
 */
pub fn classify(store: &TreeNodeStore, paths: &[PathBuf]) -> ReconcileReport {
    let resolver = ExclusionResolver::new(store);
    let mut seen = HashSet::new();
    let mut report = ReconcileReport::default();
    for path in paths {
        if !seen.insert(path.clone()) {
            continue;
        }
        if !store.contains(path) {
            report.absent.push(path.clone());
        } else if resolver.is_locked(path) {
            report.excluded.push(path.clone());
        } else {
            report.applied.push(path.clone());
        }
    }
    report
}

pub fn reconcile(
    store: &mut TreeNodeStore,
    applicator: &dyn NodeStateApplicatorOperations,
    paths: &[PathBuf],
) -> Result<ReconcileReport> {
    let mut report = classify(store, paths);
    report.cascade = applicator.check_many(store, &report.applied)?;
    log::debug!(
        "PresetReconciler: {} applied, {} excluded, {} absent of {} path(s).",
        report.applied.len(),
        report.excluded.len(),
        report.absent.len(),
        paths.len()
    );
    if !report.absent.is_empty() {
        log::trace!("PresetReconciler: Absent paths: {:?}", report.absent);
    }
    Ok(report)
}

/*
 * Filters a selection down to what may be persisted. Locked paths are dropped;
 * paths the store does not know are kept since their lock state cannot be
 * judged here.
 */
pub fn build_preset_payload(store: &TreeNodeStore, selection: &[PathBuf]) -> Vec<PathBuf> {
    let resolver = ExclusionResolver::new(store);
    selection
        .iter()
        .filter(|p| {
            let locked = resolver.is_locked(p);
            if locked {
                log::warn!("PresetReconciler: Dropping locked path {p:?} from preset payload.");
            }
            !locked
        })
        .cloned()
        .collect()
}
