use crate::core::directory_listing::{self, DirectoryListingOperations, ListedNode};
use crate::core::flatten_contract::{self, DisplayModel};
use crate::core::flattener::FlattenOperations;
use crate::core::node_state_applicator::{
    CascadeReport, NodeStateApplicator, NodeStateApplicatorOperations,
};
use crate::core::preset_reconciler::{self, ReconcileReport};
use crate::core::presets::{DeletedPreset, PresetEntry, PresetStoreOperations, SavedPreset};
use crate::core::service_error::ServiceError;
use crate::core::tree_node::{LoadState, NodeKind};
use crate::core::tree_store::{StoreError, TreeNodeStore, UpsertSummary};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/*
 * The session owns the materialized tree and drives every engine operation
 * against it. Collaborators are injected as trait objects so tests can replace
 * them. Listing calls are modelled as two-phase fetches: `begin_fetch` marks a
 * directory loading and hands out a ticket stamped with the current
 * generation; `complete_fetch` applies the result unless a rebuild has replaced
 * the tree in the meantime.
 */

#[derive(Debug)]
pub enum SessionError {
    NoTree,
    Store(StoreError),
    Service(ServiceError),
    InvalidRoot(PathBuf),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err)
    }
}

impl From<ServiceError> for SessionError {
    fn from(err: ServiceError) -> Self {
        SessionError::Service(err)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NoTree => write!(f, "No tree has been loaded"),
            SessionError::Store(e) => write!(f, "{e}"),
            SessionError::Service(e) => write!(f, "{e}"),
            SessionError::InvalidRoot(p) => write!(f, "Root is not a listable directory: {p:?}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Store(e) => Some(e),
            SessionError::Service(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/*
 * Proof that a fetch for `path` was started under `generation`. A failed
 * fetch puts the node back to `prior_state`.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub path: PathBuf,
    pub generation: u64,
    pub prior_state: LoadState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied {
        summary: UpsertSummary,
        cascade: CascadeReport,
    },
    /* The node was already loading or loaded; no fetch was started. */
    Coalesced,
    /* The completion belonged to an older tree, or its node is gone. */
    Discarded,
}

pub struct TreeSession {
    store: Option<TreeNodeStore>,
    generation: u64,
    lister: Arc<dyn DirectoryListingOperations>,
    preset_store: Arc<dyn PresetStoreOperations>,
    flattener: Arc<dyn FlattenOperations>,
    applicator: Arc<dyn NodeStateApplicatorOperations>,
}

impl TreeSession {
    pub fn new(
        lister: Arc<dyn DirectoryListingOperations>,
        preset_store: Arc<dyn PresetStoreOperations>,
        flattener: Arc<dyn FlattenOperations>,
    ) -> Self {
        Self::with_applicator(
            lister,
            preset_store,
            flattener,
            Arc::new(NodeStateApplicator::new()),
        )
    }

    pub fn with_applicator(
        lister: Arc<dyn DirectoryListingOperations>,
        preset_store: Arc<dyn PresetStoreOperations>,
        flattener: Arc<dyn FlattenOperations>,
        applicator: Arc<dyn NodeStateApplicatorOperations>,
    ) -> Self {
        TreeSession {
            store: None,
            generation: 0,
            lister,
            preset_store,
            flattener,
            applicator,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> Option<&TreeNodeStore> {
        self.store.as_ref()
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.root_path())
    }

    fn store_mut(&mut self) -> Result<&mut TreeNodeStore> {
        self.store.as_mut().ok_or(SessionError::NoTree)
    }

    fn store_ref(&self) -> Result<&TreeNodeStore> {
        self.store.as_ref().ok_or(SessionError::NoTree)
    }

    /*
     * Lists `root` and replaces the whole tree with a fresh one. On failure the
     * previous tree and generation stay in place.
     */
    pub fn rebuild_tree(&mut self, root: &Path) -> Result<()> {
        log::debug!("TreeSession: Rebuilding tree at {root:?}");
        let listed = self.lister.list(root).map_err(ServiceError::listing)?;
        let descriptor = listed
            .into_descriptor()
            .ok_or_else(|| SessionError::InvalidRoot(root.to_path_buf()))?;
        if descriptor.kind != NodeKind::Directory {
            return Err(SessionError::InvalidRoot(root.to_path_buf()));
        }
        let mut store = TreeNodeStore::from_root(descriptor);
        self.applicator.enforce_locks(&mut store);
        self.store = Some(store);
        self.generation += 1;
        log::info!(
            "TreeSession: Tree rebuilt at {:?} (generation {}).",
            root,
            self.generation
        );
        Ok(())
    }

    /*
     * Starts a fetch of the children of `path`. Returns `None` when the node
     * is a file or is already loading or loaded, so concurrent requests for the
     * same directory collapse into one.
     */
    pub fn begin_fetch(&mut self, path: &Path) -> Result<Option<FetchTicket>> {
        let generation = self.generation;
        let store = self.store_mut()?;
        let node = store.node(path)?;
        if node.kind == NodeKind::File || node.load_state != LoadState::Unloaded {
            log::trace!(
                "TreeSession: Fetch of {:?} coalesced ({:?}).",
                path,
                node.load_state
            );
            return Ok(None);
        }
        store.set_load_state(path, LoadState::Loading)?;
        Ok(Some(FetchTicket {
            path: path.to_path_buf(),
            generation,
            prior_state: LoadState::Unloaded,
        }))
    }

    /*
     * Applies a listing result to the node the ticket was issued for. Stale
     * tickets are discarded without touching the tree. A failed listing puts
     * the node back to the load state it had before the fetch: an unloaded
     * directory can be retried and a refreshed one keeps its children.
     */
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: directory_listing::Result<ListedNode>,
    ) -> Result<FetchOutcome> {
        if ticket.generation != self.generation {
            log::debug!(
                "TreeSession: Discarding stale fetch of {:?} (generation {} != {}).",
                ticket.path,
                ticket.generation,
                self.generation
            );
            return Ok(FetchOutcome::Discarded);
        }
        let applicator = Arc::clone(&self.applicator);
        let store = self.store_mut()?;
        if !store.contains(&ticket.path) {
            log::debug!("TreeSession: Discarding fetch of vanished node {:?}.", ticket.path);
            return Ok(FetchOutcome::Discarded);
        }

        let children = match result.and_then(ListedNode::into_child_descriptors) {
            Ok(children) => children,
            Err(e) => {
                log::warn!("TreeSession: Listing {:?} failed: {e}", ticket.path);
                store.set_load_state(&ticket.path, ticket.prior_state)?;
                return Err(ServiceError::listing(e).into());
            }
        };
        let summary = store.upsert_children(&ticket.path, children)?;
        let cascade = applicator.integrate_loaded_children(store, &ticket.path, &summary);
        Ok(FetchOutcome::Applied { summary, cascade })
    }

    fn fetch_now(&mut self, ticket: FetchTicket) -> Result<FetchOutcome> {
        let result = self.lister.list(&ticket.path);
        self.complete_fetch(ticket, result)
    }

    pub fn expand(&mut self, path: &Path) -> Result<FetchOutcome> {
        match self.begin_fetch(path)? {
            Some(ticket) => self.fetch_now(ticket),
            None => Ok(FetchOutcome::Coalesced),
        }
    }

    /*
     * Re-lists a directory whether or not it was loaded. Existing children keep
     * their selection and loaded subtrees; their metadata (exclusion included)
     * is replaced by the fresh listing.
     */
    pub fn refresh(&mut self, path: &Path) -> Result<FetchOutcome> {
        let generation = self.generation;
        let store = self.store_mut()?;
        let node = store.node(path)?;
        let prior_state = node.load_state;
        match (node.kind, prior_state) {
            (NodeKind::File, _) | (_, LoadState::Loading) => return Ok(FetchOutcome::Coalesced),
            _ => {}
        }
        store.set_load_state(path, LoadState::Loading)?;
        self.fetch_now(FetchTicket {
            path: path.to_path_buf(),
            generation,
            prior_state,
        })
    }

    /*
     * Loads every unlocked directory down to `max_depth` levels below the root.
     * Listing failures are logged and the directory stays collapsed.
     */
    pub fn expand_to_depth(&mut self, max_depth: usize) -> Result<()> {
        let root = self.store_ref()?.root_path().to_path_buf();
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((path, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(node) = self.store_ref()?.get_node(&path) else {
                continue;
            };
            if !node.is_dir() || node.is_excluded() {
                continue;
            }
            if let Err(e) = self.expand(&path) {
                log::warn!("TreeSession: Could not expand {path:?}: {e}");
                continue;
            }
            let children = self.store_ref()?.children(&path)?.to_vec();
            queue.extend(children.into_iter().map(|c| (c, depth + 1)));
        }
        Ok(())
    }

    pub fn set_checked(&mut self, path: &Path, checked: bool) -> Result<CascadeReport> {
        let applicator = Arc::clone(&self.applicator);
        let store = self.store_mut()?;
        Ok(applicator.set_checked(store, path, checked)?)
    }

    /*
     * Adds a batch of paths to the selection. Unloaded ancestors are loaded
     * first so paths deep below the root can be selected before anything was
     * expanded. Paths that are absent or locked are reported, not applied, and
     * nothing already selected is cleared.
     */
    pub fn apply_selection(&mut self, paths: &[PathBuf]) -> Result<ReconcileReport> {
        self.store_ref()?;
        for path in paths {
            self.reveal(path)?;
        }
        let applicator = Arc::clone(&self.applicator);
        let store = self.store_mut()?;
        let report = preset_reconciler::reconcile(store, applicator.as_ref(), paths)?;
        if let Some(message) = report.summary_message() {
            log::warn!("TreeSession: Selection: {message}");
        } else {
            log::debug!("TreeSession: Selected {} path(s).", report.applied.len());
        }
        Ok(report)
    }

    pub fn current_selection(&self) -> Vec<PathBuf> {
        match &self.store {
            Some(store) => self.applicator.selection_set(store),
            None => Vec::new(),
        }
    }

    pub fn list_presets(&self) -> Result<Vec<PresetEntry>> {
        Ok(self.preset_store.list().map_err(ServiceError::presets)?)
    }

    /*
     * Saves the current selection as a user preset. Locked paths are never
     * persisted.
     */
    pub fn save_preset(&self, name: &str) -> Result<SavedPreset> {
        let store = self.store_ref()?;
        let selection = self.applicator.selection_set(store);
        let payload = preset_reconciler::build_preset_payload(store, &selection);
        Ok(self
            .preset_store
            .save(name, &payload)
            .map_err(ServiceError::presets)?)
    }

    pub fn delete_preset(&self, id: &str) -> Result<DeletedPreset> {
        Ok(self
            .preset_store
            .delete(id)
            .map_err(ServiceError::presets)?)
    }

    /*
     * Replaces the selection with a stored preset. Paths under the current
     * root whose ancestors are not loaded yet are revealed first. If the preset
     * cannot be read the selection is left untouched.
     */
    pub fn load_preset(&mut self, id: &str) -> Result<ReconcileReport> {
        self.store_ref()?;
        let paths = self
            .preset_store
            .load(id)
            .map_err(ServiceError::presets)?;
        for path in &paths {
            self.reveal(path)?;
        }
        let applicator = Arc::clone(&self.applicator);
        let store = self.store_mut()?;
        applicator.uncheck_all(store);
        let report = preset_reconciler::reconcile(store, applicator.as_ref(), &paths)?;
        if let Some(message) = report.summary_message() {
            log::warn!("TreeSession: Preset '{id}': {message}");
        } else {
            log::info!("TreeSession: Preset '{id}' applied ({} path(s)).", report.applied.len());
        }
        Ok(report)
    }

    /*
     * Expands the unloaded ancestors of `path`, top-down, as long as they exist
     * in the tree. Paths outside the root are left alone.
     */
    fn reveal(&mut self, path: &Path) -> Result<()> {
        let store = self.store_ref()?;
        let root = store.root_path().to_path_buf();
        if store.contains(path) || !path.starts_with(&root) {
            return Ok(());
        }
        let mut chain: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .take_while(|a| a.starts_with(&root))
            .map(Path::to_path_buf)
            .collect();
        chain.reverse();
        for ancestor in chain {
            let Some(node) = self.store_ref()?.get_node(&ancestor) else {
                break;
            };
            if !node.is_dir() {
                break;
            }
            if let Err(e) = self.expand(&ancestor) {
                log::warn!("TreeSession: Could not reveal {path:?} via {ancestor:?}: {e}");
                break;
            }
        }
        Ok(())
    }

    /*
     * Flattens the current selection and interprets the response for display.
     */
    pub fn generate(&self) -> Result<DisplayModel> {
        let selection = self.current_selection();
        let request = flatten_contract::build_request(&selection);
        log::debug!("TreeSession: Generating from {} selected path(s).", selection.len());
        let response = self
            .flattener
            .flatten(&request)
            .map_err(ServiceError::flatten)?;
        Ok(flatten_contract::interpret_response(&response))
    }
}
