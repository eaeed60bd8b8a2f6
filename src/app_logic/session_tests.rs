use super::session::*;

use crate::core::directory_listing::{
    self, DirectoryListingOperations, ListedChildren, ListedNode, ListedNodeData, ListedNodeType,
    ListingError,
};
use crate::core::flatten_contract::{FlattenRequest, FlattenResponse, TokenStatus};
use crate::core::flattener::{self, FlattenOperations};
use crate::core::presets::{
    self, DeletedPreset, PresetEntry, PresetError, PresetScope, PresetStoreOperations, SavedPreset,
};
use crate::core::service_error::ServiceKind;
use crate::core::exclusion::ExclusionResolver;
use crate::core::tree_node::{ExclusionInfo, LoadState, SelectionState};
use crate::core::tree_store::StoreError;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/*
 * Unit tests for `TreeSession`. The listing, preset and flatten services are
 * replaced by mocks that record their calls, so each test controls exactly
 * what the session sees.
 */

// --- Mock Structures (Lister, PresetStore, Flattener) ---
struct MockLister {
    listings: Mutex<HashMap<PathBuf, ListedNode>>,
    failing: Mutex<HashSet<PathBuf>>,
    list_calls: Mutex<Vec<PathBuf>>,
}

impl MockLister {
    fn new() -> Self {
        MockLister {
            listings: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            list_calls: Mutex::new(Vec::new()),
        }
    }

    fn set_listing(&self, node: ListedNode) {
        self.listings
            .lock()
            .unwrap()
            .insert(PathBuf::from(&node.id), node);
    }

    fn set_failing(&self, path: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(PathBuf::from(path));
        } else {
            set.remove(Path::new(path));
        }
    }

    fn get_list_calls(&self) -> Vec<PathBuf> {
        self.list_calls.lock().unwrap().clone()
    }
}

impl DirectoryListingOperations for MockLister {
    fn list(&self, path: &Path) -> directory_listing::Result<ListedNode> {
        self.list_calls.lock().unwrap().push(path.to_path_buf());
        if self.failing.lock().unwrap().contains(path) {
            return Err(ListingError::Malformed("mock listing failure".to_string()));
        }
        self.listings
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ListingError::NotFound(path.to_path_buf()))
    }
}

struct MockPresetStore {
    presets: Mutex<HashMap<String, Vec<PathBuf>>>,
    save_calls: Mutex<Vec<(String, Vec<PathBuf>)>>,
}

impl MockPresetStore {
    fn new() -> Self {
        MockPresetStore {
            presets: Mutex::new(HashMap::new()),
            save_calls: Mutex::new(Vec::new()),
        }
    }

    fn set_preset(&self, id: &str, paths: Vec<PathBuf>) {
        self.presets.lock().unwrap().insert(id.to_string(), paths);
    }

    fn get_save_calls(&self) -> Vec<(String, Vec<PathBuf>)> {
        self.save_calls.lock().unwrap().clone()
    }
}

impl PresetStoreOperations for MockPresetStore {
    fn list(&self) -> presets::Result<Vec<PresetEntry>> {
        let mut ids: Vec<String> = self.presets.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| {
                let (scope, name) = id.split_once('/').unwrap_or(("user", id.as_str()));
                PresetEntry {
                    id: id.clone(),
                    name: name.to_string(),
                    scope: if scope == "default" {
                        PresetScope::Default
                    } else {
                        PresetScope::User
                    },
                }
            })
            .collect())
    }

    fn save(&self, name: &str, paths: &[PathBuf]) -> presets::Result<SavedPreset> {
        self.save_calls
            .lock()
            .unwrap()
            .push((name.to_string(), paths.to_vec()));
        let id = format!("user/{name}");
        self.presets.lock().unwrap().insert(id.clone(), paths.to_vec());
        Ok(SavedPreset {
            saved: true,
            id,
            name: name.to_string(),
        })
    }

    fn load(&self, id: &str) -> presets::Result<Vec<PathBuf>> {
        self.presets
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| PresetError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> presets::Result<DeletedPreset> {
        if id.starts_with("default/") {
            return Err(PresetError::ReadOnly(id.to_string()));
        }
        match self.presets.lock().unwrap().remove(id) {
            Some(_) => Ok(DeletedPreset { deleted: true }),
            None => Err(PresetError::NotFound(id.to_string())),
        }
    }
}

struct MockFlattener {
    requests: Mutex<Vec<FlattenRequest>>,
    response: Mutex<FlattenResponse>,
}

impl MockFlattener {
    fn new() -> Self {
        MockFlattener {
            requests: Mutex::new(Vec::new()),
            response: Mutex::new(FlattenResponse {
                text: Some("flattened".to_string()),
                token_count: 10,
                model_percentages: Vec::new(),
                error: None,
            }),
        }
    }

    fn set_response(&self, response: FlattenResponse) {
        *self.response.lock().unwrap() = response;
    }

    fn get_requests(&self) -> Vec<FlattenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl FlattenOperations for MockFlattener {
    fn flatten(&self, request: &FlattenRequest) -> flattener::Result<FlattenResponse> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.response.lock().unwrap().clone())
    }
}
// --- End Mock Structures ---

fn p(path: &str) -> PathBuf {
    PathBuf::from(path)
}

fn listed(path: &str, node_type: ListedNodeType, children: ListedChildren) -> ListedNode {
    ListedNode {
        id: path.to_string(),
        text: Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        node_type,
        children,
        data: ListedNodeData::default(),
    }
}

fn file(path: &str) -> ListedNode {
    listed(path, ListedNodeType::File, ListedChildren::Flag(false))
}

fn folder_stub(path: &str) -> ListedNode {
    listed(path, ListedNodeType::Folder, ListedChildren::Flag(true))
}

fn folder(path: &str, children: Vec<ListedNode>) -> ListedNode {
    listed(path, ListedNodeType::Folder, ListedChildren::Nodes(children))
}

fn excluded(mut node: ListedNode, rule_type: &str, rule: &str) -> ListedNode {
    node.data.excluded_info = Some(ExclusionInfo::new(rule_type, rule));
    node
}

fn setup_session() -> (
    TreeSession,
    Arc<MockLister>,
    Arc<MockPresetStore>,
    Arc<MockFlattener>,
) {
    crate::initialize_logging();
    let lister = Arc::new(MockLister::new());
    let preset_store = Arc::new(MockPresetStore::new());
    let flattener = Arc::new(MockFlattener::new());
    let session = TreeSession::new(lister.clone(), preset_store.clone(), flattener.clone());
    (session, lister, preset_store, flattener)
}

fn state_of(session: &TreeSession, path: &str) -> SelectionState {
    session
        .store()
        .and_then(|s| s.get_node(Path::new(path)))
        .map(|n| n.state)
        .expect("node should exist")
}

fn load_state_of(session: &TreeSession, path: &str) -> LoadState {
    session
        .store()
        .and_then(|s| s.get_node(Path::new(path)))
        .map(|n| n.load_state)
        .expect("node should exist")
}

#[test]
fn test_operations_without_tree_fail_with_no_tree() {
    let (mut session, _lister, _presets, _flattener) = setup_session();
    assert!(matches!(
        session.set_checked(Path::new("/proj"), true),
        Err(SessionError::NoTree)
    ));
    assert!(session.current_selection().is_empty());
    assert_eq!(session.generation(), 0);
}

#[test]
fn test_checking_root_skips_excluded_subtree() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder(
        "/proj",
        vec![
            excluded(folder_stub("/proj/b"), "Directory Pattern", "binary"),
            file("/proj/a.txt"),
        ],
    ));
    lister.set_listing(folder("/proj/b", vec![file("/proj/b/c.txt")]));

    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.expand(Path::new("/proj/b")).unwrap();
    let report = session.set_checked(Path::new("/proj"), true).unwrap();

    assert!(report.violations.is_empty());
    assert_eq!(state_of(&session, "/proj/a.txt"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj/b"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj/b/c.txt"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj"), SelectionState::Indeterminate);

    let store = session.store().unwrap();
    let resolver = ExclusionResolver::new(store);
    assert!(!resolver.is_checkbox_enabled(Path::new("/proj/b")));
    assert!(!resolver.is_checkbox_enabled(Path::new("/proj/b/c.txt")));
    assert_eq!(session.current_selection(), vec![p("/proj/a.txt")]);
}

#[test]
fn test_checking_locked_node_reports_violation() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder(
        "/proj",
        vec![excluded(file("/proj/.env"), "File Name", ".env")],
    ));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    let report = session.set_checked(Path::new("/proj/.env"), true).unwrap();

    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].blocked_by, p("/proj/.env"));
    assert_eq!(state_of(&session, "/proj/.env"), SelectionState::Unchecked);
}

#[test]
fn test_preset_saved_then_loaded_after_file_vanished() {
    let (mut session, lister, presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt"), file("/proj/z.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/a.txt"), true).unwrap();

    let saved = session.save_preset("demo").unwrap();
    assert_eq!(saved.id, "user/demo");
    assert_eq!(
        presets.get_save_calls(),
        vec![("demo".to_string(), vec![p("/proj/a.txt")])]
    );

    lister.set_listing(folder("/proj", vec![file("/proj/z.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    assert_eq!(session.generation(), 2);

    let report = session.load_preset("user/demo").unwrap();

    assert_eq!(report.absent, vec![p("/proj/a.txt")]);
    assert!(report.applied.is_empty());
    assert!(report.excluded.is_empty());
    assert!(session.current_selection().is_empty());
}

#[test]
fn test_load_preset_reveals_unloaded_ancestors() {
    let (mut session, lister, presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src"), file("/proj/a.txt")]));
    lister.set_listing(folder(
        "/proj/src",
        vec![file("/proj/src/lib.rs"), file("/proj/src/main.rs")],
    ));
    presets.set_preset("user/p", vec![p("/proj/src/main.rs"), p("/elsewhere/x.txt")]);
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/a.txt"), true).unwrap();

    let report = session.load_preset("user/p").unwrap();

    assert!(lister.get_list_calls().contains(&p("/proj/src")));
    assert_eq!(report.applied, vec![p("/proj/src/main.rs")]);
    assert_eq!(report.absent, vec![p("/elsewhere/x.txt")]);
    assert_eq!(state_of(&session, "/proj/a.txt"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj/src/main.rs"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj/src"), SelectionState::Indeterminate);
    assert_eq!(state_of(&session, "/proj"), SelectionState::Indeterminate);
}

#[test]
fn test_apply_selection_loads_ancestors_of_deep_path() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src")]));
    lister.set_listing(folder("/proj/src", vec![folder_stub("/proj/src/bin")]));
    lister.set_listing(folder("/proj/src/bin", vec![file("/proj/src/bin/tool.rs")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    let report = session
        .apply_selection(&[p("/proj/src/bin/tool.rs")])
        .unwrap();

    assert_eq!(report.applied, vec![p("/proj/src/bin/tool.rs")]);

    assert_eq!(state_of(&session, "/proj/src/bin/tool.rs"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj"), SelectionState::Checked);
    assert_eq!(
        session.current_selection(),
        vec![
            p("/proj"),
            p("/proj/src"),
            p("/proj/src/bin"),
            p("/proj/src/bin/tool.rs")
        ]
    );
}

#[test]
fn test_apply_selection_adds_batch_and_reports_rejects() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder(
        "/proj",
        vec![
            folder_stub("/proj/src"),
            excluded(file("/proj/.env"), "File Name", ".env"),
            file("/proj/a.txt"),
        ],
    ));
    lister.set_listing(folder(
        "/proj/src",
        vec![file("/proj/src/lib.rs"), file("/proj/src/main.rs")],
    ));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/a.txt"), true).unwrap();

    let report = session
        .apply_selection(&[
            p("/proj/src/main.rs"),
            p("/proj/.env"),
            p("/proj/gone.txt"),
            p("/proj/src/main.rs"),
        ])
        .unwrap();

    assert_eq!(report.applied, vec![p("/proj/src/main.rs")]);
    assert_eq!(report.excluded, vec![p("/proj/.env")]);
    assert_eq!(report.absent, vec![p("/proj/gone.txt")]);
    assert_eq!(
        report.summary_message().as_deref(),
        Some("2 of 3 items were not selected (1 excluded, 1 not found).")
    );
    assert_eq!(state_of(&session, "/proj/a.txt"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj/.env"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj/src"), SelectionState::Indeterminate);
    assert_eq!(
        session.current_selection(),
        vec![p("/proj/src/main.rs"), p("/proj/a.txt")]
    );
}

#[test]
fn test_apply_selection_of_empty_batch_changes_nothing() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt"), file("/proj/b.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/b.txt"), true).unwrap();

    let report = session.apply_selection(&[]).unwrap();

    assert_eq!(report.total(), 0);
    assert_eq!(session.current_selection(), vec![p("/proj/b.txt")]);
}

#[test]
fn test_failed_preset_load_keeps_selection() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt"), file("/proj/b.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/a.txt"), true).unwrap();

    let result = session.load_preset("user/missing");

    match result {
        Err(SessionError::Service(e)) => assert_eq!(e.service, ServiceKind::Presets),
        other => panic!("expected preset service error, got {other:?}"),
    }
    assert_eq!(session.current_selection(), vec![p("/proj/a.txt")]);
}

#[test]
fn test_delete_default_preset_is_rejected() {
    let (session, _lister, presets, _flattener) = setup_session();
    presets.set_preset("default/default", Vec::new());
    presets.set_preset("user/mine", Vec::new());

    assert!(matches!(
        session.delete_preset("default/default"),
        Err(SessionError::Service(_))
    ));
    assert_eq!(
        session.delete_preset("user/mine").unwrap(),
        DeletedPreset { deleted: true }
    );
    let ids: Vec<String> = session
        .list_presets()
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["default/default".to_string()]);
}

#[test]
fn test_generate_with_failed_tokenization_keeps_text() {
    let (mut session, lister, _presets, flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt")]));
    flattener.set_response(FlattenResponse {
        text: Some("Structure of selected items:\n".to_string()),
        token_count: -1,
        model_percentages: Vec::new(),
        error: None,
    });
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj"), true).unwrap();

    let display = session.generate().unwrap();

    assert_eq!(display.token_status, TokenStatus::TokenizationFailed);
    assert_eq!(display.text, "Structure of selected items:\n");
    assert_eq!(
        flattener.get_requests(),
        vec![FlattenRequest {
            paths: vec![p("/proj"), p("/proj/a.txt")]
        }]
    );
}

#[test]
fn test_stale_fetch_is_discarded_after_rebuild() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src")]));
    lister.set_listing(folder("/proj/src", vec![file("/proj/src/main.rs")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    let ticket = session
        .begin_fetch(Path::new("/proj/src"))
        .unwrap()
        .expect("first fetch should start");
    assert_eq!(ticket.generation, 1);
    session.rebuild_tree(Path::new("/proj")).unwrap();

    let listing = lister.list(Path::new("/proj/src"));
    let outcome = session.complete_fetch(ticket, listing).unwrap();

    assert_eq!(outcome, FetchOutcome::Discarded);
    assert_eq!(load_state_of(&session, "/proj/src"), LoadState::Unloaded);
    assert!(!session.store().unwrap().contains(Path::new("/proj/src/main.rs")));
}

#[test]
fn test_duplicate_fetch_is_coalesced() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src")]));
    lister.set_listing(folder("/proj/src", vec![file("/proj/src/main.rs")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    let ticket = session.begin_fetch(Path::new("/proj/src")).unwrap().unwrap();
    assert_eq!(session.begin_fetch(Path::new("/proj/src")).unwrap(), None);
    assert_eq!(load_state_of(&session, "/proj/src"), LoadState::Loading);
    assert_eq!(
        session.expand(Path::new("/proj/src")).unwrap(),
        FetchOutcome::Coalesced
    );

    let listing = lister.list(Path::new("/proj/src"));
    match session.complete_fetch(ticket, listing).unwrap() {
        FetchOutcome::Applied { summary, .. } => {
            assert_eq!(summary.inserted, vec![p("/proj/src/main.rs")]);
        }
        other => panic!("expected applied outcome, got {other:?}"),
    }
    assert_eq!(load_state_of(&session, "/proj/src"), LoadState::Loaded);
}

#[test]
fn test_failed_fetch_returns_node_to_unloaded() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src")]));
    lister.set_listing(folder("/proj/src", vec![file("/proj/src/main.rs")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    lister.set_failing("/proj/src", true);

    match session.expand(Path::new("/proj/src")) {
        Err(SessionError::Service(e)) => assert_eq!(e.service, ServiceKind::Listing),
        other => panic!("expected listing failure, got {other:?}"),
    }
    assert_eq!(load_state_of(&session, "/proj/src"), LoadState::Unloaded);

    lister.set_failing("/proj/src", false);
    assert!(matches!(
        session.expand(Path::new("/proj/src")).unwrap(),
        FetchOutcome::Applied { .. }
    ));
}

#[test]
fn test_failed_refresh_keeps_loaded_children() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder(
        "/proj",
        vec![folder_stub("/proj/src"), file("/proj/README.md")],
    ));
    lister.set_listing(folder(
        "/proj/src",
        vec![file("/proj/src/a.rs"), file("/proj/src/b.rs")],
    ));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.expand(Path::new("/proj/src")).unwrap();
    session.set_checked(Path::new("/proj/src"), true).unwrap();
    lister.set_failing("/proj/src", true);

    match session.refresh(Path::new("/proj/src")) {
        Err(SessionError::Service(e)) => assert_eq!(e.service, ServiceKind::Listing),
        other => panic!("expected listing failure, got {other:?}"),
    }
    assert_eq!(load_state_of(&session, "/proj/src"), LoadState::Loaded);
    assert_eq!(
        session.store().unwrap().children(Path::new("/proj/src")).unwrap(),
        &[p("/proj/src/a.rs"), p("/proj/src/b.rs")]
    );

    session.set_checked(Path::new("/proj/src/a.rs"), false).unwrap();

    assert_eq!(state_of(&session, "/proj/src"), SelectionState::Indeterminate);
    assert_eq!(session.current_selection(), vec![p("/proj/src/b.rs")]);

    lister.set_failing("/proj/src", false);
    assert!(matches!(
        session.refresh(Path::new("/proj/src")).unwrap(),
        FetchOutcome::Applied { .. }
    ));
    assert_eq!(state_of(&session, "/proj/src/b.rs"), SelectionState::Checked);
}

#[test]
fn test_lazy_children_inherit_checked_parent() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![folder_stub("/proj/src")]));
    lister.set_listing(folder(
        "/proj/src",
        vec![
            excluded(file("/proj/src/debug.log"), "File Pattern", "*.log"),
            file("/proj/src/main.rs"),
        ],
    ));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/src"), true).unwrap();
    assert_eq!(state_of(&session, "/proj"), SelectionState::Checked);

    session.expand(Path::new("/proj/src")).unwrap();

    assert_eq!(state_of(&session, "/proj/src/main.rs"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj/src/debug.log"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj/src"), SelectionState::Indeterminate);
    assert_eq!(state_of(&session, "/proj"), SelectionState::Indeterminate);
}

#[test]
fn test_refresh_applies_new_exclusions() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt"), file("/proj/b.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj"), true).unwrap();
    assert_eq!(state_of(&session, "/proj"), SelectionState::Checked);

    lister.set_listing(folder(
        "/proj",
        vec![
            excluded(file("/proj/a.txt"), "File Name", "a.txt"),
            file("/proj/b.txt"),
        ],
    ));
    session.refresh(Path::new("/proj")).unwrap();

    assert_eq!(state_of(&session, "/proj/a.txt"), SelectionState::Unchecked);
    assert_eq!(state_of(&session, "/proj/b.txt"), SelectionState::Checked);
    assert_eq!(state_of(&session, "/proj"), SelectionState::Indeterminate);
    assert_eq!(session.current_selection(), vec![p("/proj/b.txt")]);
}

#[test]
fn test_failed_rebuild_keeps_previous_tree() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt"), file("/proj/b.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();
    session.set_checked(Path::new("/proj/a.txt"), true).unwrap();

    assert!(session.rebuild_tree(Path::new("/missing")).is_err());

    assert_eq!(session.generation(), 1);
    assert_eq!(session.root_path(), Some(Path::new("/proj")));
    assert_eq!(session.current_selection(), vec![p("/proj/a.txt")]);
}

#[test]
fn test_expand_to_depth_skips_excluded_directories() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder(
        "/proj",
        vec![
            excluded(folder_stub("/proj/node_modules"), "Directory Name", "node_modules"),
            folder_stub("/proj/src"),
        ],
    ));
    lister.set_listing(folder("/proj/src", vec![folder_stub("/proj/src/deep")]));
    lister.set_listing(folder("/proj/src/deep", vec![file("/proj/src/deep/x.rs")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    session.expand_to_depth(2).unwrap();

    let calls = lister.get_list_calls();
    assert_eq!(calls, vec![p("/proj"), p("/proj/src")]);
    assert_eq!(load_state_of(&session, "/proj/src/deep"), LoadState::Unloaded);
    assert_eq!(load_state_of(&session, "/proj/node_modules"), LoadState::Unloaded);
}

#[test]
fn test_unknown_path_is_node_not_found() {
    let (mut session, lister, _presets, _flattener) = setup_session();
    lister.set_listing(folder("/proj", vec![file("/proj/a.txt")]));
    session.rebuild_tree(Path::new("/proj")).unwrap();

    assert!(matches!(
        session.set_checked(Path::new("/proj/nope"), true),
        Err(SessionError::Store(StoreError::NodeNotFound(_)))
    ));
    assert!(matches!(
        session.begin_fetch(Path::new("/proj/nope")),
        Err(SessionError::Store(StoreError::NodeNotFound(_)))
    ));
}
