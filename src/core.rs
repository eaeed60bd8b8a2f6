/*
 * This module consolidates the platform-agnostic core: the selection tree
 * model and its engine (store, cascade, exclusion locks, preset
 * reconciliation, flatten contract), plus local implementations of the
 * external services the engine talks to (directory listing, flattening,
 * preset storage, token counting) and configuration.
 */
pub mod config;
pub mod directory_listing;
pub mod exclusion;
pub mod flatten_contract;
pub mod flattener;
pub mod node_state_applicator;
pub mod path_utils;
pub mod preset_reconciler;
pub mod presets;
pub mod service_error;
pub mod tokenizer_utils;
pub mod tree_node;
pub mod tree_store;

// Re-export the tree model and engine
pub use exclusion::ExclusionResolver;
pub use tree_node::{LoadState, NodeKind, SelectionState};
pub use tree_store::TreeNodeStore;

// Re-export the local service implementations
pub use directory_listing::CoreDirectoryLister;
pub use flattener::CoreFlattener;
pub use presets::{CorePresetStore, PresetError, PresetStoreOperations};
pub use tokenizer_utils::create_token_counter;

// Re-export config related items
pub use config::{ConfigError, ConfigManagerOperations, CoreConfigManager};
