//! Session state for the article adapter.
//!
//! This module provides:
//! * [`AppState`] / [`reduce`] / [`Action`]: the state value and its pure
//!   transitions.
//! * [`reconcile`] keeps one translation per prompt config.
//! * [`encode_snapshot`] / [`decode_snapshot`]: the versioned snapshot codec.
//! * [`SnapshotStorage`] with [`FileStorage`] and [`MemoryStorage`].
//! * [`Store`] / [`SharedStore`]: the single owner of the state, with
//!   persistence, the login gate and generation tickets.
//!
//! # Quick start
//!
//! ```rust
//! use article_adapter::store::{MemoryStorage, PromptConfig, Store, StoreOptions};
//!
//! let mut store = Store::open(Box::new(MemoryStorage::new()), StoreOptions::default());
//! store.add_text_config(PromptConfig::new("x", "X", "Rewrite for kids."));
//! assert!(store.state().translation("x").is_some());
//! ```

pub mod container;
pub mod model;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod ticket;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use container::{lock_store, new_shared_store, SharedStore, Store, StoreOptions, STORAGE_KEY};
pub use model::{
    AppImage, Article, GenerationKind, InProgress, PromptConfig, PromptSetting, Translation,
    VoiceSettings, VoiceSettingsPatch,
};
pub use snapshot::{decode_project, decode_snapshot, encode_snapshot, SnapshotError};
pub use state::{reconcile, reduce, Action, AppState, ProjectPatch};
pub use storage::{FileStorage, MemoryStorage, SnapshotStorage, StorageError};
pub use ticket::{TaskTarget, Ticket};
