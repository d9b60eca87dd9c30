/// Persistent state storage
///
/// Two backends with one contract: the primary store is a native,
/// file-backed SQLite database; the fallback is a plain JSON file with
/// strictly weaker preconditions (no native engine to load). Selection
/// happens once per process through `StorageSelector`; a downgrade to the
/// fallback is recorded on the handle and never silently reversed.
pub mod fallback;
pub mod primary;
pub mod selector;

// Re-export main types for convenience
pub use fallback::{JsonBackend, JsonFileStore};
pub use primary::{SqliteBackend, SqliteStore};
pub use selector::{SelectError, SelectOptions, StorageSelector, StoreLayout};

use crate::SetupResult;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreKind {
    Primary,
    Fallback,
}

impl StoreKind {
    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreKind::Primary => "sqlite",
            StoreKind::Fallback => "json-file",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.backend_name())
    }
}

/// Uniform read/write contract both backends satisfy
pub trait StateStore: Send {
    fn kind(&self) -> StoreKind;

    fn get(&self, key: &str) -> SetupResult<Option<String>>;

    fn put(&mut self, key: &str, value: &str) -> SetupResult<()>;

    fn remove(&mut self, key: &str) -> SetupResult<()>;

    fn keys(&self) -> SetupResult<Vec<String>>;

    fn flush(&mut self) -> SetupResult<()>;
}

/// Handle to whichever backend the selector chose
///
/// Owned by the process for its lifetime; replaced, not mutated, when a
/// downgrade occurs.
pub struct StorageHandle {
    kind: StoreKind,
    downgraded: bool,
    store: Box<dyn StateStore>,
}

impl StorageHandle {
    pub fn primary(store: Box<dyn StateStore>) -> Self {
        Self {
            kind: StoreKind::Primary,
            downgraded: false,
            store,
        }
    }

    /// `downgraded` is true when the primary was abandoned, false when
    /// the caller asked for the fallback outright
    pub fn fallback(store: Box<dyn StateStore>, downgraded: bool) -> Self {
        Self {
            kind: StoreKind::Fallback,
            downgraded,
            store,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn was_downgraded(&self) -> bool {
        self.downgraded
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn StateStore {
        self.store.as_mut()
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("kind", &self.kind)
            .field("downgraded", &self.downgraded)
            .finish()
    }
}
