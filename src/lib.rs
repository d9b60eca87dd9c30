// Allow complex types where needed for injectable observers and remediation hooks
#![allow(clippy::type_complexity)]

pub mod cache;
pub mod capability;
pub mod config;
pub mod env_probe;
pub mod install;
pub mod logging;
pub mod recovery;
pub mod store;
pub mod ui;

// Re-export the main entry points for convenience
pub use recovery::{RecoveryError, RecoveryRunner, RunOptions};
pub use store::{StorageHandle, StorageSelector, StoreKind};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Shared cancellation flag for a running initialization.
///
/// The CLI trips this from its signal handler; the runner polls it during
/// inter-attempt delays. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation (called by signal handler)
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reset the flag (primarily for testing)
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// Error types raised by guarded setup operations
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Module install failed: {0}")]
    InstallFailed(String),

    #[error("Native module failed to load: {0}")]
    NativeModuleLoad(String),

    #[error("Store open failed: {0}")]
    StoreOpen(String),

    #[error("Store operation failed: {0}")]
    StoreIo(String),

    #[error("Installer cache corrupted: {0}")]
    CacheCorrupted(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

// Manual Clone implementation because std::io::Error doesn't implement Clone
impl Clone for SetupError {
    fn clone(&self) -> Self {
        match self {
            SetupError::IoError(e) => {
                SetupError::IoError(std::io::Error::new(e.kind(), e.to_string()))
            }
            SetupError::InstallFailed(s) => SetupError::InstallFailed(s.clone()),
            SetupError::NativeModuleLoad(s) => SetupError::NativeModuleLoad(s.clone()),
            SetupError::StoreOpen(s) => SetupError::StoreOpen(s.clone()),
            SetupError::StoreIo(s) => SetupError::StoreIo(s.clone()),
            SetupError::CacheCorrupted(s) => SetupError::CacheCorrupted(s.clone()),
            SetupError::Timeout(s) => SetupError::Timeout(s.clone()),
            SetupError::Config(s) => SetupError::Config(s.clone()),
            SetupError::Unsupported(s) => SetupError::Unsupported(s.clone()),
        }
    }
}

pub type SetupResult<T> = Result<T, SetupError>;

#[cfg(test)]
mod lib_tests;
