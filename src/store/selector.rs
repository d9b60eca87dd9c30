/// Storage fallback selection
///
/// One decision per process: open the primary store under the recovery
/// runner; on dependency failure or retry exhaustion, fall back to the
/// JSON store (itself runner-wrapped). Fallback failure is fatal - the
/// selector never returns an empty handle. Cancellation propagates as
/// cancellation, never as a downgrade.
use super::fallback::{JsonBackend, JsonFileStore};
use super::primary::{SqliteBackend, SqliteStore};
use super::{StateStore, StorageHandle};
use crate::capability::{Availability, CapabilityRegistry};
use crate::recovery::events::RecoveryEvent;
use crate::recovery::runner::{RecoveryError, RecoveryRunner, RunOptions};
use crate::SetupResult;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Fallback initialization retries are fixed; only the primary follows
/// the caller's force mode
const FALLBACK_ATTEMPTS: u32 = 3;

/// File layout for both backends under one data directory
#[derive(Debug, Clone)]
pub struct StoreLayout {
    pub primary_db: PathBuf,
    pub fallback_file: PathBuf,
}

impl StoreLayout {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            primary_db: data_dir.join("state.db"),
            fallback_file: data_dir.join("state.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Attempts for primary initialization (3 default, 5 in force mode)
    pub primary_attempts: u32,

    /// Base delay shared by both retry loops
    pub initial_delay: Duration,

    /// Skip the primary outright
    pub fallback_only: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            primary_attempts: crate::recovery::runner::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(1),
            fallback_only: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum SelectError {
    /// User interrupt during either initialization
    #[error("storage selection cancelled")]
    Cancelled(#[source] RecoveryError),

    /// Primary abandoned and the fallback also failed - fatal
    #[error("both storage backends failed; primary: {primary}; fallback: {fallback}")]
    BothFailed {
        primary: Box<RecoveryError>,
        fallback: Box<RecoveryError>,
    },

    /// Fallback failed in fallback-only mode - fatal
    #[error("fallback store failed")]
    FallbackFailed(#[source] Box<RecoveryError>),
}

/// Decides, once per process, which backend the handle is bound to
pub struct StorageSelector<'a> {
    runner: &'a RecoveryRunner,
    layout: StoreLayout,
}

impl<'a> StorageSelector<'a> {
    pub fn new(runner: &'a RecoveryRunner, layout: StoreLayout) -> Self {
        Self { runner, layout }
    }

    /// Probe both backends without initializing either, for diagnostics
    pub fn preflight(&self) -> Vec<(&'static str, Availability)> {
        let mut registry = CapabilityRegistry::new();
        registry.register(Box::new(SqliteBackend));
        let fallback_dir = self
            .layout
            .fallback_file
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();
        registry.register(Box::new(JsonBackend::new(fallback_dir)));
        registry.report()
    }

    /// Select a backend using the real on-disk stores
    pub fn select(&self, options: &SelectOptions) -> Result<StorageHandle, SelectError> {
        let primary_db = self.layout.primary_db.clone();
        let fallback_file = self.layout.fallback_file.clone();

        self.select_with(
            move || SqliteStore::open(&primary_db).map(|s| Box::new(s) as Box<dyn StateStore>),
            move || JsonFileStore::open(&fallback_file).map(|s| Box::new(s) as Box<dyn StateStore>),
            options,
        )
    }

    /// Selection seam over arbitrary backend initializers
    pub fn select_with<P, F>(
        &self,
        primary_init: P,
        fallback_init: F,
        options: &SelectOptions,
    ) -> Result<StorageHandle, SelectError>
    where
        P: FnMut() -> SetupResult<Box<dyn StateStore>>,
        F: FnMut() -> SetupResult<Box<dyn StateStore>>,
    {
        if options.fallback_only {
            tracing::info!("fallback-only storage requested");
            let handle = self
                .open_fallback(fallback_init, options)
                .map_err(|e| match e {
                    RecoveryError::Cancelled { .. } => SelectError::Cancelled(e),
                    RecoveryError::Exhausted { .. } => SelectError::FallbackFailed(Box::new(e)),
                })
                .map(|store| StorageHandle::fallback(store, false))?;
            self.emit_selected(&handle);
            return Ok(handle);
        }

        let primary_result = self.runner.run(
            "open-primary-store",
            primary_init,
            RunOptions::new()
                .with_max_attempts(options.primary_attempts)
                .with_initial_delay(options.initial_delay),
        );

        match primary_result {
            Ok(store) => {
                let handle = StorageHandle::primary(store);
                self.emit_selected(&handle);
                Ok(handle)
            }

            Err(err @ RecoveryError::Cancelled { .. }) => Err(SelectError::Cancelled(err)),

            // Exhaustion on any classification allows the downgrade;
            // DependencyUnavailable is merely the expected one
            Err(primary_err) => {
                tracing::warn!(
                    class = ?primary_err.classification(),
                    "primary store unavailable; trying fallback"
                );

                match self.open_fallback(fallback_init, options) {
                    Ok(store) => {
                        self.runner.emit(RecoveryEvent::StorageDowngraded {
                            reason: downgrade_reason(&primary_err),
                        });
                        let handle = StorageHandle::fallback(store, true);
                        self.emit_selected(&handle);
                        Ok(handle)
                    }
                    Err(err @ RecoveryError::Cancelled { .. }) => {
                        Err(SelectError::Cancelled(err))
                    }
                    Err(fallback_err) => Err(SelectError::BothFailed {
                        primary: Box::new(primary_err),
                        fallback: Box::new(fallback_err),
                    }),
                }
            }
        }
    }

    fn open_fallback<F>(
        &self,
        fallback_init: F,
        options: &SelectOptions,
    ) -> Result<Box<dyn StateStore>, RecoveryError>
    where
        F: FnMut() -> SetupResult<Box<dyn StateStore>>,
    {
        self.runner.run(
            "open-fallback-store",
            fallback_init,
            RunOptions::new()
                .with_max_attempts(FALLBACK_ATTEMPTS)
                .with_initial_delay(options.initial_delay),
        )
    }

    fn emit_selected(&self, handle: &StorageHandle) {
        tracing::info!(
            backend = handle.kind().backend_name(),
            downgraded = handle.was_downgraded(),
            "storage selected"
        );
        self.runner.emit(RecoveryEvent::StorageSelected {
            backend: handle.kind().backend_name().to_string(),
            downgraded: handle.was_downgraded(),
        });
    }
}

fn downgrade_reason(err: &RecoveryError) -> String {
    match err {
        RecoveryError::Exhausted {
            attempts, class, ..
        } => format!("{class} after {attempts} attempt(s)"),
        RecoveryError::Cancelled { .. } => "cancelled".to_string(),
    }
}
