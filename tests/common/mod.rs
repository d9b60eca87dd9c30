#![allow(dead_code)]

/// Shared helpers for integration tests: runner construction with a
/// recording sink, scripted failing operations, and canned errors
use initguard::cache::CacheCleaner;
use initguard::env_probe::StaticProbe;
use initguard::recovery::{
    ErrorClassifier, EventSink, MemorySink, RecoveryRunner, Remediator, RunOptions,
};
use initguard::{SetupError, SetupResult};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const NATIVE_PACKAGE: &str = "sqlite3";

/// Runner wired to a temp cache root and an in-memory event sink
pub fn test_runner(cache_root: &Path, degraded: bool) -> (RecoveryRunner, Arc<MemorySink>) {
    let probe = StaticProbe::new(degraded, false);
    let classifier =
        ErrorClassifier::new(vec![NATIVE_PACKAGE.to_string()]).with_environment(&probe);
    let remediator = Remediator::new(
        CacheCleaner::new(cache_root),
        vec![NATIVE_PACKAGE.to_string()],
    )
    .with_environment(&probe);

    let sink = Arc::new(MemorySink::new());
    let runner = RecoveryRunner::new(classifier, remediator)
        .with_event_sink(sink.clone() as Arc<dyn EventSink>);
    (runner, sink)
}

/// Options with a short delay so retry tests stay fast
pub fn fast_options() -> RunOptions {
    RunOptions::new().with_initial_delay(Duration::from_millis(5))
}

/// Operation failing `failures` times before returning `value`, with an
/// invocation counter
pub fn scripted_operation<T: Clone>(
    failures: u32,
    error: SetupError,
    value: T,
) -> (impl FnMut() -> SetupResult<T>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(error.clone())
        } else {
            Ok(value.clone())
        }
    };
    (op, calls)
}

pub fn dir_not_empty_error() -> SetupError {
    SetupError::InstallFailed("ENOTEMPTY: directory not empty, rmdir 'sqlite3-5.1.7'".into())
}

pub fn native_load_error() -> SetupError {
    SetupError::StoreOpen("libsqlite3.so: cannot open shared object file".into())
}

pub fn unclassified_error() -> SetupError {
    SetupError::Timeout("lock wait timed out".into())
}
