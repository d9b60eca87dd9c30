/// Recovery runner - wraps a fallible setup operation with
/// classification-driven remediation and bounded, doubling backoff
///
/// Attempts run strictly sequentially; each one may depend on filesystem
/// state the previous remediation repaired. The only suspension point is
/// the inter-attempt delay, which polls the cancel token so a user
/// interrupt aborts without starting a further attempt.
use super::backoff::Backoff;
use super::classification::{ClassifiedError, ErrorClass, ErrorClassifier, ErrorContext};
use super::events::{EventSink, NullSink, RecoveryEvent};
use super::remediation::{RemediationAction, RemediationRecord, Remediator};
use crate::cache::CacheCleaner;
use crate::config::InitConfig;
use crate::env_probe::EnvironmentProbe;
use crate::{CancelToken, SetupError, SetupResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default number of attempts for a guarded operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Attempts used by the more aggressive force mode
pub const FORCE_MAX_ATTEMPTS: u32 = 5;

/// Observer invoked before each retry
pub type RetryObserver = Box<dyn FnMut(u32, &ClassifiedError) + Send>;

/// Caller-supplied remediation closure
pub type CleanupFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Per-call configuration for `RecoveryRunner::run`
pub struct RunOptions {
    /// Total attempts, including the first (>= 1)
    pub max_attempts: u32,

    /// Backoff schedule between attempts
    pub backoff: Backoff,

    /// Invoked before each retry; panics are swallowed and logged
    pub on_retry: Option<RetryObserver>,

    /// Extra remediation run once per retry, before the delay, only when
    /// the classification is remediable; failures tolerated
    pub cleanup: Option<CleanupFn>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            on_retry: None,
            cleanup: None,
        }
    }

    /// Preset for the documented force mode
    pub fn force() -> Self {
        Self::new().with_max_attempts(FORCE_MAX_ATTEMPTS)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Shorthand keeping the default doubling schedule and cap
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.backoff = Backoff::new(initial_delay, super::backoff::DEFAULT_MAX_DELAY);
        self
    }

    pub fn with_on_retry<F>(mut self, observer: F) -> Self
    where
        F: FnMut(u32, &ClassifiedError) + Send + 'static,
    {
        self.on_retry = Some(Box::new(observer));
        self
    }

    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal failure of a guarded run
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// All attempts failed; carries the last classification and the
    /// ordered remediation ledger for diagnostics
    #[error("operation failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        class: ErrorClass,
        remediations: Vec<RemediationRecord>,
        #[source]
        source: SetupError,
    },

    /// Cancelled during an inter-attempt delay; never conflated with
    /// exhaustion
    #[error("operation cancelled after {attempts_completed} attempt(s)")]
    Cancelled { attempts_completed: u32 },
}

impl RecoveryError {
    pub fn classification(&self) -> Option<ErrorClass> {
        match self {
            RecoveryError::Exhausted { class, .. } => Some(*class),
            RecoveryError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RecoveryError::Cancelled { .. })
    }

    /// Whether the caller should switch to the fallback store: any
    /// exhaustion qualifies, cancellation never does
    pub fn signals_downgrade(&self) -> bool {
        matches!(self, RecoveryError::Exhausted { .. })
    }
}

/// Recovery runner - main orchestration
pub struct RecoveryRunner {
    classifier: ErrorClassifier,
    remediator: Remediator,
    sink: Arc<dyn EventSink>,
    cancel: CancelToken,
}

impl RecoveryRunner {
    pub fn new(classifier: ErrorClassifier, remediator: Remediator) -> Self {
        Self {
            classifier,
            remediator,
            sink: Arc::new(NullSink),
            cancel: CancelToken::new(),
        }
    }

    /// Wire classifier and remediator from explicit configuration plus a
    /// host probe
    pub fn from_config(config: &InitConfig, probe: &dyn EnvironmentProbe) -> Self {
        let classifier =
            ErrorClassifier::new(config.native_packages.clone()).with_environment(probe);
        let remediator = Remediator::new(
            CacheCleaner::new(&config.cache_root),
            config.native_packages.clone(),
        )
        .with_environment(probe);
        Self::new(classifier, remediator)
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Emit an event through the configured sink (also used by the
    /// storage selector for downgrade reporting)
    pub fn emit(&self, event: RecoveryEvent) {
        self.sink.emit(&event);
    }

    /// Execute `operation` with classification, remediation, and bounded
    /// retry. Returns the operation's value, or one fully-described
    /// terminal failure. Never invents a synthetic success.
    pub fn run<T, F>(
        &self,
        operation_name: &str,
        mut operation: F,
        mut options: RunOptions,
    ) -> Result<T, RecoveryError>
    where
        F: FnMut() -> SetupResult<T>,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let max_attempts = options.max_attempts.max(1);
        let mut remediations: Vec<RemediationRecord> = Vec::new();

        self.emit(RecoveryEvent::RunStarted {
            run_id: run_id.clone(),
            operation: operation_name.to_string(),
            max_attempts,
        });

        // Degraded hosts get one proactive permission fix, before the
        // first attempt and never again on retries
        if self.remediator.host_is_degraded() {
            let record = self.remediator.normalize_environment();
            self.emit(RecoveryEvent::EnvironmentNormalized {
                record: record.clone(),
            });
            remediations.push(record);
        }

        let mut attempt: u32 = 1;
        loop {
            if self.cancel.is_cancelled() {
                let attempts_completed = attempt - 1;
                self.emit(RecoveryEvent::Cancelled { attempts_completed });
                return Err(RecoveryError::Cancelled { attempts_completed });
            }

            self.emit(RecoveryEvent::AttemptStarted {
                attempt,
                max_attempts,
            });
            tracing::debug!(
                run_id = %run_id,
                operation = operation_name,
                attempt = attempt,
                max_attempts = max_attempts,
                "starting attempt"
            );

            let error = match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt = attempt,
                            "operation succeeded after retry"
                        );
                    }
                    self.emit(RecoveryEvent::Succeeded { attempts: attempt });
                    return Ok(value);
                }
                Err(error) => error,
            };

            let classified =
                self.classifier
                    .classify(error, ErrorContext::new(operation_name), attempt);

            tracing::warn!(
                operation = operation_name,
                attempt = attempt,
                class = %classified.class,
                error = %classified.original,
                "attempt failed"
            );
            self.emit(RecoveryEvent::AttemptFailed {
                attempt,
                class: classified.class,
                message: classified.original.to_string(),
            });

            if attempt >= max_attempts {
                self.emit(RecoveryEvent::Exhausted {
                    attempts: attempt,
                    class: classified.class,
                    message: classified.original.to_string(),
                });
                return Err(RecoveryError::Exhausted {
                    attempts: attempt,
                    class: classified.class,
                    remediations,
                    source: classified.original,
                });
            }

            if classified.class.is_remediable() {
                for action in self
                    .remediator
                    .plan(classified.class, &classified.original)
                {
                    let record = self.remediator.apply(&action);
                    self.emit(RecoveryEvent::RemediationApplied {
                        attempt,
                        record: record.clone(),
                    });
                    remediations.push(record);
                }

                if let Some(cleanup) = options.cleanup.as_mut() {
                    let record = match cleanup() {
                        Ok(()) => RemediationRecord::succeeded(RemediationAction::CustomCleanup),
                        Err(e) => {
                            tracing::warn!(
                                operation = operation_name,
                                error = %e,
                                "caller cleanup failed; retry continues"
                            );
                            RemediationRecord::failed(
                                RemediationAction::CustomCleanup,
                                e.to_string(),
                            )
                        }
                    };
                    self.emit(RecoveryEvent::RemediationApplied {
                        attempt,
                        record: record.clone(),
                    });
                    remediations.push(record);
                }
            }

            // Observer must not take the loop down with it
            if let Some(observer) = options.on_retry.as_mut() {
                let outcome = catch_unwind(AssertUnwindSafe(|| observer(attempt, &classified)));
                if outcome.is_err() {
                    tracing::warn!(
                        operation = operation_name,
                        attempt = attempt,
                        "retry observer panicked; continuing"
                    );
                }
            }

            let delay = options.backoff.delay_before(attempt + 1);
            self.emit(RecoveryEvent::RetryScheduled {
                next_attempt: attempt + 1,
                delay,
            });
            tracing::info!(
                operation = operation_name,
                next_attempt = attempt + 1,
                delay = %humantime::format_duration(delay),
                "retrying after delay"
            );

            if !self.sleep_cancellable(delay) {
                self.emit(RecoveryEvent::Cancelled {
                    attempts_completed: attempt,
                });
                return Err(RecoveryError::Cancelled {
                    attempts_completed: attempt,
                });
            }

            attempt += 1;
        }
    }

    /// Sleep for `delay`, polling the cancel token in short slices.
    /// Returns false when cancelled.
    fn sleep_cancellable(&self, delay: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(25);

        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env_probe::StaticProbe;
    use crate::recovery::events::MemorySink;
    use crate::recovery::remediation::RemediationResult;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn test_runner(cache_root: &std::path::Path, degraded: bool) -> (RecoveryRunner, Arc<MemorySink>) {
        let probe = StaticProbe::new(degraded, false);
        let classifier =
            ErrorClassifier::new(vec!["sqlite3".to_string()]).with_environment(&probe);
        let remediator = Remediator::new(
            CacheCleaner::new(cache_root),
            vec!["sqlite3".to_string()],
        )
        .with_environment(&probe);
        let sink = Arc::new(MemorySink::new());
        let runner = RecoveryRunner::new(classifier, remediator)
            .with_event_sink(sink.clone() as Arc<dyn EventSink>);
        (runner, sink)
    }

    fn fast_options() -> RunOptions {
        RunOptions::new().with_initial_delay(Duration::from_millis(2))
    }

    #[test]
    fn success_on_first_attempt_invokes_once() {
        let tmp = TempDir::new().unwrap();
        let (runner, sink) = test_runner(tmp.path(), false);
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SetupError>(42)
            },
            fast_options(),
        );

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.count(|e| matches!(e, RecoveryEvent::AttemptStarted { .. })),
            1
        );
    }

    #[test]
    fn exhaustion_preserves_attempt_count_and_class() {
        let tmp = TempDir::new().unwrap();
        let (runner, _sink) = test_runner(tmp.path(), false);
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || -> SetupResult<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SetupError::Timeout("lock wait timed out".into()))
            },
            fast_options(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            RecoveryError::Exhausted {
                attempts,
                class,
                remediations,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(class, ErrorClass::Unclassified);
                assert!(remediations.is_empty());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn pre_cancelled_token_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let (runner, _sink) = test_runner(tmp.path(), false);
        runner.cancel_token().cancel();
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, SetupError>(())
            },
            fast_options(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match result.unwrap_err() {
            RecoveryError::Cancelled { attempts_completed } => {
                assert_eq!(attempts_completed, 0)
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[test]
    fn observer_panic_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let (runner, _sink) = test_runner(tmp.path(), false);
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(SetupError::Timeout("once".into()))
                } else {
                    Ok(7)
                }
            },
            fast_options().with_on_retry(|_, _| panic!("observer bug")),
        );

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleanup_failure_does_not_change_outcome() {
        let tmp = TempDir::new().unwrap();
        let (runner, sink) = test_runner(tmp.path(), false);
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(SetupError::InstallFailed("ENOTEMPTY: not empty".into()))
                } else {
                    Ok(())
                }
            },
            fast_options().with_cleanup(|| anyhow::bail!("cleanup exploded")),
        );

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Both built-in and caller cleanup records were emitted on each retry
        let failed_cleanups = sink.count(|e| {
            matches!(
                e,
                RecoveryEvent::RemediationApplied {
                    record: RemediationRecord {
                        action: RemediationAction::CustomCleanup,
                        result: RemediationResult::Failed,
                        ..
                    },
                    ..
                }
            )
        });
        assert_eq!(failed_cleanups, 2);
    }

    #[test]
    fn environment_normalization_runs_once_per_run() {
        let tmp = TempDir::new().unwrap();
        let (runner, sink) = test_runner(tmp.path(), true);
        let calls = AtomicU32::new(0);

        let _ = runner.run(
            "op",
            || -> SetupResult<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SetupError::Timeout("slow".into()))
            },
            fast_options(),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sink.count(|e| matches!(e, RecoveryEvent::EnvironmentNormalized { .. })),
            1
        );
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let tmp = TempDir::new().unwrap();
        let (runner, _sink) = test_runner(tmp.path(), false);
        let calls = AtomicU32::new(0);

        let result = runner.run(
            "op",
            || -> SetupResult<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SetupError::Timeout("slow".into()))
            },
            RunOptions::new().with_max_attempts(0),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result.unwrap_err(),
            RecoveryError::Exhausted { attempts: 1, .. }
        ));
    }
}
