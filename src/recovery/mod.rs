/// Error recovery for fallible initialization
///
/// This module wraps a fallible, possibly side-effecting setup operation with
/// classification-driven remediation and bounded retry:
/// - Error classification against a closed set of failure classes
/// - Remediation actions (cache cleanup, permission normalization) between attempts
/// - Doubling backoff with a configurable base delay and optional jitter
/// - Cancellable inter-attempt delays
/// - A structured event stream the caller renders however it likes
///
/// # Architecture
///
/// ```text
/// ┌─────────────────────────────────────────┐
/// │        Recovery Runner (orchestration)   │
/// └────────────────┬────────────────────────┘
///                  │
///      ┌───────────┼───────────┐
///      ↓           ↓           ↓
/// ┌──────────┐ ┌─────────┐ ┌──────────┐
/// │Classifier│ │ Backoff │ │Remediator│
/// └──────────┘ └─────────┘ └──────────┘
///                  │
///                  ↓
///          ┌──────────────┐
///          │  Event sink   │ (caller-owned rendering)
///          └──────────────┘
/// ```
///
/// # Usage Example
///
/// ```rust,ignore
/// use initguard::recovery::{RecoveryRunner, RunOptions};
///
/// let runner = RecoveryRunner::from_config(&config, probe.as_ref());
///
/// let value = runner.run(
///     "install-modules",
///     || installer.ensure_modules(),
///     RunOptions::new().with_max_attempts(3),
/// )?;
/// # Ok::<(), initguard::recovery::RecoveryError>(())
/// ```
pub mod backoff;
pub mod classification;
pub mod events;
pub mod remediation;
pub mod runner;

// Re-export main types for convenience
pub use backoff::Backoff;
pub use classification::{ClassifiedError, ErrorClass, ErrorClassifier, ErrorContext};
pub use events::{EventSink, MemorySink, NullSink, RecoveryEvent};
pub use remediation::{RemediationAction, RemediationRecord, RemediationResult, Remediator};
pub use runner::{RecoveryError, RecoveryRunner, RunOptions};
