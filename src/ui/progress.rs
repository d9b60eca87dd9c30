/// Console event sink
///
/// Renders the runner's event stream: a spinner while an attempt runs,
/// one line per failure/remediation/retry, and a styled terminal line for
/// the outcome. Quiet mode drops everything except the terminal outcome.
use crate::recovery::events::{EventSink, RecoveryEvent};
use crate::recovery::remediation::RemediationResult;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

pub struct ConsoleReporter {
    spinner: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        if !cfg!(feature = "color-output") {
            console::set_colors_enabled(false);
        }
        Self {
            spinner: Mutex::new(None),
            quiet,
        }
    }

    fn spinner_start(&self, message: String) {
        if self.quiet || !cfg!(feature = "progress-bars") {
            return;
        }
        let mut slot = self.spinner.lock().unwrap();
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_message(message);
    }

    fn spinner_clear(&self) {
        if let Some(bar) = self.spinner.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }

    fn line(&self, message: String) {
        if self.quiet {
            return;
        }
        self.with_spinner_suspended(|| eprintln!("{message}"));
    }

    fn outcome(&self, message: String) {
        self.spinner_clear();
        eprintln!("{message}");
    }

    fn with_spinner_suspended<F: FnOnce()>(&self, f: F) {
        let slot = self.spinner.lock().unwrap();
        match slot.as_ref() {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}

impl EventSink for ConsoleReporter {
    fn emit(&self, event: &RecoveryEvent) {
        match event {
            RecoveryEvent::RunStarted {
                operation,
                max_attempts,
                ..
            } => {
                self.line(format!(
                    "{} {} (up to {} attempts)",
                    style("::").cyan().bold(),
                    operation,
                    max_attempts
                ));
            }

            RecoveryEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                self.spinner_start(format!("attempt {attempt}/{max_attempts}"));
            }

            RecoveryEvent::AttemptFailed {
                attempt,
                class,
                message,
            } => {
                self.line(format!(
                    "{} attempt {} failed [{}]: {}",
                    style("!").yellow().bold(),
                    attempt,
                    class,
                    message
                ));
            }

            RecoveryEvent::EnvironmentNormalized { record } => {
                self.line(format!(
                    "{} degraded host detected, {}",
                    style("~").yellow(),
                    record.action.description()
                ));
            }

            RecoveryEvent::RemediationApplied { record, .. } => {
                let verdict = match record.result {
                    RemediationResult::Succeeded => style("ok").green().to_string(),
                    RemediationResult::Failed => style("failed").red().to_string(),
                    RemediationResult::NotApplicable => style("n/a").dim().to_string(),
                };
                self.line(format!(
                    "  remediation: {} ... {}",
                    record.action.description(),
                    verdict
                ));
            }

            RecoveryEvent::RetryScheduled {
                next_attempt,
                delay,
            } => {
                self.line(format!(
                    "  retrying (attempt {}) in {}",
                    next_attempt,
                    humantime::format_duration(*delay)
                ));
            }

            RecoveryEvent::Succeeded { attempts } => {
                self.spinner_clear();
                if *attempts > 1 && !self.quiet {
                    eprintln!(
                        "{} recovered after {} attempts",
                        style("✓").green().bold(),
                        attempts
                    );
                }
            }

            RecoveryEvent::Exhausted {
                attempts, message, ..
            } => {
                self.outcome(format!(
                    "{} failed after {} attempt(s): {}",
                    style("✗").red().bold(),
                    attempts,
                    message
                ));
            }

            RecoveryEvent::Cancelled { .. } => {
                self.outcome(format!("{} cancelled", style("✗").yellow().bold()));
            }

            RecoveryEvent::StorageDowngraded { reason } => {
                self.spinner_clear();
                eprintln!(
                    "{} primary store unavailable ({reason}); continuing with the fallback store",
                    style("!").yellow().bold()
                );
            }

            RecoveryEvent::StorageSelected {
                backend,
                downgraded,
            } => {
                let note = if *downgraded { " (downgraded)" } else { "" };
                self.line(format!(
                    "{} storage backend: {}{}",
                    style("::").cyan().bold(),
                    backend,
                    note
                ));
            }
        }
    }
}
