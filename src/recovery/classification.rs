/// Error classification for recovery strategy selection
///
/// Each failure observed by the runner is classified into one of four
/// categories that dictate which remediation (if any) applies before the
/// next attempt, and whether the caller should downgrade its storage
/// backend once retries are exhausted.
use crate::env_probe::EnvironmentProbe;
use crate::SetupError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of initialization failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Installer cache corruption - a directory-not-empty failure, or a
    /// known native-module package reported missing after an install
    CacheCorruption,

    /// The host runs in a known-problematic execution mode (compatibility
    /// layer filesystem, cross-filesystem working directory)
    EnvironmentDegraded,

    /// The primary store's native dependency cannot be loaded; signals the
    /// caller to downgrade to the fallback store
    DependencyUnavailable,

    /// Anything else - retried with backoff only
    Unclassified,
}

impl ErrorClass {
    /// Get human-readable description of error class
    pub fn description(&self) -> &'static str {
        match self {
            ErrorClass::CacheCorruption => "Installer cache corrupted",
            ErrorClass::EnvironmentDegraded => "Degraded host environment",
            ErrorClass::DependencyUnavailable => "Native storage dependency unavailable",
            ErrorClass::Unclassified => "Unclassified transient failure",
        }
    }

    /// Check if a remediation action applies between retries
    pub fn is_remediable(&self) -> bool {
        // Environment normalization is applied once up front, not per retry
        matches!(self, ErrorClass::CacheCorruption)
    }

    /// Check if exhaustion under this class should switch the caller to
    /// the fallback store
    pub fn signals_downgrade(&self) -> bool {
        matches!(self, ErrorClass::DependencyUnavailable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::CacheCorruption => write!(f, "CacheCorruption"),
            ErrorClass::EnvironmentDegraded => write!(f, "EnvironmentDegraded"),
            ErrorClass::DependencyUnavailable => write!(f, "DependencyUnavailable"),
            ErrorClass::Unclassified => write!(f, "Unclassified"),
        }
    }
}

/// Context information about where and when a failure occurred
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Operation name (e.g., "install-modules", "open-primary-store")
    pub operation: String,

    /// Timestamp when the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Classified failure with recovery information
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// Original error from the guarded operation
    pub original: SetupError,

    /// Classification driving remediation and downgrade decisions
    pub class: ErrorClass,

    /// Context about where the failure occurred
    pub context: ErrorContext,

    /// Attempt (1-based) on which this failure was observed
    pub attempt: u32,
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error in {} (attempt {}): {}",
            self.class, self.context.operation, self.attempt, self.original
        )
    }
}

/// Error classifier - assigns a class from the closed set
///
/// Message patterns are matched case-insensitively. The degraded-host
/// verdict is captured once from the environment prober at construction;
/// it is the fallback class when no message pattern is more specific.
pub struct ErrorClassifier {
    /// Names of installer packages that carry native code
    native_packages: Vec<String>,

    /// Prober verdict captured at construction
    degraded_host: bool,

    not_empty: Regex,
    missing_module: Regex,
    native_load: Regex,
}

impl ErrorClassifier {
    pub fn new(native_packages: Vec<String>) -> Self {
        Self {
            native_packages,
            degraded_host: false,
            not_empty: Regex::new(r"(?i)enotempty|not\s+empty").unwrap(),
            missing_module: Regex::new(
                r"(?i)cannot find module|module not found|no such module|missing module",
            )
            .unwrap(),
            native_load: Regex::new(
                r"(?i)invalid elf|wrong elf class|undefined symbol|cannot open shared object|was compiled against|bindings not found",
            )
            .unwrap(),
        }
    }

    /// Capture the prober verdict used for the EnvironmentDegraded fallback
    pub fn with_environment(mut self, probe: &dyn EnvironmentProbe) -> Self {
        self.degraded_host =
            probe.is_degraded_environment() || probe.cwd_is_cross_filesystem_mount();
        self
    }

    /// Classify a SetupError observed on the given attempt
    pub fn classify(
        &self,
        error: SetupError,
        context: ErrorContext,
        attempt: u32,
    ) -> ClassifiedError {
        let class = self.classify_error(&error);
        ClassifiedError {
            original: error,
            class,
            context,
            attempt,
        }
    }

    fn classify_error(&self, error: &SetupError) -> ErrorClass {
        match error {
            SetupError::CacheCorrupted(_) => ErrorClass::CacheCorruption,

            SetupError::IoError(io_err) => self.classify_io_error(io_err),

            SetupError::NativeModuleLoad(msg) => {
                // A known native package reported missing means its cache
                // entry was destroyed, not that the library itself is broken
                if self.names_native_package(msg) && self.missing_module.is_match(msg) {
                    ErrorClass::CacheCorruption
                } else {
                    ErrorClass::DependencyUnavailable
                }
            }

            SetupError::StoreOpen(msg) => {
                if self.native_load.is_match(msg) {
                    ErrorClass::DependencyUnavailable
                } else {
                    self.environment_or_unclassified()
                }
            }

            SetupError::InstallFailed(msg) => self.classify_message(msg),

            SetupError::StoreIo(msg) => self.classify_message(msg),

            SetupError::Timeout(_) | SetupError::Config(_) | SetupError::Unsupported(_) => {
                self.environment_or_unclassified()
            }
        }
    }

    fn classify_message(&self, msg: &str) -> ErrorClass {
        if self.not_empty.is_match(msg) {
            return ErrorClass::CacheCorruption;
        }
        if self.names_native_package(msg) && self.missing_module.is_match(msg) {
            return ErrorClass::CacheCorruption;
        }
        if self.native_load.is_match(msg) {
            return ErrorClass::DependencyUnavailable;
        }
        self.environment_or_unclassified()
    }

    fn classify_io_error(&self, io_err: &std::io::Error) -> ErrorClass {
        use std::io::ErrorKind;

        match io_err.kind() {
            ErrorKind::DirectoryNotEmpty => ErrorClass::CacheCorruption,
            _ => self.classify_message(&io_err.to_string()),
        }
    }

    fn names_native_package(&self, msg: &str) -> bool {
        let lower = msg.to_lowercase();
        self.native_packages
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
    }

    fn environment_or_unclassified(&self) -> ErrorClass {
        if self.degraded_host {
            ErrorClass::EnvironmentDegraded
        } else {
            ErrorClass::Unclassified
        }
    }
}
