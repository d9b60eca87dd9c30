/// Remediation actions applied between retry attempts
///
/// Actions are planned from the failure classification and executed
/// individually; a failing action is recorded and logged but never aborts
/// the retry loop. All filesystem effects are idempotent.
use super::classification::ErrorClass;
use crate::cache::{CacheCleaner, CleanOutcome};
use crate::env_probe::EnvironmentProbe;
use crate::SetupError;
use serde::Serialize;
use std::fmt;

/// One corrective step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RemediationAction {
    /// Clear the installer's on-disk cache, optionally scoped to one
    /// package tree
    ClearInstallerCache { package: Option<String> },

    /// Normalize file permissions on the cache root
    NormalizeCachePermissions,

    /// Caller-supplied cleanup closure from `RunOptions`
    CustomCleanup,
}

impl RemediationAction {
    pub fn description(&self) -> String {
        match self {
            RemediationAction::ClearInstallerCache { package: Some(p) } => {
                format!("clear installer cache for '{p}'")
            }
            RemediationAction::ClearInstallerCache { package: None } => {
                "clear installer cache".to_string()
            }
            RemediationAction::NormalizeCachePermissions => {
                "normalize cache permissions".to_string()
            }
            RemediationAction::CustomCleanup => "caller cleanup".to_string(),
        }
    }
}

impl fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// Result of executing one action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemediationResult {
    Succeeded,
    Failed,
    NotApplicable,
}

/// Record of one executed action, kept in order for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemediationRecord {
    pub action: RemediationAction,
    pub result: RemediationResult,

    /// Failure detail when `result` is `Failed`
    pub detail: Option<String>,
}

impl RemediationRecord {
    pub fn succeeded(action: RemediationAction) -> Self {
        Self {
            action,
            result: RemediationResult::Succeeded,
            detail: None,
        }
    }

    pub fn failed(action: RemediationAction, detail: impl Into<String>) -> Self {
        Self {
            action,
            result: RemediationResult::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn not_applicable(action: RemediationAction) -> Self {
        Self {
            action,
            result: RemediationResult::NotApplicable,
            detail: None,
        }
    }
}

/// Plans and executes remediation for classified failures
pub struct Remediator {
    cleaner: CacheCleaner,
    native_packages: Vec<String>,
    degraded_host: bool,
}

impl Remediator {
    pub fn new(cleaner: CacheCleaner, native_packages: Vec<String>) -> Self {
        Self {
            cleaner,
            native_packages,
            degraded_host: false,
        }
    }

    /// Capture the prober verdict; degraded hosts get a proactive
    /// permission fix and an extra one after each cache clear
    pub fn with_environment(mut self, probe: &dyn EnvironmentProbe) -> Self {
        self.degraded_host =
            probe.is_degraded_environment() || probe.cwd_is_cross_filesystem_mount();
        self
    }

    pub fn host_is_degraded(&self) -> bool {
        self.degraded_host
    }

    /// Actions appropriate to a classification; empty when none apply
    pub fn plan(&self, class: ErrorClass, error: &SetupError) -> Vec<RemediationAction> {
        match class {
            ErrorClass::CacheCorruption => {
                let mut actions = vec![RemediationAction::ClearInstallerCache {
                    package: self.affected_package(error),
                }];
                if self.degraded_host {
                    actions.push(RemediationAction::NormalizeCachePermissions);
                }
                actions
            }
            ErrorClass::EnvironmentDegraded
            | ErrorClass::DependencyUnavailable
            | ErrorClass::Unclassified => Vec::new(),
        }
    }

    /// Execute one action; failure is reported in the record, never raised
    pub fn apply(&self, action: &RemediationAction) -> RemediationRecord {
        let record = match action {
            RemediationAction::ClearInstallerCache { package } => {
                match self.cleaner.clean(package.as_deref()) {
                    Ok(CleanOutcome::Removed(_)) | Ok(CleanOutcome::AlreadyClean) => {
                        RemediationRecord::succeeded(action.clone())
                    }
                    Err(e) => RemediationRecord::failed(action.clone(), e.to_string()),
                }
            }
            RemediationAction::NormalizeCachePermissions => {
                if cfg!(unix) {
                    match self.cleaner.normalize_permissions() {
                        Ok(()) => RemediationRecord::succeeded(action.clone()),
                        Err(e) => RemediationRecord::failed(action.clone(), e.to_string()),
                    }
                } else {
                    RemediationRecord::not_applicable(action.clone())
                }
            }
            // Custom cleanup closures are driven by the runner, which owns them
            RemediationAction::CustomCleanup => {
                RemediationRecord::not_applicable(action.clone())
            }
        };

        match record.result {
            RemediationResult::Failed => {
                tracing::warn!(
                    action = %record.action,
                    detail = record.detail.as_deref().unwrap_or(""),
                    "remediation failed; retry continues"
                );
            }
            _ => {
                tracing::debug!(action = %record.action, result = ?record.result, "remediation applied");
            }
        }

        record
    }

    /// One-shot permission normalization for degraded hosts, run before
    /// the first attempt
    pub fn normalize_environment(&self) -> RemediationRecord {
        self.apply(&RemediationAction::NormalizeCachePermissions)
    }

    /// First configured native package named in the failure message
    fn affected_package(&self, error: &SetupError) -> Option<String> {
        let message = error.to_string().to_lowercase();
        self.native_packages
            .iter()
            .find(|p| message.contains(&p.to_lowercase()))
            .cloned()
    }
}
