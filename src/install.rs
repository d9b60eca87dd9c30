/// Module installer boundary
///
/// The installer is an external collaborator: it fetches package trees
/// into the cache root and may fail with classifiable errors (half-removed
/// directories, missing native modules). The trait keeps the runner
/// testable; the command implementation is what the CLI wires in.
use crate::{SetupError, SetupResult};
use std::path::PathBuf;
use std::process::Command;

#[cfg_attr(test, mockall::automock)]
pub trait ModuleInstaller: Send + Sync {
    /// Ensure required modules are present in the cache
    fn ensure_modules(&self) -> SetupResult<()>;
}

/// Installer that shells out to a configured command
#[derive(Debug)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    cache_root: PathBuf,
}

impl CommandInstaller {
    pub fn new(command_line: &str, cache_root: impl Into<PathBuf>) -> SetupResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| SetupError::Config("installer command is empty".to_string()))?;

        Ok(Self {
            program,
            args: parts.collect(),
            cache_root: cache_root.into(),
        })
    }
}

impl ModuleInstaller for CommandInstaller {
    fn ensure_modules(&self) -> SetupResult<()> {
        tracing::debug!(
            program = %self.program,
            cache_root = %self.cache_root.display(),
            "running module installer"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("INITGUARD_CACHE_ROOT", &self.cache_root)
            .output()
            .map_err(|e| {
                SetupError::InstallFailed(format!("failed to spawn {}: {e}", self.program))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SetupError::InstallFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Used when no installer command is configured
pub struct NoInstaller;

impl ModuleInstaller for NoInstaller {
    fn ensure_modules(&self) -> SetupResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheCleaner;
    use crate::env_probe::StaticProbe;
    use crate::recovery::{ErrorClassifier, RecoveryRunner, Remediator, RunOptions};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn empty_command_is_rejected() {
        let err = CommandInstaller::new("   ", "/tmp/cache").unwrap_err();
        assert!(matches!(err, SetupError::Config(_)));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_reports_install_failure() {
        let installer = CommandInstaller::new("false", "/tmp/cache").unwrap();
        let err = installer.ensure_modules().unwrap_err();
        assert!(matches!(err, SetupError::InstallFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn succeeding_command_is_ok() {
        let installer = CommandInstaller::new("true", "/tmp/cache").unwrap();
        installer.ensure_modules().unwrap();
    }

    #[test]
    fn runner_retries_mock_installer_until_it_recovers() {
        let tmp = TempDir::new().unwrap();
        let probe = StaticProbe::new(false, false);
        let runner = RecoveryRunner::new(
            ErrorClassifier::new(vec!["sqlite3".to_string()]).with_environment(&probe),
            Remediator::new(CacheCleaner::new(tmp.path()), vec!["sqlite3".to_string()])
                .with_environment(&probe),
        );

        let calls = Arc::new(AtomicU32::new(0));
        let mut mock = MockModuleInstaller::new();
        let mock_calls = calls.clone();
        mock.expect_ensure_modules().times(3).returning(move || {
            if mock_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SetupError::InstallFailed(
                    "ENOTEMPTY: directory not empty, rmdir 'sqlite3-1.2.3'".into(),
                ))
            } else {
                Ok(())
            }
        });

        let result = runner.run(
            "install-modules",
            || mock.ensure_modules(),
            RunOptions::new().with_initial_delay(Duration::from_millis(2)),
        );

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
