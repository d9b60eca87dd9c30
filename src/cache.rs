/// Installer cache maintenance
///
/// The module installer keeps fetched package trees under a single cache
/// root. Corruption shows up as half-renamed directories the installer can
/// neither reuse nor remove. Both operations here are idempotent: cleaning
/// an already-clean tree or re-normalizing permissions is a no-op success.
use crate::{SetupError, SetupResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a cache clean
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Entries removed
    Removed(usize),

    /// Nothing matched; the tree was already clean
    AlreadyClean,
}

pub struct CacheCleaner {
    root: PathBuf,
}

impl CacheCleaner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove cached trees for `package`, or every entry when `None`.
    ///
    /// A missing cache root counts as already clean.
    pub fn clean(&self, package: Option<&str>) -> SetupResult<CleanOutcome> {
        if !self.root.exists() {
            return Ok(CleanOutcome::AlreadyClean);
        }

        let pattern = match package {
            Some(name) => self.root.join(format!("{name}*")),
            None => self.root.join("*"),
        };
        let pattern = pattern
            .to_str()
            .ok_or_else(|| SetupError::Config("cache root is not valid UTF-8".to_string()))?;

        let mut removed = 0usize;
        for entry in glob::glob(pattern).map_err(|e| SetupError::Config(e.to_string()))? {
            let path = entry.map_err(|e| SetupError::IoError(e.into_error()))?;
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed += 1;
        }

        if removed == 0 {
            tracing::debug!(root = %self.root.display(), "cache already clean");
            Ok(CleanOutcome::AlreadyClean)
        } else {
            tracing::info!(
                root = %self.root.display(),
                package = package.unwrap_or("*"),
                removed = removed,
                "installer cache cleared"
            );
            Ok(CleanOutcome::Removed(removed))
        }
    }

    /// Normalize permissions across the cache root (directories 0755,
    /// files 0644). A missing root is a no-op.
    #[cfg(unix)]
    pub fn normalize_permissions(&self) -> SetupResult<()> {
        if !self.root.exists() {
            return Ok(());
        }
        self.normalize_tree(&self.root)
    }

    #[cfg(not(unix))]
    pub fn normalize_permissions(&self) -> SetupResult<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn normalize_tree(&self, dir: &Path) -> SetupResult<()> {
        Self::chmod(dir, 0o755)?;

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.normalize_tree(&path)?;
            } else {
                Self::chmod(&path, 0o644)?;
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn chmod(path: &Path, mode: u32) -> SetupResult<()> {
        use nix::sys::stat::{fchmodat, mode_t, FchmodatFlags, Mode};

        fchmodat(
            None,
            path,
            Mode::from_bits_truncate(mode as mode_t),
            FchmodatFlags::FollowSymlink,
        )
        .map_err(|e| SetupError::IoError(std::io::Error::from(e)))
    }
}
