/// Host environment probing
///
/// Pure queries about the execution environment, used to pick remediation
/// behavior: compatibility-layer kernels (e.g. a `microsoft`-tagged build)
/// are known to corrupt installer caches under concurrent renames, and
/// cross-filesystem mounts have locking quirks that break the primary
/// store's native engine.
///
/// `HostProbe` captures both verdicts once at construction; components
/// receive the probe by injection and never inspect the host themselves.
#[cfg(target_os = "linux")]
use std::path::Path;

pub trait EnvironmentProbe: Send + Sync {
    /// Host runs in a known-problematic execution mode
    fn is_degraded_environment(&self) -> bool;

    /// Working directory sits on a cross-filesystem mount
    fn cwd_is_cross_filesystem_mount(&self) -> bool;
}

/// Filesystem types with cross-filesystem semantics known to cause
/// locking and rename trouble
#[cfg(target_os = "linux")]
const FOREIGN_FS_TYPES: [&str; 6] = ["9p", "drvfs", "cifs", "nfs", "vboxsf", "prlfs"];

/// Probe backed by the host: kernel identification plus the mount table
#[derive(Debug, Clone, Copy)]
pub struct HostProbe {
    degraded: bool,
    cross_fs: bool,
}

impl HostProbe {
    /// Probe the host once; results are fixed for the probe's lifetime
    pub fn detect() -> Self {
        let degraded = Self::kernel_is_compat_layer();
        let cross_fs = Self::cwd_on_foreign_filesystem();

        tracing::debug!(
            degraded = degraded,
            cross_fs = cross_fs,
            "host environment probed"
        );

        Self { degraded, cross_fs }
    }

    #[cfg(target_os = "linux")]
    fn kernel_is_compat_layer() -> bool {
        match std::fs::read_to_string("/proc/version") {
            Ok(version) => {
                let version = version.to_lowercase();
                version.contains("microsoft") || version.contains("wsl")
            }
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn kernel_is_compat_layer() -> bool {
        false
    }

    #[cfg(target_os = "linux")]
    fn cwd_on_foreign_filesystem() -> bool {
        let cwd = match std::env::current_dir() {
            Ok(dir) => dir,
            Err(_) => return false,
        };

        let mounts = match procfs::process::Process::myself().and_then(|p| p.mountinfo()) {
            Ok(mounts) => mounts,
            Err(_) => return false,
        };

        // Longest mount-point prefix of the working directory wins
        let mut best: Option<(usize, String)> = None;
        for mount in &mounts {
            if Self::is_prefix(&mount.mount_point, &cwd) {
                let depth = mount.mount_point.components().count();
                if best.as_ref().map_or(true, |(d, _)| depth > *d) {
                    best = Some((depth, mount.fs_type.clone()));
                }
            }
        }

        match best {
            Some((_, fs_type)) => FOREIGN_FS_TYPES
                .iter()
                .any(|t| fs_type == *t || fs_type.starts_with(&format!("{t}."))),
            None => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn cwd_on_foreign_filesystem() -> bool {
        false
    }

    #[cfg(target_os = "linux")]
    fn is_prefix(prefix: &Path, path: &Path) -> bool {
        path.starts_with(prefix)
    }
}

impl EnvironmentProbe for HostProbe {
    fn is_degraded_environment(&self) -> bool {
        self.degraded
    }

    fn cwd_is_cross_filesystem_mount(&self) -> bool {
        self.cross_fs
    }
}

/// Fixed probe verdicts, for configuration overrides and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProbe {
    degraded: bool,
    cross_fs: bool,
}

impl StaticProbe {
    pub fn new(degraded: bool, cross_fs: bool) -> Self {
        Self { degraded, cross_fs }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn is_degraded_environment(&self) -> bool {
        self.degraded
    }

    fn cwd_is_cross_filesystem_mount(&self) -> bool {
        self.cross_fs
    }
}
