/// Explicit runtime configuration
///
/// Built exactly once at the process boundary: an optional config file
/// (layered via the `config` crate), environment/CLI flags parsed by clap,
/// and platform directory defaults. Core components receive the resolved
/// struct and never read the process environment themselves.
use crate::env_probe::{EnvironmentProbe, HostProbe, StaticProbe};
use crate::recovery::runner::{DEFAULT_MAX_ATTEMPTS, FORCE_MAX_ATTEMPTS};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Packages whose cached trees carry native code; failures naming them
/// with a missing-module symptom indicate cache corruption
pub fn default_native_packages() -> Vec<String> {
    vec!["sqlite3".to_string()]
}

/// Resolved configuration handed to the library
#[derive(Debug, Clone)]
pub struct InitConfig {
    pub data_dir: PathBuf,
    pub cache_root: PathBuf,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub native_packages: Vec<String>,
    pub installer_command: Option<String>,
    pub fallback_only: bool,
    pub assume_degraded: bool,
    pub log_file: Option<PathBuf>,
}

impl InitConfig {
    /// Environment prober honoring the configured override
    pub fn probe(&self) -> Box<dyn EnvironmentProbe> {
        if self.assume_degraded {
            Box::new(StaticProbe::new(true, false))
        } else {
            Box::new(HostProbe::detect())
        }
    }
}

/// On-disk config file shape; every field optional, CLI flags win
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub native_packages: Option<Vec<String>>,
    pub installer_command: Option<String>,
}

/// Flag values collected by the CLI layer
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub cache_root: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub force: bool,
    pub fallback_only: bool,
    pub assume_degraded: bool,
    pub installer_command: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Load the config file; a missing file yields defaults
pub fn load_file(path: Option<&Path>) -> Result<FileConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match project_dirs() {
            Ok(dirs) => dirs.config_dir().join("initguard.toml"),
            Err(_) => return Ok(FileConfig::default()),
        },
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()).required(false))
        .build()
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    settings
        .try_deserialize()
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Merge file values and flags into the resolved configuration
pub fn resolve(file: FileConfig, cli: Overrides) -> Result<InitConfig> {
    let dirs = project_dirs()?;

    let data_dir = cli
        .data_dir
        .or(file.data_dir)
        .unwrap_or_else(|| dirs.data_dir().to_path_buf());
    let cache_root = cli
        .cache_root
        .or(file.cache_root)
        .unwrap_or_else(|| dirs.cache_dir().join("modules"));

    // An explicit attempt count always wins over the force preset
    let max_attempts = match (cli.max_attempts, cli.force) {
        (Some(n), _) => n.max(1),
        (None, true) => FORCE_MAX_ATTEMPTS,
        (None, false) => file.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
    };

    let initial_delay = Duration::from_millis(
        cli.initial_delay_ms
            .or(file.initial_delay_ms)
            .unwrap_or(1_000),
    );

    Ok(InitConfig {
        data_dir,
        cache_root,
        max_attempts,
        initial_delay,
        native_packages: file.native_packages.unwrap_or_else(default_native_packages),
        installer_command: cli.installer_command.or(file.installer_command),
        fallback_only: cli.fallback_only,
        assume_degraded: cli.assume_degraded,
        log_file: cli.log_file,
    })
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "initguard", "initguard")
        .context("could not determine platform directories")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_defaults() {
        let cfg = resolve(FileConfig::default(), Overrides::default()).unwrap();

        assert_eq!(cfg.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(cfg.initial_delay, Duration::from_secs(1));
        assert_eq!(cfg.native_packages, vec!["sqlite3".to_string()]);
        assert!(cfg.installer_command.is_none());
        assert!(!cfg.fallback_only);
    }

    #[test]
    fn force_preset_raises_attempts() {
        let cli = Overrides {
            force: true,
            ..Default::default()
        };
        let cfg = resolve(FileConfig::default(), cli).unwrap();
        assert_eq!(cfg.max_attempts, FORCE_MAX_ATTEMPTS);
    }

    #[test]
    fn explicit_attempts_beat_force() {
        let cli = Overrides {
            force: true,
            max_attempts: Some(7),
            ..Default::default()
        };
        let cfg = resolve(FileConfig::default(), cli).unwrap();
        assert_eq!(cfg.max_attempts, 7);
    }

    #[test]
    fn cli_paths_beat_file_paths() {
        let file = FileConfig {
            data_dir: Some(PathBuf::from("/from/file")),
            ..Default::default()
        };
        let cli = Overrides {
            data_dir: Some(PathBuf::from("/from/cli")),
            ..Default::default()
        };
        let cfg = resolve(file, cli).unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("/from/cli"));
    }

    #[test]
    fn zero_attempts_clamped_to_one() {
        let cli = Overrides {
            max_attempts: Some(0),
            ..Default::default()
        };
        let cfg = resolve(FileConfig::default(), cli).unwrap();
        assert_eq!(cfg.max_attempts, 1);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let file = load_file(Some(Path::new("/definitely/not/here.toml"))).unwrap();
        assert!(file.data_dir.is_none());
        assert!(file.max_attempts.is_none());
    }

    #[test]
    fn assume_degraded_uses_static_probe() {
        let cli = Overrides {
            assume_degraded: true,
            ..Default::default()
        };
        let cfg = resolve(FileConfig::default(), cli).unwrap();
        assert!(cfg.probe().is_degraded_environment());
    }
}
