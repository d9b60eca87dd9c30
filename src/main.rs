use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use initguard::cache::{CacheCleaner, CleanOutcome};
use initguard::config::{self, InitConfig, Overrides};
use initguard::install::{CommandInstaller, ModuleInstaller};
use initguard::recovery::{RecoveryError, RecoveryRunner, RunOptions};
use initguard::store::{SelectError, SelectOptions, StorageSelector, StoreLayout};
use initguard::ui::ConsoleReporter;
use initguard::{logging, CancelToken};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;

// Exit codes the surrounding tooling keys on
const EXIT_EXHAUSTED: i32 = 2;
const EXIT_STORAGE_FATAL: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "initguard")]
#[command(about = "Resilient initialization runner with classified error recovery")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file path
    #[arg(long, global = true, env = "INITGUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the workspace with automatic error recovery
    Init {
        /// Aggressive mode: retry up to 5 times
        #[arg(long)]
        force: bool,

        /// Override the attempt count (wins over --force)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Base retry delay in milliseconds
        #[arg(long)]
        initial_delay_ms: Option<u64>,

        /// Data directory for the state stores
        #[arg(long, env = "INITGUARD_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Installer cache root
        #[arg(long, env = "INITGUARD_CACHE_ROOT")]
        cache_root: Option<PathBuf>,

        /// Skip the primary store and use the fallback outright
        #[arg(long)]
        fallback_only: bool,

        /// Treat the host as degraded without probing
        #[arg(long)]
        assume_degraded: bool,

        /// Module installer command to run before storage selection
        #[arg(long)]
        installer: Option<String>,

        /// Write a JSON log trail to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Report host environment and storage backend availability
    Doctor {
        /// Data directory for the state stores
        #[arg(long, env = "INITGUARD_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Installer cache root
        #[arg(long, env = "INITGUARD_CACHE_ROOT")]
        cache_root: Option<PathBuf>,
    },

    /// Clear the installer module cache
    CleanCache {
        /// Only clear trees for this package
        #[arg(long)]
        package: Option<String>,

        /// Installer cache root
        #[arg(long, env = "INITGUARD_CACHE_ROOT")]
        cache_root: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let file_cfg = config::load_file(cli.config.as_deref())?;

    match cli.command {
        Commands::Init {
            force,
            max_attempts,
            initial_delay_ms,
            data_dir,
            cache_root,
            fallback_only,
            assume_degraded,
            installer,
            log_file,
        } => {
            let cfg = config::resolve(
                file_cfg,
                Overrides {
                    data_dir,
                    cache_root,
                    max_attempts,
                    initial_delay_ms,
                    force,
                    fallback_only,
                    assume_degraded,
                    installer_command: installer,
                    log_file,
                },
            )?;
            let _guard = logging::init(cli.debug, cfg.log_file.as_deref());
            cmd_init(&cfg, cli.quiet)
        }

        Commands::Doctor {
            data_dir,
            cache_root,
        } => {
            let cfg = config::resolve(
                file_cfg,
                Overrides {
                    data_dir,
                    cache_root,
                    ..Default::default()
                },
            )?;
            let _guard = logging::init(cli.debug, None);
            cmd_doctor(&cfg)
        }

        Commands::CleanCache {
            package,
            cache_root,
        } => {
            let cfg = config::resolve(
                file_cfg,
                Overrides {
                    cache_root,
                    ..Default::default()
                },
            )?;
            let _guard = logging::init(cli.debug, None);
            cmd_clean_cache(&cfg, package.as_deref())
        }
    }
}

fn cmd_init(cfg: &InitConfig, quiet: bool) -> Result<i32> {
    let cancel = CancelToken::new();
    install_signal_handler(&cancel)?;

    let probe = cfg.probe();
    let reporter = Arc::new(ConsoleReporter::new(quiet));
    let runner = RecoveryRunner::from_config(cfg, probe.as_ref())
        .with_event_sink(reporter)
        .with_cancel_token(cancel);

    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("failed to create data dir {}", cfg.data_dir.display()))?;

    // Step 1: module install, guarded
    if let Some(command) = &cfg.installer_command {
        let installer = CommandInstaller::new(command, &cfg.cache_root)
            .context("invalid installer command")?;
        let options = RunOptions::new()
            .with_max_attempts(cfg.max_attempts)
            .with_initial_delay(cfg.initial_delay);

        match runner.run("install-modules", || installer.ensure_modules(), options) {
            Ok(()) => {}
            Err(e) => return Ok(exit_code_for(&e)),
        }
    }

    // Step 2: storage selection, one decision for the process lifetime
    let layout = StoreLayout::new(&cfg.data_dir);
    let selector = StorageSelector::new(&runner, layout);
    for (backend, availability) in selector.preflight() {
        tracing::debug!(backend = backend, availability = %availability, "storage preflight");
    }

    let select_options = SelectOptions {
        primary_attempts: cfg.max_attempts,
        initial_delay: cfg.initial_delay,
        fallback_only: cfg.fallback_only,
    };
    let mut handle = match selector.select(&select_options) {
        Ok(handle) => handle,
        Err(SelectError::Cancelled(_)) => return Ok(EXIT_CANCELLED),
        Err(e) => {
            eprintln!("error: {e:#}");
            eprintln!("hint: run `initguard doctor` and escalate with the log file if this persists");
            return Ok(EXIT_STORAGE_FATAL);
        }
    };

    // Step 3: seed initial state through the uniform handle
    seed_state(&mut handle).context("failed to write initial state")?;

    if !quiet {
        println!(
            "initialized ({} backend{})",
            handle.kind(),
            if handle.was_downgraded() {
                ", downgraded"
            } else {
                ""
            }
        );
    }
    Ok(0)
}

fn seed_state(handle: &mut initguard::StorageHandle) -> initguard::SetupResult<()> {
    let backend = handle.kind().backend_name().to_string();
    let downgraded = handle.was_downgraded();

    let store = handle.store_mut();
    store.put("schema_version", "1")?;
    store.put("storage_mode", &backend)?;
    store.put("downgraded", if downgraded { "true" } else { "false" })?;
    store.put("initialized_at", &chrono::Utc::now().to_rfc3339())?;
    store.flush()
}

fn cmd_doctor(cfg: &InitConfig) -> Result<i32> {
    let probe = cfg.probe();

    println!("host environment");
    println!(
        "  degraded execution mode:     {}",
        yes_no(probe.is_degraded_environment())
    );
    println!(
        "  cross-filesystem workdir:    {}",
        yes_no(probe.cwd_is_cross_filesystem_mount())
    );
    println!();

    println!("storage backends");
    let runner = RecoveryRunner::from_config(cfg, probe.as_ref());
    let selector = StorageSelector::new(&runner, StoreLayout::new(&cfg.data_dir));
    for (backend, availability) in selector.preflight() {
        println!("  {backend:<12} {availability}");
    }
    println!();

    println!("paths");
    println!("  data dir:   {}", cfg.data_dir.display());
    println!("  cache root: {}", cfg.cache_root.display());
    Ok(0)
}

fn cmd_clean_cache(cfg: &InitConfig, package: Option<&str>) -> Result<i32> {
    let cleaner = CacheCleaner::new(&cfg.cache_root);
    match cleaner.clean(package)? {
        CleanOutcome::Removed(count) => {
            println!("removed {count} cache entr{}", if count == 1 { "y" } else { "ies" });
        }
        CleanOutcome::AlreadyClean => println!("cache already clean"),
    }
    Ok(0)
}

fn install_signal_handler(cancel: &CancelToken) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to install signal handler")?;
    let token = cancel.clone();
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            token.cancel();
        }
    });
    Ok(())
}

fn exit_code_for(error: &RecoveryError) -> i32 {
    match error {
        RecoveryError::Cancelled { .. } => EXIT_CANCELLED,
        RecoveryError::Exhausted { .. } => {
            eprintln!("hint: retry with --force, or clear the cache with `initguard clean-cache`");
            EXIT_EXHAUSTED
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
