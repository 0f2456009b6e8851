use anyhow::Result;
use std::path::Path;
use zstd_setup_core::{
    logical_cpu_count, InstallContext, InstallLogger, InstallOutcome, InstallerConfig, OsType,
    SkipReason, SystemRunner, ZstdInstaller,
};

mod cli;

/// Number of install logs kept in the log directory, this run's included
const KEEP_LOGS: usize = 5;

fn main() -> Result<()> {
    let args = cli::parse_args();

    // Initialize logger with appropriate level based on verbose flag
    if std::env::var("RUST_LOG").is_err() {
        if args.verbose {
            std::env::set_var("RUST_LOG", "debug");
        } else {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    let mut config = match &args.config {
        Some(path) => InstallerConfig::load(path)?,
        None => InstallerConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(python) = &args.python {
        config.python = python.clone();
    }

    match which::which(&config.python) {
        Ok(path) => log::debug!("Using Python interpreter: {}", path.display()),
        Err(e) => log::warn!(
            "Python interpreter {} not found ({}); pip install will likely fail",
            config.python.display(),
            e
        ),
    }

    let context = InstallContext::new(
        args.os_type.unwrap_or_else(OsType::detect),
        args.cores.unwrap_or_else(logical_cpu_count),
    );
    log::debug!(
        "Host: os_type={}, cpu_count={}",
        context.os_type,
        context.cpu_count
    );

    let skip = config.skip_reason(&context);
    let logger = if wants_log_file(&args, skip.as_ref()) {
        let log_dir = args.log_dir.clone().unwrap_or_else(std::env::temp_dir);
        open_install_log(&log_dir, KEEP_LOGS)
    } else {
        InstallLogger::console_only()
    };

    let runner = SystemRunner::new();
    let installer = ZstdInstaller::new(&config, &runner, &logger);
    let outcome = if args.dry_run {
        log::info!("Running in DRY-RUN mode - no commands will be executed");
        installer.dry_run(&context)
    } else {
        installer.try_install(&context)
    };
    logger.finalize();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", summary(&outcome));
    }

    // The install is optional, so its outcome never changes the exit code
    Ok(())
}

/// Only real install attempts leave a log file behind
fn wants_log_file(args: &cli::Args, skip: Option<&SkipReason>) -> bool {
    !(args.no_log_file || args.dry_run || skip.is_some())
}

/// Open this run's log file, then prune so `keep` files remain including it
fn open_install_log(log_dir: &Path, keep: usize) -> InstallLogger {
    let logger = InstallLogger::new(log_dir).unwrap_or_else(|e| {
        log::warn!("{}; logging to console only", e);
        InstallLogger::console_only()
    });

    if logger.log_path().is_some() {
        if let Err(e) = InstallLogger::cleanup_old_logs(log_dir, keep) {
            log::debug!("Skipping old log cleanup: {}", e);
        }
    }

    logger
}

fn summary(outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::Skipped(SkipReason::ExcludedPlatform { os_type }) => {
            format!("Skipped: zstandard is not installed on {} hosts.", os_type)
        }
        InstallOutcome::Skipped(SkipReason::TooFewCores { found, required }) => format!(
            "Skipped: {} CPU core(s) found, at least {} needed to install zstandard.",
            found, required
        ),
        InstallOutcome::Installed { elapsed_secs } => {
            format!("✓ zstandard installed ({:.2}s)", elapsed_secs)
        }
        InstallOutcome::NotInstalled { elapsed_secs, .. } => format!(
            "zstandard was not installed ({:.2}s). It is optional; everything keeps working without it.",
            elapsed_secs
        ),
        InstallOutcome::DryRun { commands } => {
            let mut lines = vec!["[DRY RUN] Would install zstandard by running:".to_string()];
            lines.extend(commands.iter().map(|command| format!("  {}", command)));
            lines.join("\n")
        }
    }
}
