use clap::Parser;
use std::path::PathBuf;
use zstd_setup_core::OsType;

/// Best-effort installer for the optional zstandard compression library
#[derive(Parser, Debug)]
#[command(name = "zstd-setup")]
#[command(author = "4n6h4x0r")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Installs zstandard via apt-get and pip when the host can support it",
    long_about = None
)]
pub struct Args {
    /// JSON config file (min_core_count, pip_package, python, pip_timeout_secs, excluded_platforms)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override OS detection (debian, k1, sonicpad, linux, other)
    #[arg(long = "os-type", value_name = "TYPE")]
    pub os_type: Option<OsType>,

    /// Override the detected number of logical CPU cores
    #[arg(long = "cores", value_name = "N")]
    pub cores: Option<usize>,

    /// Python interpreter used to run pip
    #[arg(long = "python", value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Print the commands instead of running them
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Print the outcome as JSON on stdout
    #[arg(long = "json")]
    pub json: bool,

    /// Verbose logging (shows raw command output)
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Directory for the install log (defaults to the system temp directory)
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Don't write an install log file
    #[arg(long = "no-log-file", conflicts_with = "log_dir")]
    pub no_log_file: bool,
}

/// Parses command-line arguments
pub fn parse_args() -> Args {
    Args::parse()
}
