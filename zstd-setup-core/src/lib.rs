//! Best-effort installer for the optional zstandard compression library
//!
//! On eligible hosts the installer asks `apt-get` for the `zstd` package and
//! `pip` for the Python binding. Neither step is allowed to fail the caller:
//! the result comes back as an [`InstallOutcome`] and is logged.

mod config;
mod context;
mod installer;
mod logger;
mod runner;

// Re-export public types
pub use config::InstallerConfig;
pub use context::{classify, logical_cpu_count, InstallContext, OsType};
pub use installer::{InstallOutcome, SkipReason, ZstdInstaller, APT_INSTALL_COMMAND};
pub use logger::{InstallLog, InstallLogger};
pub use runner::{
    CommandOutput, CommandRunner, CommandSpec, RunError, SystemRunner,
};

