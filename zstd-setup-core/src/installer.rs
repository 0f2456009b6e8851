use serde::Serialize;
use std::time::Instant;

use crate::config::InstallerConfig;
use crate::context::{InstallContext, OsType};
use crate::logger::InstallLog;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec, RunError};

/// System package install, run through the shell exactly as written
pub const APT_INSTALL_COMMAND: &str = "sudo apt-get install zstd -y";

/// Why the install was not attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ExcludedPlatform { os_type: OsType },
    TooFewCores { found: usize, required: usize },
}

/// Result of a best-effort install
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    Skipped(SkipReason),
    Installed { elapsed_secs: f64 },
    NotInstalled { elapsed_secs: f64, stderr: String },
    /// Nothing was run; these are the commands an install would run
    DryRun { commands: Vec<String> },
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallOutcome::Installed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, InstallOutcome::Skipped(_))
    }
}

/// Installs or upgrades the optional zstandard library without ever failing
pub struct ZstdInstaller<'a> {
    config: &'a InstallerConfig,
    runner: &'a dyn CommandRunner,
    log: &'a dyn InstallLog,
}

impl<'a> ZstdInstaller<'a> {
    pub fn new(
        config: &'a InstallerConfig,
        runner: &'a dyn CommandRunner,
        log: &'a dyn InstallLog,
    ) -> Self {
        Self {
            config,
            runner,
            log,
        }
    }

    /// The pip invocation for the configured interpreter and package
    pub fn pip_command(&self) -> CommandSpec {
        CommandSpec::new(self.config.python.to_string_lossy())
            .args(["-m", "pip", "install"])
            .arg(self.config.pip_package.as_str())
            .timeout(self.config.pip_timeout())
            .check(false)
    }

    pub fn apt_command(&self) -> CommandSpec {
        CommandSpec::shell(APT_INSTALL_COMMAND).check(false)
    }

    /// Check whether the host is eligible, without running anything
    pub fn skip_reason(&self, context: &InstallContext) -> Option<SkipReason> {
        self.config.skip_reason(context)
    }

    /// Plan the install without running anything or writing to the install log
    pub fn dry_run(&self, context: &InstallContext) -> InstallOutcome {
        if let Some(reason) = self.skip_reason(context) {
            return InstallOutcome::Skipped(reason);
        }

        let commands: Vec<String> = [self.apt_command(), self.pip_command()]
            .iter()
            .map(CommandSpec::display)
            .collect();
        for command in &commands {
            log::info!("[DRY RUN] Would run: {}", command);
        }

        InstallOutcome::DryRun { commands }
    }

    /// Try to install zstandard; failures are logged and reported, never raised
    pub fn try_install(&self, context: &InstallContext) -> InstallOutcome {
        if let Some(reason) = self.skip_reason(context) {
            log::debug!("Skipping zstandard install: {:?}", reason);
            return InstallOutcome::Skipped(reason);
        }

        self.log.info("Installing zstandard, this might take a moment...");
        let started = Instant::now();

        // The system package is a companion install; its result never changes the outcome.
        match self.runner.run(&self.apt_command()) {
            Ok(output) => self.log.debug(&describe("apt", &output)),
            Err(e) => self.log.debug(&format!("Zstandard apt install failed to run: {}", e)),
        }

        let pip_result = self.runner.run(&self.pip_command());
        let elapsed_secs = started.elapsed().as_secs_f64();

        let stderr = match pip_result {
            Ok(output) => {
                self.log.debug(&describe("pip", &output));
                if output.success() {
                    self.log.info(&format!(
                        "zstandard successfully installed/updated. It took {:.2} seconds.",
                        elapsed_secs
                    ));
                    return InstallOutcome::Installed { elapsed_secs };
                }
                if output.timed_out {
                    format!(
                        "pip install timed out after {} seconds. {}",
                        self.config.pip_timeout().as_secs(),
                        output.stderr
                    )
                } else {
                    output.stderr
                }
            }
            Err(RunError::Failed { output, .. }) => output.stderr,
            Err(e) => e.to_string(),
        };

        self.log.info(&format!(
            "zstandard was not installed, it remains optional. It took {:.2} seconds. Output: {}",
            elapsed_secs,
            stderr.trim_end()
        ));
        InstallOutcome::NotInstalled {
            elapsed_secs,
            stderr,
        }
    }
}

fn describe(step: &str, output: &CommandOutput) -> String {
    format!(
        "Zstandard {} install result. Code: {}, StdOut: {}, StdErr: {}",
        step,
        output.code_display(),
        output.stdout.trim_end(),
        output.stderr.trim_end()
    )
}
