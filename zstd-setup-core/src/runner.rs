//! Subprocess execution behind an injectable trait
//!
//! The installer never spawns processes itself. It hands a [`CommandSpec`] to a
//! [`CommandRunner`], which lets tests substitute scripted fakes.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for output readers once the process is gone
const READER_GRACE: Duration = Duration::from_secs(2);

/// A command to run, with its arguments and execution policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Kill the command once this much time has passed
    pub timeout: Option<Duration>,
    /// Treat an unsuccessful command as a [`RunError::Failed`]
    pub check: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
            check: false,
        }
    }

    /// Run a full command line through `sh -c`
    pub fn shell(command_line: &str) -> Self {
        Self::new("sh").arg("-c").arg(command_line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Command line that can be pasted into a POSIX shell as-is
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Single-quote `part` unless every character is shell-safe
fn shell_quote(part: &str) -> String {
    let safe = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Exit code and captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal or by the timeout
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl CommandOutput {
    pub fn with_code(code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn code_display(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None if self.timed_out => "timeout".to_string(),
            None => "killed".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` did not succeed (exit code {})", .output.code_display())]
    Failed {
        command: String,
        output: CommandOutput,
    },
}

/// Runs a command and captures its result
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError>;
}

/// Runs commands on the host with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        let command_line = spec.display();
        log::debug!("Running: {}", command_line);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Only timed commands get their own process group; sudo prompting from a
        // background group would stop on SIGTTIN.
        #[cfg(unix)]
        {
            if spec.timeout.is_some() {
                use std::os::unix::process::CommandExt;
                command.process_group(0);
            }
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let status = match spec.timeout {
            None => child.wait().map(Some),
            Some(limit) => wait_with_deadline(&mut child, limit),
        }
        .map_err(|source| RunError::Wait {
            command: command_line.clone(),
            source,
        })?;

        let output = CommandOutput {
            exit_code: status.and_then(|s| s.code()),
            stdout: stdout_rx.recv_timeout(READER_GRACE).unwrap_or_default(),
            stderr: stderr_rx.recv_timeout(READER_GRACE).unwrap_or_default(),
            timed_out: status.is_none(),
            elapsed: started.elapsed(),
        };

        if output.timed_out {
            log::debug!(
                "Killed `{}` after {:.2} seconds",
                command_line,
                output.elapsed.as_secs_f64()
            );
        }

        if spec.check && !output.success() {
            return Err(RunError::Failed {
                command: command_line,
                output,
            });
        }

        Ok(output)
    }
}

/// Read a pipe to the end on a background thread
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
    }
    rx
}

/// The parts of a running child that the deadline loop needs
trait Reapable {
    fn poll(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill_tree(&mut self);
    fn reap(&mut self);
}

impl Reapable for Child {
    fn poll(&mut self) -> io::Result<Option<ExitStatus>> {
        self.try_wait()
    }

    fn kill_tree(&mut self) {
        // The child leads its own process group, so this reaches anything it spawned too
        #[cfg(unix)]
        {
            if let Ok(pgid) = libc::pid_t::try_from(self.id()) {
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
            }
        }

        let _ = self.kill();
    }

    fn reap(&mut self) {
        let _ = self.wait();
    }
}

/// Wait for the child until `limit` elapses; `Ok(None)` means it was killed
///
/// The child is killed and reaped on every path that gives up on it, including
/// a failed poll.
fn wait_with_deadline<C: Reapable>(
    child: &mut C,
    limit: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        let polled = match child.poll() {
            Ok(polled) => polled,
            Err(e) => {
                child.kill_tree();
                child.reap();
                return Err(e);
            }
        };

        if let Some(status) = polled {
            return Ok(Some(status));
        }

        if Instant::now() >= deadline {
            child.kill_tree();
            child.reap();
            return Ok(None);
        }

        thread::sleep(POLL_INTERVAL);
    }
}
