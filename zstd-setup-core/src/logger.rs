//! Installation logger for the zstandard installer
//!
//! Every line goes to the `log` facade. When a log directory is given, lines are
//! also appended to a timestamped file there, so a failed install on a headless
//! printer host can be diagnosed afterwards.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const LOG_FILE_PREFIX: &str = "zstd-setup-install-";
const LOG_FILE_SUFFIX: &str = ".log";

/// Sink for installer progress messages
pub trait InstallLog {
    fn info(&self, message: &str);
    fn debug(&self, message: &str);
}

/// Installation logger that writes to the `log` facade and optionally a file
pub struct InstallLogger {
    log_file: Arc<Mutex<Option<File>>>,
    log_path: Option<PathBuf>,
}

impl InstallLogger {
    /// Create a logger with a timestamped log file inside `log_dir`
    pub fn new(log_dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(log_dir)
            .map_err(|e| format!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let log_path = Self::create_log_path(log_dir);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| format!("Failed to create log file at {:?}: {}", log_path, e))?;

        let logger = Self {
            log_file: Arc::new(Mutex::new(Some(file))),
            log_path: Some(log_path.clone()),
        };

        logger.write_line("INFO", "=== zstd-setup Installation Log ===");
        logger.write_line("INFO", &format!("Version: {}", env!("CARGO_PKG_VERSION")));
        logger.write_line("INFO", &format!("Log file: {:?}", log_path));
        logger.write_line(
            "INFO",
            &format!("Started: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")),
        );
        logger.write_line("INFO", "");

        Ok(logger)
    }

    /// Create a logger that only forwards to the `log` facade
    pub fn console_only() -> Self {
        Self {
            log_file: Arc::new(Mutex::new(None)),
            log_path: None,
        }
    }

    fn create_log_path(log_dir: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        log_dir.join(format!("{}{}{}", LOG_FILE_PREFIX, timestamp, LOG_FILE_SUFFIX))
    }

    /// Path of the log file, if one is being written
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    fn write_line(&self, level: &str, message: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S");
        let formatted = format!("[{}] [{}] {}", timestamp, level, message);

        if let Ok(mut file_opt) = self.log_file.lock() {
            if let Some(ref mut file) = *file_opt {
                let _ = writeln!(file, "{}", formatted);
                let _ = file.flush();
            }
        }
    }

    /// Remove all but the newest `keep_count` install logs in `log_dir`
    pub fn cleanup_old_logs(log_dir: &Path, keep_count: usize) -> Result<(), String> {
        let mut log_files: Vec<PathBuf> = std::fs::read_dir(log_dir)
            .map_err(|e| format!("Failed to read log directory {:?}: {}", log_dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(LOG_FILE_PREFIX) && n.ends_with(LOG_FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first; the timestamped names break ties between equal mtimes
        log_files.sort_by_key(|path| {
            let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
            (modified, path.clone())
        });

        if log_files.len() > keep_count {
            let to_remove = log_files.len() - keep_count;
            for path in log_files.iter().take(to_remove) {
                let _ = std::fs::remove_file(path);
            }
        }

        Ok(())
    }

    /// Write the closing lines and report where the log went
    pub fn finalize(&self) {
        self.write_line("INFO", "");
        self.write_line(
            "INFO",
            &format!("Finished: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")),
        );
        if let Some(path) = &self.log_path {
            log::info!("Install log saved to: {}", path.display());
        }
    }
}

impl InstallLog for InstallLogger {
    fn info(&self, message: &str) {
        log::info!("{}", message);
        self.write_line("INFO", message);
    }

    fn debug(&self, message: &str) {
        log::debug!("{}", message);
        self.write_line("DEBUG", message);
    }
}

impl Drop for InstallLogger {
    fn drop(&mut self) {
        if let Ok(mut file_opt) = self.log_file.lock() {
            if let Some(ref mut file) = *file_opt {
                let _ = file.flush();
            }
        }
    }
}
