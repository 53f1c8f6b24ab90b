//! Logging sinks.
//!
//! Two independent sinks are kept, mirroring the separation of concerns in
//! the tool this proxy is modeled on: `env_logger` carries ambient
//! diagnostic output honoring `RUST_LOG`, while [`AccessLog`] and
//! [`ErrorLog`] write the exact, stable formats a machine might parse,
//! regardless of the diagnostic logger's verbosity.

use std::path::PathBuf;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::registry::ConnectionInfo;

/// Initializes the ambient `log`/`env_logger` diagnostic logger.
pub fn init_diagnostic_logger(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

struct FileSink {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileSink {
    fn new(path: Option<PathBuf>) -> FileSink {
        FileSink {
            path: path.unwrap_or_default(),
            file: Mutex::new(None),
        }
    }

    fn disabled() -> FileSink {
        FileSink { path: PathBuf::new(), file: Mutex::new(None) }
    }

    async fn write_line(&self, line: &str) {
        if self.path.as_os_str().is_empty() {
            return;
        }

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path).await {
                Ok(f) => *guard = Some(f),
                Err(e) => {
                    log::error!("failed to open log file {}: {e}", self.path.display());
                    return;
                }
            }
        }

        if let Some(file) = guard.as_mut() {
            let mut line = line.to_string();
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                log::error!("failed to write log file {}: {e}", self.path.display());
            }
        }
    }
}

/// Access log: one line per completed connection, format
/// `YYYY-MM-DD HH:MM:SS <src-ip> <METHOD> <dst-host>`.
pub struct AccessLog {
    sink: FileSink,
}

impl AccessLog {
    pub fn new(path: Option<PathBuf>) -> AccessLog {
        AccessLog { sink: FileSink::new(path) }
    }

    pub fn disabled() -> AccessLog {
        AccessLog { sink: FileSink::disabled() }
    }

    pub async fn record(&self, info: &ConnectionInfo) {
        let line = format!(
            "{} {} {} {}",
            info.start_time.format("%Y-%m-%d %H:%M:%S"),
            info.src_ip,
            info.method,
            info.dst_host,
        );
        self.sink.write_line(&line).await;
    }
}

/// Error log: timestamped `[LEVEL]: <message>` lines for connection-level
/// failure traces.
pub struct ErrorLog {
    sink: FileSink,
    verbose: bool,
}

impl ErrorLog {
    pub fn new(path: Option<PathBuf>, verbose: bool) -> ErrorLog {
        ErrorLog { sink: FileSink::new(path), verbose }
    }

    pub fn disabled() -> ErrorLog {
        ErrorLog { sink: FileSink::disabled(), verbose: false }
    }

    /// Records `message` to the error-log file (if configured) and, when
    /// `verbose` was set, echoes a single `[NON-CRITICAL]` colored line to
    /// stderr so recovered per-connection errors stay visible without
    /// tailing a file.
    pub async fn record(&self, level: &str, message: &str) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{now} [{level}]: {message}");
        self.sink.write_line(&line).await;

        if self.verbose {
            eprintln!("\u{1b}[93m[NON-CRITICAL]:\u{1b}[97m {message}\u{1b}[0m");
        }
    }
}
