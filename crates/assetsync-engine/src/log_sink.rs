//! Per-asset buffered logging.
//!
//! Worker tasks collect their lines in an [`AssetLog`] and hand the finished
//! block to the [`LogSink`] writer task through a channel. The writer emits
//! each block in one piece, so the lines of one asset stay together even when
//! many assets are processed at the same time.
//!
//! ```text
//!   task A ── AssetLog ──┐
//!   task B ── AssetLog ──┼──► mpsc ──► writer ──► tracing
//!   task C ── AssetLog ──┘                   └──► log file (optional)
//! ```

use chrono::Local;
use std::fmt;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};

/// Severity of a buffered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lines logged while processing one asset.
#[derive(Debug, Clone, Default)]
pub struct AssetLog {
    asset: String,
    entries: Vec<(LogLevel, String)>,
}

impl AssetLog {
    #[must_use]
    pub fn new(asset: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            entries: Vec::new(),
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.entries.push((level, message.into()));
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn entries(&self) -> &[(LogLevel, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|(_, m)| m.contains(needle))
    }
}

/// Log sink settings.
#[derive(Debug, Clone, Default)]
pub struct LogSinkConfig {
    /// File that receives a copy of every line.
    pub file: Option<PathBuf>,
    /// Prefix file lines with `[DRYRUN]`.
    pub dry_run: bool,
}

/// Cloneable sender side handed to worker tasks.
#[derive(Debug, Clone)]
pub struct LogHandle {
    tx: mpsc::UnboundedSender<AssetLog>,
}

impl LogHandle {
    /// Queue a finished block for writing.
    pub fn flush(&self, log: AssetLog) {
        if log.is_empty() {
            return;
        }
        if let Err(e) = self.tx.send(log) {
            // Writer already gone; keep the lines visible.
            emit(&e.0);
        }
    }
}

/// Single writer for all asset log blocks.
pub struct LogSink {
    handle: LogHandle,
    writer: JoinHandle<SyncResult<()>>,
}

impl LogSink {
    /// Open the log file (if any) and start the writer task.
    pub async fn start(config: LogSinkConfig) -> SyncResult<Self> {
        let file = match &config.file {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| {
                        SyncError::configuration(format!(
                            "cannot open log file {}: {e}",
                            path.display()
                        ))
                    })?,
            ),
            None => None,
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<AssetLog>();
        let dry_run = config.dry_run;

        let writer = tokio::spawn(async move {
            let mut file = file;
            while let Some(log) = rx.recv().await {
                emit(&log);
                if let Some(f) = file.as_mut() {
                    let block = render_block(&log, dry_run);
                    f.write_all(block.as_bytes())
                        .await
                        .map_err(|e| SyncError::source(format!("log write failed: {e}")))?;
                }
            }
            if let Some(f) = file.as_mut() {
                f.flush()
                    .await
                    .map_err(|e| SyncError::source(format!("log flush failed: {e}")))?;
            }
            Ok::<(), SyncError>(())
        });

        Ok(Self {
            handle: LogHandle { tx },
            writer,
        })
    }

    #[must_use]
    pub fn handle(&self) -> LogHandle {
        self.handle.clone()
    }

    pub fn flush(&self, log: AssetLog) {
        self.handle.flush(log);
    }

    /// Wait until every queued block is written.
    ///
    /// Blocks are drained once all [`LogHandle`] clones have been dropped.
    pub async fn shutdown(self) -> SyncResult<()> {
        drop(self.handle);
        self.writer.await.map_err(|e| SyncError::Task {
            message: e.to_string(),
        })?
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

fn emit(log: &AssetLog) {
    let asset = log.asset();
    for (level, message) in log.entries() {
        match level {
            LogLevel::Debug => debug!(asset, "{message}"),
            LogLevel::Info => info!(asset, "{message}"),
            LogLevel::Warn => warn!(asset, "{message}"),
            LogLevel::Error => error!(asset, "{message}"),
        }
    }
}

fn render_block(log: &AssetLog, dry_run: bool) -> String {
    let prefix = if dry_run { "[DRYRUN] " } else { "" };
    let mut block = String::new();
    for (level, message) in log.entries() {
        let timestamp = Local::now().format("%Y/%m/%d %H:%M:%S");
        block.push_str(&format!("{prefix}{timestamp} [{level}] {message}\n"));
    }
    block
}
