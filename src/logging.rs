//! Logging setup using tracing.
//!
//! [`init`] installs the subscriber once at process start and returns a
//! [`LoggingHandle`]. The handle is passed to the scheduler and pipeline,
//! which parent their spans on it, and flushes the optional log file when it
//! is dropped at shutdown.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::Span;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level when `RUST_LOG` is unset.
    ///
    /// Default: "info"
    pub level: String,

    /// Also append log lines (without colors) to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LogConfig {
    /// Level after applying `-v` (positive) or `-q` (negative) steps.
    pub fn effective_level(&self, verbosity: i8) -> &'static str {
        let base = LEVELS
            .iter()
            .position(|l| l.eq_ignore_ascii_case(&self.level))
            .unwrap_or(2) as i8;
        let index = (base + verbosity).clamp(0, LEVELS.len() as i8 - 1);
        LEVELS[index as usize]
    }
}

/// Process-wide logging context.
pub struct LoggingHandle {
    root: Span,
    file: Option<SharedFile>,
}

impl LoggingHandle {
    /// A handle that parents nothing and writes nowhere. Used when the
    /// engine is embedded without [`init`].
    pub fn disabled() -> Self {
        Self {
            root: Span::none(),
            file: None,
        }
    }

    /// Span that engine components parent their own spans on.
    pub fn span(&self) -> Span {
        self.root.clone()
    }

    pub fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init(config: &LogConfig, verbosity: i8) -> Result<LoggingHandle> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.effective_level(verbosity)));

    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(io::stderr);

    let file = match &config.file {
        Some(path) => {
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(SharedFile::new(handle))
        }
        None => None,
    };

    let file_layer = file
        .clone()
        .map(|writer| fmt::layer().with_ansi(false).with_writer(writer));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingHandle {
        root: tracing::info_span!("pentrail"),
        file,
    })
}

/// Buffered log file shared between the subscriber and the handle.
#[derive(Clone)]
struct SharedFile(Arc<Mutex<BufWriter<File>>>);

impl SharedFile {
    fn new(file: File) -> Self {
        Self(Arc::new(Mutex::new(BufWriter::new(file))))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufWriter<File>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = SharedFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level_steps() {
        let config = LogConfig::default();
        assert_eq!(config.effective_level(0), "info");
        assert_eq!(config.effective_level(1), "debug");
        assert_eq!(config.effective_level(5), "trace");
        assert_eq!(config.effective_level(-1), "warn");
        assert_eq!(config.effective_level(-9), "error");
    }

    #[test]
    fn test_effective_level_unknown_falls_back_to_info() {
        let config = LogConfig {
            level: "loud".to_string(),
            file: None,
        };
        assert_eq!(config.effective_level(0), "info");
    }

    #[test]
    fn test_disabled_handle_has_no_span() {
        let handle = LoggingHandle::disabled();
        assert!(handle.span().is_none());
        handle.flush();
    }
}
