use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

pub const LOG_FILE: &str = "logs/sigil_chat.log";

/// `log` backend that appends to a file and echoes every line to stderr.
pub struct Logger {
    file: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(log_path: &str) -> std::io::Result<Self> {
        // Create logs directory if it doesn't exist
        if let Some(parent) = Path::new(log_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(log_path)?;

        Ok(Logger {
            file: Some(Mutex::new(file)),
        })
    }

    fn stderr_only() -> Self {
        Logger { file: None }
    }
}

fn format_line(level: Level, target: &str, message: &std::fmt::Arguments<'_>) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("[{timestamp}] [{level}] [{target}] {message}\n")
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), record.target(), record.args());

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(line.as_bytes());
                let _ = file.flush();
            }
        }
        eprint!("{line}");
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

// Global logger instance
lazy_static::lazy_static! {
    static ref LOGGER: Logger = Logger::new(LOG_FILE).unwrap_or_else(|e| {
        eprintln!("[LOGGER] Cannot open {LOG_FILE} ({e}), logging to stderr only");
        Logger::stderr_only()
    });
}

/// Install the global logger. Call once at startup.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&*LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

// Convenience macros
#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        ::log::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! sys_info {
    ($($arg:tt)*) => {
        ::log::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        ::log::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! sys_error {
    ($($arg:tt)*) => {
        ::log::error!($($arg)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let line = format_line(Level::Warn, "sigil_chat::web", &format_args!("disk {}", "full"));
        assert!(line.starts_with('['));
        assert!(line.ends_with("[WARN] [sigil_chat::web] disk full\n"));
    }

    #[test]
    fn test_new_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("app.log");
        let logger = Logger::new(path.to_str().unwrap()).unwrap();
        assert!(logger.file.is_some());
        assert!(path.exists());
    }
}
