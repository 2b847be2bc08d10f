//! Process-wide logging bootstrap.
//!
//! stdout carries IPC responses, so logs go either to a rotating file set or
//! to stderr. Events are `event=<name> key=value` lines and never include
//! free-text user input such as absence reasons.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::info;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "attendanced";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;

static LOGGER: OnceCell<ActiveLogger> = OnceCell::new();

struct ActiveLogger {
    level: &'static str,
    log_dir: Option<PathBuf>,
    _handle: LoggerHandle,
}

/// Starts the logger once. Later calls with identical settings are no-ops;
/// differing settings are refused.
pub fn init_logging(level: &str, log_dir: Option<&Path>) -> Result<(), String> {
    let level = normalize_level(level)?;
    let active = LOGGER.get_or_try_init(|| start_logger(level, log_dir))?;
    if active.level != level || active.log_dir.as_deref() != log_dir {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to reconfigure",
            active.level
        ));
    }
    Ok(())
}

fn start_logger(level: &'static str, log_dir: Option<&Path>) -> Result<ActiveLogger, String> {
    let logger = Logger::try_with_str(level)
        .map_err(|e| format!("invalid log level `{level}`: {e}"))?;
    let handle = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                format!("failed to create log directory `{}`: {e}", dir.display())
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(dir)
                        .basename(LOG_FILE_BASENAME),
                )
                .rotate(
                    Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(MAX_LOG_FILES),
                )
                .write_mode(WriteMode::BufferAndFlush)
                .append()
                .format_for_files(flexi_logger::detailed_format)
                .start()
        }
        None => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::default_format)
            .start(),
    }
    .map_err(|e| format!("failed to start logger: {e}"))?;

    info!(
        "event=daemon_start status=ok version={} level={} sink={}",
        env!("CARGO_PKG_VERSION"),
        level,
        log_dir
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "stderr".to_string())
    );

    Ok(ActiveLogger {
        level,
        log_dir: log_dir.map(Path::to_path_buf),
        _handle: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        "off" => Ok("off"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error|off"
        )),
    }
}
