//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start one flexi_logger backend per process from `LoggingSettings`.
//! - Route events to rotating files when a directory is configured, and to
//!   stderr otherwise.
//!
//! # Invariants
//! - Initialization never panics.
//! - Repeating initialization with the same settings is a no-op.
//! - Switching level or destination after start is rejected.

use crate::settings::LoggingSettings;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

const LOG_FILE_BASENAME: &str = "treeforge";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

/// Where log records are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Stderr,
    Directory(PathBuf),
}

impl Display for LogDestination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stderr => write!(f, "stderr"),
            Self::Directory(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    RelativeDirectory(PathBuf),
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    Backend(flexi_logger::FlexiLoggerError),
    /// Logging already runs with different settings.
    AlreadyInitialized {
        level: &'static str,
        destination: LogDestination,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => write!(
                f,
                "unsupported log level `{level}`; expected trace|debug|info|warn|error"
            ),
            Self::RelativeDirectory(path) => {
                write!(f, "log directory must be absolute, got `{}`", path.display())
            }
            Self::CreateDirectory { path, source } => write!(
                f,
                "failed to create log directory `{}`: {source}",
                path.display()
            ),
            Self::Backend(err) => write!(f, "failed to start logger: {err}"),
            Self::AlreadyInitialized { level, destination } => write!(
                f,
                "logging already initialized with level `{level}` at `{destination}`"
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            _ => None,
        }
    }
}

struct LoggingState {
    level: &'static str,
    destination: LogDestination,
    _logger: LoggerHandle,
}

/// Starts logging as described by `settings`.
///
/// # Errors
/// - `UnsupportedLevel` / `RelativeDirectory` for malformed settings.
/// - `AlreadyInitialized` when logging runs with other settings.
/// - `CreateDirectory` / `Backend` when the backend cannot start.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let level = normalize_level(&settings.level)?;
    let destination = match &settings.directory {
        Some(path) if !path.is_absolute() => {
            return Err(LoggingError::RelativeDirectory(path.clone()));
        }
        Some(path) => LogDestination::Directory(path.clone()),
        None => LogDestination::Stderr,
    };

    let state = LOGGING_STATE
        .get_or_try_init(|| start_backend(level, destination.clone()))?;
    if state.level != level || state.destination != destination {
        return Err(LoggingError::AlreadyInitialized {
            level: state.level,
            destination: state.destination.clone(),
        });
    }
    Ok(())
}

/// Returns `(level, destination)` once logging is active.
pub fn logging_status() -> Option<(&'static str, LogDestination)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.destination.clone()))
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_backend(
    level: &'static str,
    destination: LogDestination,
) -> Result<LoggingState, LoggingError> {
    let logger = Logger::try_with_str(level).map_err(LoggingError::Backend)?;
    let logger = match &destination {
        LogDestination::Stderr => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::detailed_format),
        LogDestination::Directory(path) => {
            std::fs::create_dir_all(path).map_err(|source| LoggingError::CreateDirectory {
                path: path.clone(),
                source,
            })?;
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(path.as_path())
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
        }
    };
    let handle = logger.start().map_err(LoggingError::Backend)?;

    install_panic_hook_once();
    info!(
        "event=logging_init module=core status=ok level={} destination={} version={}",
        level,
        destination,
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        level,
        destination,
        _logger: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Payloads may carry item names; keep them on one line and short.
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(message) = panic_info.payload().downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = panic_info.payload().downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut truncated = flattened.chars().take(max_chars).collect::<String>();
    if flattened.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::{
        init_logging, logging_status, normalize_level, single_line, LogDestination, LoggingError,
    };
    use crate::settings::LoggingSettings;
    use std::path::PathBuf;

    #[test]
    fn level_names_are_normalized() {
        assert_eq!(normalize_level(" WARNING ").expect("warning"), "warn");
        assert_eq!(normalize_level("Info").expect("info"), "info");
        assert!(matches!(
            normalize_level("verbose"),
            Err(LoggingError::UnsupportedLevel(_))
        ));
    }

    #[test]
    fn single_line_flattens_and_truncates() {
        let value = single_line("first\nsecond\rthird", 8);
        assert!(!value.contains('\n'));
        assert!(!value.contains('\r'));
        assert!(value.ends_with("..."));
        assert_eq!(single_line("short", 8), "short");
    }

    #[test]
    fn relative_directory_is_rejected_before_start() {
        let settings = LoggingSettings {
            level: "info".to_string(),
            directory: Some(PathBuf::from("logs/dev")),
        };
        assert!(matches!(
            init_logging(&settings),
            Err(LoggingError::RelativeDirectory(_))
        ));
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicting_settings() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = LoggingSettings {
            level: "info".to_string(),
            directory: Some(dir.path().join("logs")),
        };

        init_logging(&settings).expect("first init");
        init_logging(&settings).expect("same settings are idempotent");

        let louder = LoggingSettings {
            level: "debug".to_string(),
            ..settings.clone()
        };
        assert!(matches!(
            init_logging(&louder),
            Err(LoggingError::AlreadyInitialized { .. })
        ));
        let to_stderr = LoggingSettings {
            directory: None,
            ..settings.clone()
        };
        assert!(matches!(
            init_logging(&to_stderr),
            Err(LoggingError::AlreadyInitialized { .. })
        ));

        let (level, destination) = logging_status().expect("logging active");
        assert_eq!(level, "info");
        assert_eq!(
            destination,
            LogDestination::Directory(dir.path().join("logs"))
        );
    }
}
