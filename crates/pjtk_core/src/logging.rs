//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start the rotating `pjtk.log` file logger once per process.
//! - Record panics as single-line `event=panic` entries.
//!
//! # Invariants
//! - A repeated call with the same level and directory succeeds without effect.
//! - A call with another level or directory fails; the running logger stays.
//! - Nothing in here panics.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};
use std::sync::Once;

const BASENAME: &str = "pjtk";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEEP_FILES: usize = 5;
const PANIC_TEXT_LIMIT: usize = 160;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: Once = Once::new();

/// Validated logger settings: a canonical level name and an absolute directory.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    dir: PathBuf,
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

#[derive(Debug)]
pub enum LoggingError {
    UnsupportedLevel(String),
    EmptyDirectory,
    CreateDirectory { dir: PathBuf, source: std::io::Error },
    /// A logger is already running with a different level or directory.
    AlreadyInitialized { active: String, requested: String },
    Backend(String),
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLevel(level) => {
                write!(f, "log level `{level}` is not one of {}", LEVELS.join("|"))
            }
            Self::EmptyDirectory => f.write_str("log directory is empty"),
            Self::CreateDirectory { dir, source } => {
                write!(f, "cannot create log directory {}: {source}", dir.display())
            }
            Self::AlreadyInitialized { active, requested } => write!(
                f,
                "logger already running with {active}; cannot reconfigure to {requested}"
            ),
            Self::Backend(message) => write!(f, "logger backend failed: {message}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::CreateDirectory { source, .. } = self {
            Some(source)
        } else {
            None
        }
    }
}

impl LogSettings {
    fn resolve(level: &str, dir: &Path) -> Result<Self, LoggingError> {
        let wanted = level.trim().to_ascii_lowercase();
        let wanted = if wanted == "warning" { "warn".to_string() } else { wanted };
        let level = LEVELS
            .iter()
            .copied()
            .find(|known| *known == wanted)
            .ok_or(LoggingError::UnsupportedLevel(wanted))?;

        if dir.as_os_str().is_empty() {
            return Err(LoggingError::EmptyDirectory);
        }
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| LoggingError::CreateDirectory {
                    dir: dir.to_path_buf(),
                    source,
                })?
                .join(dir)
        };
        Ok(Self { level, dir })
    }

    fn describe(&self) -> String {
        format!("level={} dir={}", self.level, self.dir.display())
    }
}

/// Starts file logging under `log_dir` at `level`.
///
/// Relative directories resolve against the working directory. With
/// `echo_stderr`, warnings and errors are copied to stderr as well.
pub fn init_logging(level: &str, log_dir: &Path, echo_stderr: bool) -> Result<(), LoggingError> {
    let requested = LogSettings::resolve(level, log_dir)?;
    let active = ACTIVE.get_or_try_init(|| start(requested.clone(), echo_stderr))?;
    if active.settings == requested {
        Ok(())
    } else {
        Err(LoggingError::AlreadyInitialized {
            active: active.settings.describe(),
            requested: requested.describe(),
        })
    }
}

/// `(level, directory)` of the running logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE
        .get()
        .map(|active| (active.settings.level, active.settings.dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start(settings: LogSettings, echo_stderr: bool) -> Result<ActiveLogger, LoggingError> {
    std::fs::create_dir_all(&settings.dir).map_err(|source| LoggingError::CreateDirectory {
        dir: settings.dir.clone(),
        source,
    })?;

    let backend = |err: flexi_logger::FlexiLoggerError| LoggingError::Backend(err.to_string());
    let handle = Logger::try_with_str(settings.level)
        .map_err(backend)?
        .log_to_file(FileSpec::default().directory(&settings.dir).basename(BASENAME))
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .duplicate_to_stderr(if echo_stderr { Duplicate::Warn } else { Duplicate::None })
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(backend)?;

    PANIC_HOOK.call_once(install_panic_hook);
    info!(
        "event=logging_init module=core status=ok version={} os={} {}",
        crate::core_version(),
        std::env::consts::OS,
        settings.describe()
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn install_panic_hook() {
    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let at = info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        error!(
            "event=panic module=core status=error at={at} message={}",
            panic_text(info)
        );
        chained(info);
    }));
}

fn panic_text(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>");
    one_line(text, PANIC_TEXT_LIMIT)
}

/// Joins lines and caps the length so a log entry never spans rows.
fn one_line(text: &str, limit: usize) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(limit)
        .collect();
    if text.chars().nth(limit).is_some() {
        out.push_str("...");
    }
    out
}
