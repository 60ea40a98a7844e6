//! Session logger — writes all log output to a single file in the OS data directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\LumenFE\lumenfe.log`
//!   Linux:    `~/.local/share/LumenFE/lumenfe.log`
//!   macOS:    `~/Library/Application Support/LumenFE/lumenfe.log`
//!
//! Usage — anywhere in the crate use the `log_info!` / `log_warn!` / `log_err!`
//! macros.  They emit `tracing` events under the `lumenfe` target, so tests and
//! embedding applications can attach their own subscriber instead of calling
//! [`init`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable holding an `EnvFilter` directive (e.g. `lumenfe=debug`).
pub const LOG_ENV: &str = "LUMENFE_LOG";

static LOG_FILE: OnceLock<Arc<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Write a raw line straight to the session file, bypassing the subscriber.
/// Used for the session header and the panic hook.  I/O errors are ignored.
pub fn write_line(line: &str) {
    if let Some(file) = LOG_FILE.get() {
        let _ = writeln!(&**file, "{}", line);
    }
}

/// Emit one message at `level`.  Backing function for the log macros.
pub fn write(level: Level, msg: &str) {
    match level {
        Level::ERROR => tracing::error!(target: "lumenfe", "{}", msg),
        Level::WARN => tracing::warn!(target: "lumenfe", "{}", msg),
        Level::INFO => tracing::info!(target: "lumenfe", "{}", msg),
        Level::DEBUG => tracing::debug!(target: "lumenfe", "{}", msg),
        Level::TRACE => tracing::trace!(target: "lumenfe", "{}", msg),
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write(::tracing::Level::INFO, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write(::tracing::Level::WARN, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write(::tracing::Level::ERROR, &format!($($arg)*))
    };
}

/// Initialise the session logger.  Call once before any logging.
///
/// * Creates (or truncates) the log file.
/// * Installs a global `tracing` subscriber writing to that file, filtered by
///   [`LOG_ENV`] (default `info`).  With `verbose`, warnings and errors are
///   mirrored to stderr.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init(verbose: bool) {
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    let file = match file {
        Ok(f) => Arc::new(f),
        Err(e) => {
            // Not fatal: fall back to stderr-only logging
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            install_subscriber(None, true);
            return;
        }
    };
    let _ = LOG_PATH.set(path.clone());
    let _ = LOG_FILE.set(file.clone());

    write_line(&format!(
        "=== LumenFE session started {} ===",
        human_timestamp()
    ));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    install_subscriber(Some(file), verbose);

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] PANIC: {}", timestamp(), info));
        prev(info);
    }));
}

fn install_subscriber(file: Option<Arc<File>>, to_stderr: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    // Without a file, stderr is the only sink and carries everything
    let floor = if file.is_some() { LevelFilter::WARN } else { LevelFilter::TRACE };
    let file_layer = file.map(|f| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(f)
    });
    let stderr_layer = to_stderr.then(|| mirror_layer(std::io::stderr, floor));
    // A subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}

/// Console layer showing only events at `floor` or above.
fn mirror_layer<S, W>(make_writer: W, floor: LevelFilter) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(make_writer)
        .with_filter(floor)
}

fn log_file_path() -> PathBuf {
    data_dir().join("LumenFE").join("lumenfe.log")
}

/// Platform data directory (without the app sub-folder).
pub(crate) fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// HH:MM:SS within the current UTC day.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            let h = (secs % 86400) / 3600;
            let m = (secs % 3600) / 60;
            let s = secs % 60;
            format!("{:02}:{:02}:{:02}", h, m, s)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}
