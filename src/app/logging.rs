use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const DEBUG_LOG_CAP: u64 = 5 * 1024 * 1024;
const CRASH_LOG_CAP: u64 = 256 * 1024;
static ENABLED: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: Mutex<Option<CappedLog>> = Mutex::new(None);

/// Debug log in the temp dir, kept across runs until it hits its cap.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("autoduck.log")
}

pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("autoduck_crash.log")
}

/// Logging is on with `--logs` or `--log-timings`, unless `--no-logs` wins.
pub(crate) fn logging_enabled(config: &AppConfig) -> bool {
    (config.logs || config.log_timings) && !config.no_logs
}

/// Append-only file that starts over once `cap` bytes would be exceeded.
struct CappedLog {
    path: PathBuf,
    file: fs::File,
    cap: u64,
    len: u64,
}

impl CappedLog {
    fn open(path: &Path, cap: u64) -> Option<Self> {
        let existing = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let fresh = existing > cap;
        let file = open_log(path, fresh)?;
        Some(Self {
            path: path.to_path_buf(),
            file,
            cap,
            len: if fresh { 0 } else { existing },
        })
    }

    fn append(&mut self, line: &str) {
        let line_len = line.len() as u64;
        if self.len.saturating_add(line_len) > self.cap {
            let Some(file) = open_log(&self.path, true) else {
                return;
            };
            self.file = file;
            self.len = 0;
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.len = self.len.saturating_add(line_len);
        }
    }
}

fn open_log(path: &Path, truncate: bool) -> Option<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    options.open(path).ok()
}

// Not `lock_or_recover`: that helper logs through here.
fn debug_log() -> MutexGuard<'static, Option<CappedLog>> {
    DEBUG_LOG.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Configure logging based on CLI flags or environment.
pub fn init_logging(config: &AppConfig) {
    let enabled = logging_enabled(config);
    ENABLED.store(enabled, Ordering::Relaxed);
    let mut log = debug_log();
    *log = if enabled {
        CappedLog::open(&log_file_path(), DEBUG_LOG_CAP)
    } else {
        None
    };
}

/// Append a timestamped line to the debug log when logging is enabled.
pub fn log_debug(msg: &str) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] {msg}\n", unix_millis());
    if let Some(log) = debug_log().as_mut() {
        log.append(&line);
    }
}

/// Record a panic location and message in the crash log.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|text| (*text).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    let line = format!(
        "[{}] autoduck v{} panicked at {location}: {payload}\n",
        unix_millis(),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(mut log) = CappedLog::open(&crash_log_path(), CRASH_LOG_CAP) {
        log.append(&line);
    }
}
