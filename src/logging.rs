use chrono::Local;
use once_cell::sync::Lazy;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Global log file path protected by Mutex
///
/// Thread-safe storage for optional log file path.
/// When None, logs go to stdout.
pub static LOG_FILE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

/// Wire tracing switch
///
/// When set, `log_debug` messages (commands sent, replies received,
/// data channel endpoints) are written alongside regular log lines.
pub static DEBUG: AtomicBool = AtomicBool::new(false);

/// Logs a message with timestamp to configured output
///
/// # Arguments
/// * `message` - The message to log
///
/// # Returns
/// * `io::Result<()>` - Ok on success, Err if writing fails
///
/// # Example
/// ```text
/// // log("Connected to ftp://localhost:2121").unwrap();
/// ```
pub fn log(message: &str) -> io::Result<()> {
    log_with_thread(message, None)
}

/// Logs a message with timestamp and optional worker ID
///
/// Used by the parallel upload driver to tell workers apart
///
/// # Arguments
/// * `message` - The message to log
/// * `thread_id` - Optional worker identifier
///
/// # Returns
/// * `io::Result<()>` - Ok on success, Err if writing fails
pub fn log_with_thread(message: &str, thread_id: Option<usize>) -> io::Result<()> {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let log_message = match thread_id {
        Some(tid) => format!("{} [T{}] {}\n", timestamp, tid, message),
        None => format!("{} {}\n", timestamp, message),
    };

    match &*LOG_FILE.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) {
        Some(log_file) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_file)?;
            file.write_all(log_message.as_bytes())?;
        }
        None => {
            print!("{}", log_message);
        }
    }

    Ok(())
}

/// Logs a wire trace message, only when debug output is enabled
pub fn log_debug(message: &str) -> io::Result<()> {
    if is_debug() {
        log(&format!("[debug] {}", message))
    } else {
        Ok(())
    }
}

/// Enables or disables wire tracing
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::SeqCst);
}

pub fn is_debug() -> bool {
    DEBUG.load(Ordering::SeqCst)
}

/// Sets the path for the log file
///
/// Subsequent calls to the log functions append to this file.
pub fn set_log_file<P: AsRef<Path>>(path: P) {
    let path_str = path.as_ref().to_string_lossy().into_owned();
    *LOG_FILE.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(path_str);
}
