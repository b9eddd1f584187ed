use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;

/// Global shutdown flag
///
/// Set when SIGINT/SIGTERM arrives. The script runner checks it between
/// steps and the upload driver before every job.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Which signal triggered shutdown
///
/// Values: 0 = none, 1 = SIGINT, 2 = SIGTERM
pub static SIGNAL_TYPE: AtomicU8 = AtomicU8::new(0);

/// Checks if graceful shutdown has been requested
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Request shutdown with signal type for later logging
///
/// Only sets atomic flags; logging is left to the caller's thread.
///
/// # Arguments
/// * `signal_type` - 1 for SIGINT, 2 for SIGTERM
pub fn request_shutdown_with_signal(signal_type: u8) {
    SIGNAL_TYPE.store(signal_type, Ordering::SeqCst);
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Name of the signal that triggered shutdown, if any
pub fn signal_name() -> Option<&'static str> {
    match SIGNAL_TYPE.load(Ordering::SeqCst) {
        0 => None,
        1 => Some("SIGINT"),
        _ => Some("SIGTERM"),
    }
}

/// Routes SIGINT and SIGTERM to the shutdown flag
///
/// A background thread waits for the first signal; open transfers finish
/// their current step and the drivers stop before the next one.
pub fn install_signal_handlers() -> io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let signal_type = match sig {
                SIGTERM => 2,
                _ => 1,
            };
            request_shutdown_with_signal(signal_type);
        }
    });

    Ok(())
}

/// Reset the shutdown flag between test cases
#[cfg(test)]
pub fn reset_shutdown_for_tests() {
    SHUTDOWN_REQUESTED.store(false, Ordering::SeqCst);
    SIGNAL_TYPE.store(0, Ordering::SeqCst);
}
