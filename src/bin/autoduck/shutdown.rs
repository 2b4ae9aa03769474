use std::sync::atomic::{AtomicBool, Ordering};

/// Set by SIGINT/SIGTERM so the main loop can restore volumes before exiting.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Only touches an atomic (async-signal-safe).
#[cfg(unix)]
extern "C" fn handle_shutdown(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn install_handlers() -> anyhow::Result<()> {
    use anyhow::anyhow;
    use autoduck::log_debug;

    for (signal, label) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_shutdown is an extern "C" handler that only flips an
            // atomic flag, which is async-signal-safe.
            let handler = handle_shutdown as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                log_debug(&format!("failed to install {label} handler"));
                return Err(anyhow!("failed to install {label} handler"));
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install_handlers() -> anyhow::Result<()> {
    Ok(())
}

pub(crate) fn requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
pub(crate) fn request() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}
