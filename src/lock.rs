use std::sync::{Mutex, MutexGuard};

/// Take the engine lock even if a previous holder panicked mid-tick; the state
/// it guards stays structurally valid between ticks.
pub(crate) fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            crate::log_debug(&format!("Mutex poisoned in {context}; recovering"));
            poisoned.into_inner()
        }
    }
}
