//! Process-wide concerns shared by the library and the binary.

mod logging;

pub(crate) use logging::logging_enabled;
pub use logging::{crash_log_path, init_logging, log_debug, log_file_path, log_panic};
