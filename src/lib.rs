pub mod app;
pub mod audio;
pub mod clock;
pub mod config;
pub mod engine;
mod lock;
pub mod monitor;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod whitelist;

pub(crate) use lock::lock_or_recover;
pub use app::{crash_log_path, init_logging, log_debug, log_file_path, log_panic};
pub use engine::{DuckingEngine, EngineSettings};
pub use monitor::{Monitor, MonitorOptions};
