//! Boundary to the OS per-application audio mixer.
//!
//! The ducking engine only talks to [`AudioSessionProvider`]. Every call is
//! individually fallible and callers treat a failure as "no data for this
//! process" rather than aborting the whole operation.

mod memory;
#[cfg(target_os = "linux")]
mod pactl;

pub use memory::InMemorySessions;
#[cfg(target_os = "linux")]
pub use pactl::PactlSessions;

use thiserror::Error;

/// One audio-capable process as reported by the mixer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionInfo {
    pub pid: u32,
    /// Master volume, 0 to 100.
    pub volume_percent: f32,
}

/// One entry of the OS process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("process {0} is gone")]
    ProcessGone(u32),
    #[error("access to process {0} denied")]
    AccessDenied(u32),
    #[error("audio backend error: {0}")]
    Backend(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Per-process volume, peak and identity lookups.
///
/// Implementations must be fast and synchronous: the engine calls them while
/// holding its state lock.
pub trait AudioSessionProvider: Send + Sync {
    /// All processes that currently own an audio session.
    fn list_sessions(&self) -> SessionResult<Vec<SessionInfo>>;

    /// Volume percentage (0 to 100), or `None` when the process has no session.
    fn get_volume(&self, pid: u32) -> SessionResult<Option<f32>>;

    /// Set volume percentage (0 to 100). No-op when the session is absent.
    fn set_volume(&self, pid: u32, volume_percent: f32) -> SessionResult<()>;

    /// Normalized 0 to 1 peak meter reading, or `None` when absent.
    fn get_peak(&self, pid: u32) -> SessionResult<Option<f32>>;

    /// Executable path for `pid`; empty when the lookup is not permitted.
    fn resolve_executable_path(&self, pid: u32) -> String;

    /// Current OS process table.
    fn list_processes(&self) -> SessionResult<Vec<ProcessInfo>>;

    fn name(&self) -> &'static str {
        "unknown_provider"
    }
}
