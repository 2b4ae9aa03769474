use super::{AudioSessionProvider, ProcessInfo, SessionError, SessionInfo, SessionResult};
use crate::lock_or_recover;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakeProcess {
    name: String,
    path: String,
    volume: Option<f32>,
    peak: Option<f32>,
    path_denied: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    processes: BTreeMap<u32, FakeProcess>,
    set_calls: Vec<(u32, f32)>,
    list_session_calls: usize,
    failing_set: BTreeSet<u32>,
    fail_listing: bool,
}

/// Process table and mixer kept entirely in memory.
///
/// Backs `--simulate` runs and every engine test. All mutations go through
/// `&self` so the same instance can be shared with the engine behind an `Arc`
/// while a test keeps poking at it.
#[derive(Debug, Default)]
pub struct InMemorySessions {
    state: Mutex<MemoryState>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running process that has no audio session.
    pub fn add_process(&self, pid: u32, name: &str, path: &str) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::add_process");
        state.processes.insert(
            pid,
            FakeProcess {
                name: name.to_string(),
                path: path.to_string(),
                volume: None,
                peak: None,
                path_denied: false,
            },
        );
    }

    /// Register a running process with an audio session at `volume`.
    pub fn add_session(&self, pid: u32, name: &str, path: &str, volume: f32) {
        self.add_process(pid, name, path);
        let mut state = lock_or_recover(&self.state, "InMemorySessions::add_session");
        if let Some(process) = state.processes.get_mut(&pid) {
            process.volume = Some(volume);
            process.peak = Some(0.0);
        }
    }

    pub fn remove_process(&self, pid: u32) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::remove_process");
        state.processes.remove(&pid);
    }

    pub fn set_peak(&self, pid: u32, peak: f32) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::set_peak");
        if let Some(process) = state.processes.get_mut(&pid) {
            process.peak = Some(peak.clamp(0.0, 1.0));
        }
    }

    /// Change a volume the way the user would from the OS mixer; not recorded
    /// as an engine call.
    pub fn set_external_volume(&self, pid: u32, volume: f32) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::set_external_volume");
        if let Some(process) = state.processes.get_mut(&pid) {
            process.volume = Some(volume);
        }
    }

    /// Make path lookups for `pid` behave like a protected system process.
    pub fn deny_path(&self, pid: u32) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::deny_path");
        if let Some(process) = state.processes.get_mut(&pid) {
            process.path_denied = true;
        }
    }

    pub fn fail_set_volume(&self, pid: u32) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::fail_set_volume");
        state.failing_set.insert(pid);
    }

    /// Make both session and process listing fail until cleared.
    pub fn fail_listing(&self, fail: bool) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::fail_listing");
        state.fail_listing = fail;
    }

    pub fn volume(&self, pid: u32) -> Option<f32> {
        let state = lock_or_recover(&self.state, "InMemorySessions::volume");
        state.processes.get(&pid).and_then(|process| process.volume)
    }

    /// Every successful `set_volume` call the engine made, in order.
    pub fn set_volume_calls(&self) -> Vec<(u32, f32)> {
        lock_or_recover(&self.state, "InMemorySessions::set_volume_calls")
            .set_calls
            .clone()
    }

    pub fn list_session_calls(&self) -> usize {
        lock_or_recover(&self.state, "InMemorySessions::list_session_calls").list_session_calls
    }

    pub fn clear_calls(&self) {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::clear_calls");
        state.set_calls.clear();
        state.list_session_calls = 0;
    }
}

impl AudioSessionProvider for InMemorySessions {
    fn list_sessions(&self) -> SessionResult<Vec<SessionInfo>> {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::list_sessions");
        state.list_session_calls += 1;
        if state.fail_listing {
            return Err(SessionError::Backend("session listing disabled".to_string()));
        }
        Ok(state
            .processes
            .iter()
            .filter_map(|(pid, process)| {
                process.volume.map(|volume_percent| SessionInfo {
                    pid: *pid,
                    volume_percent,
                })
            })
            .collect())
    }

    fn get_volume(&self, pid: u32) -> SessionResult<Option<f32>> {
        let state = lock_or_recover(&self.state, "InMemorySessions::get_volume");
        Ok(state.processes.get(&pid).and_then(|process| process.volume))
    }

    fn set_volume(&self, pid: u32, volume_percent: f32) -> SessionResult<()> {
        let mut state = lock_or_recover(&self.state, "InMemorySessions::set_volume");
        if state.failing_set.contains(&pid) {
            return Err(SessionError::AccessDenied(pid));
        }
        let Some(process) = state.processes.get_mut(&pid) else {
            return Ok(());
        };
        if process.volume.is_none() {
            return Ok(());
        }
        let volume_percent = volume_percent.clamp(0.0, 100.0);
        process.volume = Some(volume_percent);
        state.set_calls.push((pid, volume_percent));
        Ok(())
    }

    fn get_peak(&self, pid: u32) -> SessionResult<Option<f32>> {
        let state = lock_or_recover(&self.state, "InMemorySessions::get_peak");
        match state.processes.get(&pid) {
            Some(process) => Ok(process.peak),
            None => Err(SessionError::ProcessGone(pid)),
        }
    }

    fn resolve_executable_path(&self, pid: u32) -> String {
        let state = lock_or_recover(&self.state, "InMemorySessions::resolve_executable_path");
        match state.processes.get(&pid) {
            Some(process) if !process.path_denied => process.path.clone(),
            _ => String::new(),
        }
    }

    fn list_processes(&self) -> SessionResult<Vec<ProcessInfo>> {
        let state = lock_or_recover(&self.state, "InMemorySessions::list_processes");
        if state.fail_listing {
            return Err(SessionError::Backend("process listing disabled".to_string()));
        }
        Ok(state
            .processes
            .iter()
            .map(|(pid, process)| ProcessInfo {
                pid: *pid,
                name: process.name.clone(),
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_processes_with_sessions() {
        let sessions = InMemorySessions::new();
        sessions.add_session(10, "spotify", "/usr/bin/spotify", 80.0);
        sessions.add_process(11, "bash", "/usr/bin/bash");
        let listed = sessions.list_sessions().expect("list");
        assert_eq!(
            listed,
            vec![SessionInfo {
                pid: 10,
                volume_percent: 80.0
            }]
        );
        assert_eq!(sessions.list_processes().expect("processes").len(), 2);
    }

    #[test]
    fn set_volume_skips_missing_sessions() {
        let sessions = InMemorySessions::new();
        sessions.add_process(11, "bash", "/usr/bin/bash");
        sessions.set_volume(11, 10.0).expect("no-op");
        sessions.set_volume(99, 10.0).expect("no-op");
        assert!(sessions.set_volume_calls().is_empty());
    }

    #[test]
    fn denied_path_resolves_empty() {
        let sessions = InMemorySessions::new();
        sessions.add_process(4, "System", "/system");
        sessions.deny_path(4);
        assert_eq!(sessions.resolve_executable_path(4), "");
        assert_eq!(sessions.resolve_executable_path(5), "");
    }

    #[test]
    fn peak_for_missing_process_is_an_error() {
        let sessions = InMemorySessions::new();
        assert_eq!(sessions.get_peak(3), Err(SessionError::ProcessGone(3)));
    }
}
