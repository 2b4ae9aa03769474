//! Maps configured VOIP patterns onto live process ids.
//!
//! Pids churn as applications start and exit, so the tracked set is rebuilt
//! incrementally on a slow cycle instead of resolving paths on every sample.

use crate::log_debug;
use crate::session::{AudioSessionProvider, SessionResult};
use crate::whitelist::path_matches;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A live process that a VOIP pattern resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedVoipProcess {
    pub pid: u32,
    pub matched_pattern: String,
}

/// What one rescan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanReport {
    pub dropped: Vec<u32>,
    pub added: Vec<TrackedVoipProcess>,
}

impl RescanReport {
    pub fn is_empty(&self) -> bool {
        self.dropped.is_empty() && self.added.is_empty()
    }
}

pub(crate) fn rescan(
    tracked: &mut BTreeMap<u32, TrackedVoipProcess>,
    patterns: &[String],
    provider: &dyn AudioSessionProvider,
) -> SessionResult<RescanReport> {
    let processes = provider.list_processes()?;
    let live: HashSet<u32> = processes.iter().map(|process| process.pid).collect();
    let mut report = RescanReport::default();

    tracked.retain(|pid, entry| {
        if live.contains(pid) {
            return true;
        }
        log_debug(&format!(
            "voip process {pid} ({}) exited; no longer tracked",
            entry.matched_pattern
        ));
        report.dropped.push(*pid);
        false
    });

    let matched: HashSet<&str> = tracked
        .values()
        .map(|entry| entry.matched_pattern.as_str())
        .collect();
    let pending: Vec<&String> = patterns
        .iter()
        .filter(|pattern| !matched.contains(pattern.as_str()))
        .collect();
    if pending.is_empty() {
        return Ok(report);
    }

    // Path lookups are privileged and slow; do each at most once per cycle.
    let mut paths: HashMap<u32, String> = HashMap::new();
    for pattern in pending {
        for process in &processes {
            if tracked.contains_key(&process.pid) {
                continue;
            }
            let path = paths
                .entry(process.pid)
                .or_insert_with(|| provider.resolve_executable_path(process.pid));
            if path.is_empty() || !path_matches(path, pattern) {
                continue;
            }
            let entry = TrackedVoipProcess {
                pid: process.pid,
                matched_pattern: pattern.clone(),
            };
            log_debug(&format!(
                "voip pattern '{pattern}' resolved to pid {} ({path})",
                process.pid
            ));
            tracked.insert(process.pid, entry.clone());
            report.added.push(entry);
        }
    }
    Ok(report)
}
