//! Snapshot, reduce and restore application volumes.

use crate::log_debug;
use crate::session::{AudioSessionProvider, SessionResult};
use crate::whitelist::{basename, Whitelist};
use std::collections::HashMap;
use std::time::Duration;

/// Point-in-time volume reading for one audio-producing process.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSample {
    pub pid: u32,
    pub executable_path: String,
    pub process_name: String,
    pub volume_percent: f32,
}

/// Every session's volume captured at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeSnapshot {
    pub taken_at: Duration,
    pub samples: Vec<VolumeSample>,
}

impl VolumeSnapshot {
    fn contains(&self, pid: u32, path: &str) -> bool {
        self.samples
            .iter()
            .any(|sample| sample.pid == pid && sample.executable_path == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionState {
    #[default]
    Idle,
    Applied,
}

/// What a trigger did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A fresh snapshot was taken and `reduced` sessions were lowered.
    Applied { reduced: usize },
    /// Reduction was already in place; only the restore deadline moved.
    Extended,
    /// Listing sessions failed; nothing was changed.
    CaptureFailed,
    /// The restore-check cycle could not be started, so the reduction was
    /// undone immediately.
    RestoreUnavailable,
}

/// `volume` lowered by `reduction` (a fraction in 0..=1).
pub fn reduced_volume(volume: f32, reduction: f32) -> f32 {
    volume - volume * reduction
}

/// Read every session the provider knows about, whitelisted or not.
pub(crate) fn capture_snapshot(
    provider: &dyn AudioSessionProvider,
    now: Duration,
) -> SessionResult<VolumeSnapshot> {
    let sessions = provider.list_sessions()?;
    let names: HashMap<u32, String> = match provider.list_processes() {
        Ok(processes) => processes.into_iter().map(|p| (p.pid, p.name)).collect(),
        Err(err) => {
            log_debug(&format!("process names unavailable for snapshot: {err}"));
            HashMap::new()
        }
    };

    let samples = sessions
        .into_iter()
        .map(|session| {
            let executable_path = provider.resolve_executable_path(session.pid);
            let process_name = names
                .get(&session.pid)
                .cloned()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| fallback_name(session.pid, &executable_path));
            VolumeSample {
                pid: session.pid,
                executable_path,
                process_name,
                volume_percent: session.volume_percent,
            }
        })
        .collect();

    Ok(VolumeSnapshot {
        taken_at: now,
        samples,
    })
}

fn fallback_name(pid: u32, path: &str) -> String {
    let name = basename(path);
    if name.is_empty() {
        format!("pid {pid}")
    } else {
        name.to_string()
    }
}

/// Owns the reduction lifecycle: at most one live snapshot at a time.
#[derive(Debug, Default)]
pub(crate) struct Attenuator {
    state: ReductionState,
    snapshot: Option<VolumeSnapshot>,
    last_trigger: Option<Duration>,
}

impl Attenuator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn trigger(
        &mut self,
        now: Duration,
        provider: &dyn AudioSessionProvider,
        whitelist: &Whitelist,
        reduction: f32,
    ) -> TriggerOutcome {
        let now = self.last_trigger.map_or(now, |last| now.max(last));
        self.last_trigger = Some(now);
        if self.state == ReductionState::Applied {
            return TriggerOutcome::Extended;
        }

        let snapshot = match capture_snapshot(provider, now) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log_debug(&format!("volume snapshot failed, not reducing: {err}"));
                return TriggerOutcome::CaptureFailed;
            }
        };
        self.state = ReductionState::Applied;

        let mut reduced = 0usize;
        for sample in &snapshot.samples {
            if whitelist.is_whitelisted(&sample.executable_path) {
                continue;
            }
            if apply_reduction(provider, sample, reduction) {
                reduced += 1;
            }
        }
        self.snapshot = Some(snapshot);
        TriggerOutcome::Applied { reduced }
    }

    /// Whether the restore deadline (measured from the latest trigger) passed.
    pub(crate) fn restore_due(&self, now: Duration, restore_after: Duration) -> bool {
        if self.state != ReductionState::Applied {
            return false;
        }
        match self.last_trigger {
            Some(last) => now.saturating_sub(last) >= restore_after,
            None => true,
        }
    }

    /// Put every non-whitelisted session back to its recorded volume.
    /// Returns `None` when nothing was applied.
    pub(crate) fn restore(
        &mut self,
        provider: &dyn AudioSessionProvider,
        whitelist: &Whitelist,
    ) -> Option<usize> {
        if self.state != ReductionState::Applied {
            return None;
        }
        let snapshot = self.snapshot.take().unwrap_or_default();
        let mut restored = 0usize;
        for sample in &snapshot.samples {
            if whitelist.is_whitelisted(&sample.executable_path) {
                continue;
            }
            match provider.set_volume(sample.pid, sample.volume_percent) {
                Ok(()) => restored += 1,
                Err(err) => log_debug(&format!(
                    "restore skipped {} (pid {}): {err}",
                    sample.process_name, sample.pid
                )),
            }
        }
        self.state = ReductionState::Idle;
        self.last_trigger = None;
        Some(restored)
    }

    /// Add sessions that appeared after the snapshot was taken. While applied
    /// the newcomers are reduced as well so the restore covers them.
    pub(crate) fn adopt_new_sessions(
        &mut self,
        now: Duration,
        provider: &dyn AudioSessionProvider,
        whitelist: &Whitelist,
        reduction: f32,
    ) -> usize {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return 0;
        };
        let current = match capture_snapshot(provider, now) {
            Ok(current) => current,
            Err(err) => {
                log_debug(&format!("session refresh failed: {err}"));
                return 0;
            }
        };

        let mut adopted = 0usize;
        for sample in current.samples {
            if snapshot.contains(sample.pid, &sample.executable_path) {
                continue;
            }
            if self.state == ReductionState::Applied
                && !whitelist.is_whitelisted(&sample.executable_path)
            {
                apply_reduction(provider, &sample, reduction);
            }
            snapshot.samples.push(sample);
            adopted += 1;
        }
        adopted
    }

    pub(crate) fn state(&self) -> ReductionState {
        self.state
    }

    pub(crate) fn snapshot(&self) -> Option<&VolumeSnapshot> {
        self.snapshot.as_ref()
    }

    pub(crate) fn last_trigger(&self) -> Option<Duration> {
        self.last_trigger
    }
}

fn apply_reduction(provider: &dyn AudioSessionProvider, sample: &VolumeSample, reduction: f32) -> bool {
    let target = reduced_volume(sample.volume_percent, reduction);
    match provider.set_volume(sample.pid, target) {
        Ok(()) => {
            log_debug(&format!(
                "reduced {} (pid {}) from {:.1} to {:.1}",
                sample.process_name, sample.pid, sample.volume_percent, target
            ));
            true
        }
        Err(err) => {
            log_debug(&format!(
                "reduction skipped {} (pid {}): {err}",
                sample.process_name, sample.pid
            ));
            false
        }
    }
}
