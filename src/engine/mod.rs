//! The ducking engine: debounce, snapshot/attenuate/restore, VOIP tracking.
//!
//! All shared mutable state lives in one [`EngineState`] behind one mutex, so
//! a trigger from the microphone path and one from the VOIP path can never
//! both take a snapshot, and a restore can never interleave with an apply.
//! Provider calls are made while the lock is held; they are expected to be
//! quick and each one is allowed to fail on its own.

mod attenuation;
mod detector;
mod resolver;

pub use attenuation::{
    reduced_volume, ReductionState, TriggerOutcome, VolumeSample, VolumeSnapshot,
};
pub use detector::{NoiseState, NoiseVerdict};
pub use resolver::{RescanReport, TrackedVoipProcess};

use crate::clock::Clock;
use crate::lock_or_recover;
use crate::log_debug;
use crate::scheduler::PeriodicTask;
use crate::session::{AudioSessionProvider, SessionResult};
use crate::whitelist::Whitelist;
use attenuation::Attenuator;
use detector::NoiseDetector;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Tunables consumed by the engine and the samplers feeding it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Fraction of each volume removed while ducking, 0..=1.
    pub reduction: f32,
    /// How long noise must persist, and the longest gap that keeps an episode alive.
    pub min_noise_length: Duration,
    /// Microphone peak (percent, 0..=100) a block must exceed to count as noise.
    pub min_mic_volume: f32,
    /// Mean VOIP peak (0..=1) a window must exceed to count as noise.
    pub min_app_peak: f32,
    /// Quiet time after the last trigger before volumes are restored.
    pub restore_after: Duration,
    pub restore_check_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reduction: 0.5,
            min_noise_length: Duration::from_millis(300),
            min_mic_volume: 10.0,
            min_app_peak: 0.05,
            restore_after: Duration::from_secs(3),
            restore_check_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of one restore-check tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreTick {
    /// Still applied and the deadline has not passed.
    Pending,
    /// The deadline passed and volumes were written back.
    Restored,
    /// Nothing is applied; the cycle has no work left.
    Idle,
}

impl RestoreTick {
    pub fn cycle_done(self) -> bool {
        !matches!(self, RestoreTick::Pending)
    }
}

struct EngineState {
    settings: EngineSettings,
    detector: NoiseDetector,
    attenuator: Attenuator,
    whitelist: Whitelist,
    voip_patterns: Vec<String>,
    tracked: BTreeMap<u32, TrackedVoipProcess>,
    restore_task: Option<PeriodicTask>,
}

/// Shared engine instance; construct with [`DuckingEngine::new`].
pub struct DuckingEngine {
    state: Mutex<EngineState>,
    provider: Arc<dyn AudioSessionProvider>,
    clock: Arc<dyn Clock>,
    this: Weak<DuckingEngine>,
}

impl DuckingEngine {
    pub fn new(
        provider: Arc<dyn AudioSessionProvider>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(EngineState {
                settings,
                detector: NoiseDetector::new(),
                attenuator: Attenuator::new(),
                whitelist: Whitelist::new(),
                voip_patterns: Vec::new(),
                tracked: BTreeMap::new(),
                restore_task: None,
            }),
            provider,
            clock,
            this: this.clone(),
        })
    }

    fn lock(&self, context: &str) -> std::sync::MutexGuard<'_, EngineState> {
        lock_or_recover(&self.state, context)
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn provider(&self) -> &Arc<dyn AudioSessionProvider> {
        &self.provider
    }

    pub fn settings(&self) -> EngineSettings {
        self.lock("DuckingEngine::settings").settings
    }

    pub fn set_reduction(&self, reduction: f32) {
        self.lock("DuckingEngine::set_reduction").settings.reduction = reduction.clamp(0.0, 1.0);
    }

    pub fn set_min_noise_length(&self, length: Duration) {
        self.lock("DuckingEngine::set_min_noise_length")
            .settings
            .min_noise_length = length;
    }

    pub fn set_min_mic_volume(&self, percent: f32) {
        self.lock("DuckingEngine::set_min_mic_volume")
            .settings
            .min_mic_volume = percent;
    }

    pub fn set_min_app_peak(&self, peak: f32) {
        self.lock("DuckingEngine::set_min_app_peak").settings.min_app_peak = peak;
    }

    pub fn set_restore_after(&self, after: Duration) {
        self.lock("DuckingEngine::set_restore_after")
            .settings
            .restore_after = after;
    }

    /// Exclude processes matching `pattern` from reduction.
    pub fn whitelist_app(&self, pattern: &str) {
        log_debug(&format!("ignoring volume from {pattern}"));
        self.lock("DuckingEngine::whitelist_app").whitelist.add(pattern);
    }

    /// Monitor processes matching `pattern` for outgoing audio. The pattern is
    /// whitelisted too, so a VOIP app is never ducked by its own voice.
    pub fn add_voip_app(&self, pattern: &str) {
        let mut state = self.lock("DuckingEngine::add_voip_app");
        if !state.voip_patterns.iter().any(|known| known == pattern) {
            state.voip_patterns.push(pattern.to_string());
        }
        state.whitelist.add(pattern);
        log_debug(&format!("monitoring voip app {pattern}"));
    }

    /// Clear the user whitelist. Registered VOIP patterns keep their exclusion.
    pub fn reset_whitelist(&self) {
        let mut guard = self.lock("DuckingEngine::reset_whitelist");
        let state = &mut *guard;
        state.whitelist.reset();
        for pattern in &state.voip_patterns {
            state.whitelist.add(pattern.as_str());
        }
    }

    pub fn whitelist(&self) -> Whitelist {
        self.lock("DuckingEngine::whitelist").whitelist.clone()
    }

    pub fn voip_patterns(&self) -> Vec<String> {
        self.lock("DuckingEngine::voip_patterns").voip_patterns.clone()
    }

    pub fn is_whitelisted(&self, sample: &VolumeSample) -> bool {
        self.lock("DuckingEngine::is_whitelisted")
            .whitelist
            .is_whitelisted(&sample.executable_path)
    }

    /// Feed one qualifying noise sample observed at `now`.
    pub fn on_qualifying_noise(&self, now: Duration) -> NoiseVerdict {
        let mut state = self.lock("DuckingEngine::on_qualifying_noise");
        // Samples from the mic and VOIP paths may arrive slightly out of order.
        let now = state.detector.last_noise().map_or(now, |last| now.max(last));
        let min_length = state.settings.min_noise_length;
        let verdict = state.detector.on_qualifying_noise(now, min_length);
        match verdict {
            NoiseVerdict::Trigger => {
                self.trigger_locked(&mut state, now);
            }
            NoiseVerdict::EpisodeRestarted => log_debug(&format!(
                "noise episode started at {}ms",
                now.as_millis()
            )),
            NoiseVerdict::Accumulating => {}
        }
        verdict
    }

    /// Duck every non-whitelisted session, or just push back the restore
    /// deadline when already ducked.
    pub fn trigger(&self, now: Duration) -> TriggerOutcome {
        let mut state = self.lock("DuckingEngine::trigger");
        self.trigger_locked(&mut state, now)
    }

    fn trigger_locked(&self, state: &mut EngineState, now: Duration) -> TriggerOutcome {
        let reduction = state.settings.reduction;
        let outcome =
            state
                .attenuator
                .trigger(now, self.provider.as_ref(), &state.whitelist, reduction);
        match outcome {
            TriggerOutcome::Applied { reduced } => {
                tracing::info!(
                    target: "autoduck::attenuation",
                    reduced,
                    reduction,
                    at_ms = now.as_millis() as u64,
                    "volume reduction applied"
                );
                log_debug(&format!("reduced {reduced} application volumes"));
                if let Err(err) = self.ensure_restore_cycle(state) {
                    return self.abandon_reduction(state, now, &err);
                }
            }
            TriggerOutcome::Extended | TriggerOutcome::RestoreUnavailable => {}
            TriggerOutcome::CaptureFailed => {
                tracing::warn!(target: "autoduck::attenuation", "volume snapshot failed");
            }
        }
        outcome
    }

    fn ensure_restore_cycle(&self, state: &mut EngineState) -> anyhow::Result<()> {
        if state
            .restore_task
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
        {
            return Ok(());
        }
        let engine = self.this.clone();
        let spawned = PeriodicTask::spawn(
            "restore-check",
            state.settings.restore_check_interval,
            move || {
                let Some(engine) = engine.upgrade() else {
                    return ControlFlow::Break(());
                };
                if engine.check_restore(engine.now()).cycle_done() {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )?;
        if let Some(previous) = state.restore_task.replace(spawned) {
            previous.cancel();
        }
        Ok(())
    }

    /// Without a restore-check cycle nothing would ever undo the reduction,
    /// so put the volumes back straight away.
    fn abandon_reduction(
        &self,
        state: &mut EngineState,
        now: Duration,
        err: &anyhow::Error,
    ) -> TriggerOutcome {
        tracing::warn!(
            target: "autoduck::attenuation",
            error = %format!("{err:#}"),
            "restore-check cycle not started"
        );
        log_debug(&format!("restore-check cycle not started, undoing reduction: {err:#}"));
        self.restore_locked(state, now);
        TriggerOutcome::RestoreUnavailable
    }

    /// One restore-check tick: restore when the deadline measured from the
    /// latest trigger has passed.
    pub fn check_restore(&self, now: Duration) -> RestoreTick {
        let mut state = self.lock("DuckingEngine::check_restore");
        if state.attenuator.state() != ReductionState::Applied {
            return RestoreTick::Idle;
        }
        let restore_after = state.settings.restore_after;
        if !state.attenuator.restore_due(now, restore_after) {
            return RestoreTick::Pending;
        }
        self.restore_locked(&mut state, now);
        RestoreTick::Restored
    }

    /// Write back the snapshot. Returns false when nothing was applied.
    pub fn restore(&self, now: Duration) -> bool {
        let mut state = self.lock("DuckingEngine::restore");
        self.restore_locked(&mut state, now)
    }

    /// Restore immediately regardless of the deadline, e.g. on shutdown.
    pub fn restore_now(&self) -> bool {
        self.restore(self.now())
    }

    fn restore_locked(&self, state: &mut EngineState, now: Duration) -> bool {
        let Some(restored) = state
            .attenuator
            .restore(self.provider.as_ref(), &state.whitelist)
        else {
            return false;
        };
        state.detector.reset();
        if let Some(task) = state.restore_task.take() {
            task.cancel();
        }
        tracing::info!(
            target: "autoduck::attenuation",
            restored,
            at_ms = now.as_millis() as u64,
            "volume levels restored"
        );
        log_debug(&format!("restored {restored} application volumes"));
        true
    }

    /// Pull sessions that started after the snapshot into it (reducing them
    /// while applied). No-op when idle.
    pub fn adopt_new_sessions(&self) -> usize {
        let now = self.now();
        let mut guard = self.lock("DuckingEngine::adopt_new_sessions");
        let state = &mut *guard;
        let adopted = state.attenuator.adopt_new_sessions(
            now,
            self.provider.as_ref(),
            &state.whitelist,
            state.settings.reduction,
        );
        if adopted > 0 {
            log_debug(&format!("adopted {adopted} new sessions into snapshot"));
        }
        adopted
    }

    /// One Process Resolver cycle.
    pub fn rescan_processes(&self) -> SessionResult<RescanReport> {
        let mut guard = self.lock("DuckingEngine::rescan_processes");
        let state = &mut *guard;
        resolver::rescan(&mut state.tracked, &state.voip_patterns, self.provider.as_ref())
    }

    pub fn tracked_voip_pids(&self) -> Vec<u32> {
        self.lock("DuckingEngine::tracked_voip_pids")
            .tracked
            .keys()
            .copied()
            .collect()
    }

    pub fn tracked_voip_processes(&self) -> Vec<TrackedVoipProcess> {
        self.lock("DuckingEngine::tracked_voip_processes")
            .tracked
            .values()
            .cloned()
            .collect()
    }

    pub fn reduction_state(&self) -> ReductionState {
        self.lock("DuckingEngine::reduction_state").attenuator.state()
    }

    pub fn noise_state(&self) -> NoiseState {
        self.lock("DuckingEngine::noise_state").detector.state()
    }

    pub fn snapshot(&self) -> Option<VolumeSnapshot> {
        self.lock("DuckingEngine::snapshot")
            .attenuator
            .snapshot()
            .cloned()
    }

    pub fn last_trigger(&self) -> Option<Duration> {
        self.lock("DuckingEngine::last_trigger").attenuator.last_trigger()
    }

    pub fn first_noise(&self) -> Option<Duration> {
        self.lock("DuckingEngine::first_noise").detector.first_noise()
    }

    pub fn last_noise(&self) -> Option<Duration> {
        self.lock("DuckingEngine::last_noise").detector.last_noise()
    }

    /// Whether a restore-check cycle thread is alive.
    pub fn restore_cycle_running(&self) -> bool {
        self.lock("DuckingEngine::restore_cycle_running")
            .restore_task
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }
}
