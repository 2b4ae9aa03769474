//! Wires the periodic activities around one [`DuckingEngine`].
//!
//! Three independent sources run concurrently: the process rescan, the VOIP
//! peak poll and (optionally) the microphone listener. Each tick is isolated;
//! a failing provider call is logged and the next tick tries again.

use crate::audio::{LiveMeter, MicListener, VoipPoller, DEFAULT_BLOCK_MS};
use crate::engine::{DuckingEngine, ReductionState, RescanReport};
use crate::log_debug;
use crate::scheduler::PeriodicTask;
use anyhow::Result;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

/// Cadences and device choice for a [`Monitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub process_scan_interval: Duration,
    pub voip_poll_interval: Duration,
    pub mic_block_ms: u64,
    pub mic_channel_capacity: usize,
    /// `None` selects the system default input.
    pub input_device: Option<String>,
    pub listen_to_mic: bool,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            process_scan_interval: Duration::from_secs(5),
            voip_poll_interval: Duration::from_millis(50),
            mic_block_ms: DEFAULT_BLOCK_MS,
            mic_channel_capacity: 32,
            input_device: None,
            listen_to_mic: true,
        }
    }
}

/// One Process Resolver cycle plus snapshot adoption while reduced.
pub fn run_rescan_cycle(engine: &DuckingEngine) -> Option<RescanReport> {
    let report = match engine.rescan_processes() {
        Ok(report) => {
            if !report.is_empty() {
                log_debug(&format!(
                    "voip rescan: {} added, {} dropped",
                    report.added.len(),
                    report.dropped.len()
                ));
            }
            Some(report)
        }
        Err(err) => {
            log_debug(&format!("voip rescan failed: {err}"));
            None
        }
    };
    if engine.reduction_state() == ReductionState::Applied {
        engine.adopt_new_sessions();
    }
    report
}

pub struct Monitor {
    engine: Arc<DuckingEngine>,
    options: MonitorOptions,
    rescan_task: Option<PeriodicTask>,
    voip_task: Option<PeriodicTask>,
    mic: Option<MicListener>,
    meter: LiveMeter,
}

impl Monitor {
    pub fn new(engine: Arc<DuckingEngine>, options: MonitorOptions) -> Self {
        Self {
            engine,
            options,
            rescan_task: None,
            voip_task: None,
            mic: None,
            meter: LiveMeter::new(),
        }
    }

    /// Resolve VOIP processes once, start the periodic tasks and, when
    /// configured, the microphone. A microphone that cannot be opened is
    /// returned as an error with the tasks already running.
    pub fn start(&mut self) -> Result<()> {
        if self.rescan_task.is_none() {
            run_rescan_cycle(&self.engine);
            let engine = self.engine.clone();
            self.rescan_task = Some(PeriodicTask::spawn(
                "process-scan",
                self.options.process_scan_interval,
                move || {
                    run_rescan_cycle(&engine);
                    ControlFlow::Continue(())
                },
            )?);
        }

        if self.voip_task.is_none() {
            let engine = self.engine.clone();
            let mut poller = VoipPoller::new(self.options.voip_poll_interval);
            self.voip_task = Some(PeriodicTask::spawn(
                "voip-poll",
                self.options.voip_poll_interval,
                move || {
                    poller.poll_once(&engine);
                    ControlFlow::Continue(())
                },
            )?);
        }

        if self.options.listen_to_mic {
            self.listen_for_mic()?;
        }
        Ok(())
    }

    /// Open the configured input device. No-op when already listening.
    pub fn listen_for_mic(&mut self) -> Result<()> {
        if self.mic.is_some() {
            return Ok(());
        }
        let listener = MicListener::start(
            self.options.input_device.as_deref(),
            self.options.mic_block_ms,
            self.options.mic_channel_capacity,
            self.engine.clone(),
            self.meter.clone(),
        )?;
        log_debug(&format!("listening to mic '{}'", listener.device_name()));
        self.mic = Some(listener);
        Ok(())
    }

    /// Release the microphone. Attenuation already applied is left alone.
    pub fn stop_listening_to_mic(&mut self) {
        if let Some(listener) = self.mic.take() {
            log_debug(&format!(
                "stopped listening to mic '{}' ({} blocks dropped)",
                listener.device_name(),
                listener.dropped_blocks()
            ));
            listener.stop();
        }
    }

    /// Stop listening, select another device, and listen again.
    pub fn switch_input_device(&mut self, device: Option<String>) -> Result<()> {
        self.stop_listening_to_mic();
        self.options.input_device = device;
        self.options.listen_to_mic = true;
        self.listen_for_mic()
    }

    /// Stop every task and the microphone. Volumes are not touched.
    pub fn stop(&mut self) {
        self.stop_listening_to_mic();
        if let Some(task) = self.voip_task.take() {
            task.stop();
        }
        if let Some(task) = self.rescan_task.take() {
            task.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.rescan_task.is_some() || self.voip_task.is_some() || self.mic.is_some()
    }

    pub fn is_listening_to_mic(&self) -> bool {
        self.mic.is_some()
    }

    pub fn mic_device_name(&self) -> Option<&str> {
        self.mic.as_ref().map(MicListener::device_name)
    }

    pub fn meter(&self) -> &LiveMeter {
        &self.meter
    }

    pub fn engine(&self) -> &Arc<DuckingEngine> {
        &self.engine
    }

    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::engine::EngineSettings;
    use crate::session::InMemorySessions;
    use std::thread;
    use std::time::Instant;

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    fn fast_options() -> MonitorOptions {
        MonitorOptions {
            process_scan_interval: Duration::from_millis(20),
            voip_poll_interval: Duration::from_millis(10),
            listen_to_mic: false,
            ..MonitorOptions::default()
        }
    }

    fn engine(sessions: &Arc<InMemorySessions>) -> Arc<DuckingEngine> {
        DuckingEngine::new(
            sessions.clone(),
            Arc::new(MonotonicClock::new()),
            EngineSettings {
                reduction: 0.5,
                min_noise_length: Duration::from_millis(50),
                min_app_peak: 0.05,
                restore_after: Duration::from_secs(60),
                ..EngineSettings::default()
            },
        )
    }

    #[test]
    fn rescan_cycle_survives_provider_failure() {
        let sessions = Arc::new(InMemorySessions::new());
        let engine = engine(&sessions);
        engine.add_voip_app("zoom");
        sessions.fail_listing(true);
        assert!(run_rescan_cycle(&engine).is_none());
        sessions.fail_listing(false);
        sessions.add_session(3, "zoom", "/usr/bin/zoom", 70.0);
        let report = run_rescan_cycle(&engine).expect("rescan");
        assert_eq!(report.added.len(), 1);
    }

    #[test]
    fn start_resolves_voip_processes_immediately() {
        let sessions = Arc::new(InMemorySessions::new());
        sessions.add_session(3, "zoom", "/usr/bin/zoom", 70.0);
        let engine = engine(&sessions);
        engine.add_voip_app("zoom");

        let mut monitor = Monitor::new(engine.clone(), fast_options());
        monitor.start().expect("start");
        assert_eq!(engine.tracked_voip_pids(), vec![3]);
        assert!(monitor.is_running());
        assert!(!monitor.is_listening_to_mic());
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn loud_voip_app_ducks_others_and_new_sessions_are_adopted() {
        let sessions = Arc::new(InMemorySessions::new());
        sessions.add_session(3, "zoom", "/usr/bin/zoom", 70.0);
        sessions.add_session(4, "spotify", "/usr/bin/spotify", 80.0);
        sessions.set_peak(3, 0.6);
        let engine = engine(&sessions);
        engine.add_voip_app("zoom");

        let mut monitor = Monitor::new(engine.clone(), fast_options());
        monitor.start().expect("start");

        assert!(wait_until(|| engine.reduction_state() == ReductionState::Applied));
        assert_eq!(sessions.volume(4), Some(40.0));
        assert_eq!(sessions.volume(3), Some(70.0));

        sessions.add_session(5, "vlc", "/usr/bin/vlc", 60.0);
        assert!(wait_until(|| sessions.volume(5) == Some(30.0)));

        monitor.stop();
        assert!(engine.restore_now());
        assert_eq!(sessions.volume(4), Some(80.0));
        assert_eq!(sessions.volume(5), Some(60.0));
    }

    #[test]
    fn stopping_the_mic_when_not_listening_is_a_no_op() {
        let sessions = Arc::new(InMemorySessions::new());
        let mut monitor = Monitor::new(engine(&sessions), fast_options());
        monitor.stop_listening_to_mic();
        assert_eq!(monitor.mic_device_name(), None);
        assert_eq!(monitor.meter().percent(), 0.0);
    }

    #[test]
    fn stop_leaves_applied_reduction_in_place() {
        let sessions = Arc::new(InMemorySessions::new());
        sessions.add_session(4, "spotify", "/usr/bin/spotify", 80.0);
        let engine = engine(&sessions);
        let mut monitor = Monitor::new(engine.clone(), fast_options());
        monitor.start().expect("start");
        engine.trigger(engine.now());
        monitor.stop();
        assert_eq!(engine.reduction_state(), ReductionState::Applied);
        assert_eq!(sessions.volume(4), Some(40.0));
        engine.restore_now();
    }
}
