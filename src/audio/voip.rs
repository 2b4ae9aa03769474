//! Peak sampling of tracked VOIP applications.

use crate::engine::DuckingEngine;
use crate::log_debug;
use crate::session::SessionError;
use std::time::Duration;

/// Result of one closed averaging window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoipWindow {
    pub mean: f32,
    pub qualifies: bool,
}

/// Collects peak readings until a window of `min_noise_length` has elapsed.
///
/// Elapsed time advances by the poll interval per poll, not by wall time.
#[derive(Debug, Default)]
pub struct VoipAccumulator {
    peaks: Vec<f32>,
    elapsed: Duration,
}

impl VoipAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one poll's readings. Returns the closed window once `elapsed`
    /// reaches `window`; readings and elapsed are cleared either way.
    pub fn poll(
        &mut self,
        readings: &[f32],
        poll_interval: Duration,
        window: Duration,
        threshold: f32,
    ) -> Option<VoipWindow> {
        self.peaks.extend_from_slice(readings);
        self.elapsed += poll_interval;
        if self.elapsed < window {
            return None;
        }
        let mean = if self.peaks.is_empty() {
            0.0
        } else {
            self.peaks.iter().sum::<f32>() / self.peaks.len() as f32
        };
        self.peaks.clear();
        self.elapsed = Duration::ZERO;
        Some(VoipWindow {
            mean,
            qualifies: mean > threshold,
        })
    }

    pub fn pending_readings(&self) -> usize {
        self.peaks.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Drives a [`VoipAccumulator`] from the engine's tracked processes.
///
/// Qualifying windows are stamped on a timeline that advances by exactly one
/// poll interval per poll, so back-to-back loud windows land one window apart
/// and chain into a single noise episode. The timeline snaps back to the
/// engine clock when the two drift more than one poll apart.
#[derive(Debug)]
pub struct VoipPoller {
    accumulator: VoipAccumulator,
    poll_interval: Duration,
    timeline: Option<Duration>,
}

impl VoipPoller {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            accumulator: VoipAccumulator::new(),
            poll_interval,
            timeline: None,
        }
    }

    fn poll_time(&mut self, now: Duration) -> Duration {
        let at = match self.timeline {
            Some(previous) => {
                let nominal = previous + self.poll_interval;
                let drift = if nominal > now {
                    nominal - now
                } else {
                    now - nominal
                };
                if drift > self.poll_interval {
                    now
                } else {
                    nominal
                }
            }
            None => now,
        };
        self.timeline = Some(at);
        at
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Read every tracked pid's peak, and forward a qualifying sample to the
    /// engine when a window closes above `min_app_peak`.
    pub fn poll_once(&mut self, engine: &DuckingEngine) -> Option<VoipWindow> {
        let at = self.poll_time(engine.now());
        let provider = engine.provider();
        let mut readings = Vec::new();
        for pid in engine.tracked_voip_pids() {
            match provider.get_peak(pid) {
                Ok(Some(peak)) => readings.push(peak),
                Ok(None) => {}
                Err(SessionError::ProcessGone(_)) => {}
                Err(err) => log_debug(&format!("peak read for pid {pid} failed: {err}")),
            }
        }

        let settings = engine.settings();
        let window = self.accumulator.poll(
            &readings,
            self.poll_interval,
            settings.min_noise_length,
            settings.min_app_peak,
        )?;
        if window.qualifies {
            log_debug(&format!(
                "voip peak mean {:.3} above {:.3}",
                window.mean, settings.min_app_peak
            ));
            engine.on_qualifying_noise(at);
        }
        Some(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);
    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn window_closes_after_enough_polls() {
        let mut acc = VoipAccumulator::new();
        for _ in 0..5 {
            assert!(acc.poll(&[0.2], POLL, WINDOW, 0.05).is_none());
        }
        let window = acc.poll(&[0.2], POLL, WINDOW, 0.05).expect("window");
        assert!((window.mean - 0.2).abs() < 1e-6);
        assert!(window.qualifies);
        assert_eq!(acc.pending_readings(), 0);
        assert_eq!(acc.elapsed(), Duration::ZERO);
    }

    #[test]
    fn empty_window_has_zero_mean() {
        let mut acc = VoipAccumulator::new();
        let window = acc
            .poll(&[], Duration::from_millis(300), WINDOW, 0.0)
            .expect("window");
        assert_eq!(window.mean, 0.0);
        assert!(!window.qualifies);
    }

    #[test]
    fn quiet_window_resets_without_qualifying() {
        let mut acc = VoipAccumulator::new();
        for _ in 0..5 {
            acc.poll(&[0.01, 0.02], POLL, WINDOW, 0.05);
        }
        let window = acc.poll(&[0.03], POLL, WINDOW, 0.05).expect("window");
        assert!(!window.qualifies);
        assert_eq!(acc.pending_readings(), 0);
    }

    #[test]
    fn mean_equal_to_threshold_does_not_qualify() {
        let mut acc = VoipAccumulator::new();
        let window = acc.poll(&[0.5], WINDOW, WINDOW, 0.5).expect("window");
        assert!(!window.qualifies);
    }
}
