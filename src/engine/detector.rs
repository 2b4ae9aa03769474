//! Debounce state machine deciding when noise has lasted long enough.
//!
//! Both the "episode broken" test and the "episode long enough" test use the
//! same minimum noise length. Bursts spaced closer than that chain into one
//! episode; anything further apart restarts it.

use std::time::Duration;

/// Where the current noise episode stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseState {
    /// No episode has started since construction or the last restore.
    #[default]
    Quiet,
    /// Noise is arriving but has not yet persisted for the minimum length.
    Accumulating,
    /// The episode qualifies; every further sample re-triggers attenuation.
    Triggered,
}

impl NoiseState {
    pub fn label(self) -> &'static str {
        match self {
            NoiseState::Quiet => "quiet",
            NoiseState::Accumulating => "accumulating",
            NoiseState::Triggered => "triggered",
        }
    }
}

/// Result of feeding one qualifying sample to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseVerdict {
    /// Gap since the previous sample exceeded the threshold; a new episode
    /// begins at this sample.
    EpisodeRestarted,
    /// Episode continues but is still shorter than the threshold.
    Accumulating,
    /// Episode has persisted long enough; attenuation should be triggered.
    Trigger,
}

#[derive(Debug, Default)]
pub(crate) struct NoiseDetector {
    first_noise: Option<Duration>,
    last_noise: Option<Duration>,
    state: NoiseState,
}

impl NoiseDetector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_qualifying_noise(&mut self, now: Duration, min_length: Duration) -> NoiseVerdict {
        // Never having heard noise counts as an infinitely long gap.
        let gap_broken = match self.last_noise {
            Some(last) => now.saturating_sub(last) > min_length,
            None => true,
        };

        let verdict = if gap_broken {
            self.first_noise = Some(now);
            self.state = NoiseState::Accumulating;
            NoiseVerdict::EpisodeRestarted
        } else {
            let first = self.first_noise.unwrap_or(now);
            if now.saturating_sub(first) >= min_length {
                self.state = NoiseState::Triggered;
                NoiseVerdict::Trigger
            } else {
                self.state = NoiseState::Accumulating;
                NoiseVerdict::Accumulating
            }
        };

        self.last_noise = Some(now);
        verdict
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn state(&self) -> NoiseState {
        self.state
    }

    pub(crate) fn first_noise(&self) -> Option<Duration> {
        self.first_noise
    }

    pub(crate) fn last_noise(&self) -> Option<Duration> {
        self.last_noise
    }
}
