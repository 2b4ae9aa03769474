use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const SILENT_PERCENT: f32 = 0.0;

/// Latest microphone block peak (0 to 100), shared with status reporting.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(SILENT_PERCENT.to_bits())),
        }
    }

    pub fn set_percent(&self, percent: f32) {
        self.level_bits.store(percent.to_bits(), Ordering::Relaxed);
    }

    pub fn percent(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.set_percent(SILENT_PERCENT);
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Loudest sample of a 16-bit PCM block as a 0 to 100 percentage.
pub fn peak_percent(block: &[i16]) -> f32 {
    let peak = block
        .iter()
        .map(|&sample| (sample as f32 / 32_768.0).abs())
        .fold(0.0_f32, f32::max);
    peak * 100.0
}
