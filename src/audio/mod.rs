//! Level sampling: microphone blocks and VOIP application peak meters.
//!
//! Both sources only decide whether a reading is loud enough; anything that
//! qualifies is handed to [`crate::engine::DuckingEngine::on_qualifying_noise`]
//! with the current timestamp.

/// Capture cadence the microphone path is tuned for.
pub const DEFAULT_BLOCK_MS: u64 = 50;

mod dispatch;
mod listener;
mod meter;
#[cfg(test)]
mod tests;
mod voip;

pub use listener::{forward_mic_block, list_input_devices, MicListener};
pub use meter::{peak_percent, LiveMeter};
pub use voip::{VoipAccumulator, VoipPoller, VoipWindow};
