//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{ArgAction, Parser};

pub use defaults::{
    DEFAULT_MIC_BUFFER_MS, DEFAULT_MIC_CHANNEL_CAPACITY, DEFAULT_MIN_APP_PEAK,
    DEFAULT_MIN_MIC_VOLUME, DEFAULT_MIN_NOISE_LENGTH_SECS, DEFAULT_PROCESS_SCAN_MS,
    DEFAULT_REDUCTION, DEFAULT_RESTORE_AFTER_SECS, DEFAULT_RESTORE_CHECK_MS, DEFAULT_VOIP_POLL_MS,
};

/// CLI options for autoduck. Validated values keep the engine and `pactl` calls sane.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "autoduck",
    about = "autoduck: lower other apps' volume while you talk",
    author,
    version
)]
pub struct AppConfig {
    /// Fraction of each application's volume removed while ducking (0.0 to 1.0)
    #[arg(long, env = "AUTODUCK_REDUCTION", default_value_t = DEFAULT_REDUCTION)]
    pub reduction: f32,

    /// Seconds noise must persist before ducking; also the longest gap inside one episode
    #[arg(
        long = "min-noise-length-secs",
        default_value_t = DEFAULT_MIN_NOISE_LENGTH_SECS
    )]
    pub min_noise_length_secs: f64,

    /// Microphone peak (percent, 0 to 100) a block must exceed to count as noise
    #[arg(long = "min-mic-volume", default_value_t = DEFAULT_MIN_MIC_VOLUME)]
    pub min_mic_volume: f32,

    /// Mean VOIP application peak (0.0 to 1.0) a window must exceed to count as noise
    #[arg(long = "min-app-peak", default_value_t = DEFAULT_MIN_APP_PEAK)]
    pub min_app_peak: f32,

    /// Quiet seconds after the last trigger before volumes are restored
    #[arg(
        long = "restore-after-secs",
        default_value_t = DEFAULT_RESTORE_AFTER_SECS
    )]
    pub restore_after_secs: f64,

    /// Preferred audio input device name
    #[arg(long, env = "AUTODUCK_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Do not listen to a microphone (VOIP monitoring only)
    #[arg(long = "no-mic", default_value_t = false)]
    pub no_mic: bool,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Executable name or full path of a VOIP app to monitor (repeatable)
    #[arg(long = "voip-app", action = ArgAction::Append, value_name = "PATTERN")]
    pub voip_apps: Vec<String>,

    /// Executable name or full path never to duck (repeatable)
    #[arg(long = "whitelist-app", action = ArgAction::Append, value_name = "PATTERN")]
    pub whitelist_apps: Vec<String>,

    /// How often VOIP patterns are re-resolved against running processes (milliseconds)
    #[arg(long = "process-scan-ms", default_value_t = DEFAULT_PROCESS_SCAN_MS)]
    pub process_scan_ms: u64,

    /// How often VOIP peak meters are read (milliseconds)
    #[arg(long = "voip-poll-ms", default_value_t = DEFAULT_VOIP_POLL_MS)]
    pub voip_poll_ms: u64,

    /// How often the restore deadline is checked while ducked (milliseconds)
    #[arg(long = "restore-check-ms", default_value_t = DEFAULT_RESTORE_CHECK_MS)]
    pub restore_check_ms: u64,

    /// Microphone block length (milliseconds)
    #[arg(long = "mic-buffer-ms", default_value_t = DEFAULT_MIC_BUFFER_MS)]
    pub mic_buffer_ms: u64,

    /// Block channel capacity between the audio callback and the level consumer
    #[arg(
        long = "mic-channel-capacity",
        default_value_t = DEFAULT_MIC_CHANNEL_CAPACITY
    )]
    pub mic_channel_capacity: usize,

    /// Path to the pactl binary (Linux)
    #[arg(long = "pactl-cmd", env = "AUTODUCK_PACTL_CMD", default_value = "pactl")]
    pub pactl_cmd: String,

    /// Use an in-memory mixer instead of the system one
    #[arg(long, default_value_t = false)]
    pub simulate: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "AUTODUCK_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "AUTODUCK_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}
