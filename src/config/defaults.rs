pub const DEFAULT_REDUCTION: f32 = 0.5;
pub const DEFAULT_MIN_NOISE_LENGTH_SECS: f64 = 0.3;
pub const DEFAULT_MIN_MIC_VOLUME: f32 = 10.0;
pub const DEFAULT_MIN_APP_PEAK: f32 = 0.05;
pub const DEFAULT_RESTORE_AFTER_SECS: f64 = 3.0;
pub const DEFAULT_PROCESS_SCAN_MS: u64 = 5_000;
pub const DEFAULT_VOIP_POLL_MS: u64 = 50;
pub const DEFAULT_RESTORE_CHECK_MS: u64 = 100;
pub const DEFAULT_MIC_BUFFER_MS: u64 = crate::audio::DEFAULT_BLOCK_MS;
pub const DEFAULT_MIC_CHANNEL_CAPACITY: usize = 32;

pub(super) const MIN_NOISE_LENGTH_SECS: f64 = 0.05;
pub(super) const MAX_NOISE_LENGTH_SECS: f64 = 10.0;
pub(super) const MIN_RESTORE_AFTER_SECS: f64 = 0.1;
pub(super) const MAX_RESTORE_AFTER_SECS: f64 = 600.0;
pub(super) const PROCESS_SCAN_RANGE_MS: (u64, u64) = (250, 600_000);
pub(super) const VOIP_POLL_RANGE_MS: (u64, u64) = (10, 1_000);
pub(super) const RESTORE_CHECK_RANGE_MS: (u64, u64) = (10, 5_000);
pub(super) const MIC_BUFFER_RANGE_MS: (u64, u64) = (10, 1_000);
pub(super) const MIC_CHANNEL_CAPACITY_RANGE: (usize, usize) = (1, 1_024);
pub(super) const MAX_APP_PATTERNS: usize = 64;
pub(super) const MAX_APP_PATTERN_BYTES: usize = 1_024;
