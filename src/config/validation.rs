use super::defaults::{
    MAX_APP_PATTERNS, MAX_APP_PATTERN_BYTES, MAX_NOISE_LENGTH_SECS, MAX_RESTORE_AFTER_SECS,
    MIC_BUFFER_RANGE_MS, MIC_CHANNEL_CAPACITY_RANGE, MIN_NOISE_LENGTH_SECS,
    MIN_RESTORE_AFTER_SECS, PROCESS_SCAN_RANGE_MS, RESTORE_CHECK_RANGE_MS, VOIP_POLL_RANGE_MS,
};
use super::AppConfig;
use crate::engine::EngineSettings;
use crate::monitor::MonitorOptions;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::{fs, path::Path, time::Duration};

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize app patterns and binary paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reduction) {
            bail!(
                "--reduction must be between 0.0 and 1.0, got {}",
                self.reduction
            );
        }
        if !(MIN_NOISE_LENGTH_SECS..=MAX_NOISE_LENGTH_SECS).contains(&self.min_noise_length_secs) {
            bail!(
                "--min-noise-length-secs must be between {MIN_NOISE_LENGTH_SECS} and {MAX_NOISE_LENGTH_SECS}, got {}",
                self.min_noise_length_secs
            );
        }
        if !(0.0..=100.0).contains(&self.min_mic_volume) {
            bail!(
                "--min-mic-volume must be between 0 and 100, got {}",
                self.min_mic_volume
            );
        }
        if !(0.0..=1.0).contains(&self.min_app_peak) {
            bail!(
                "--min-app-peak must be between 0.0 and 1.0, got {}",
                self.min_app_peak
            );
        }
        if !(MIN_RESTORE_AFTER_SECS..=MAX_RESTORE_AFTER_SECS).contains(&self.restore_after_secs) {
            bail!(
                "--restore-after-secs must be between {MIN_RESTORE_AFTER_SECS} and {MAX_RESTORE_AFTER_SECS}, got {}",
                self.restore_after_secs
            );
        }

        check_range("--process-scan-ms", self.process_scan_ms, PROCESS_SCAN_RANGE_MS)?;
        check_range("--voip-poll-ms", self.voip_poll_ms, VOIP_POLL_RANGE_MS)?;
        check_range(
            "--restore-check-ms",
            self.restore_check_ms,
            RESTORE_CHECK_RANGE_MS,
        )?;
        check_range("--mic-buffer-ms", self.mic_buffer_ms, MIC_BUFFER_RANGE_MS)?;
        check_range(
            "--mic-channel-capacity",
            self.mic_channel_capacity,
            MIC_CHANNEL_CAPACITY_RANGE,
        )?;

        self.voip_apps = sanitize_patterns(&self.voip_apps, "--voip-app")?;
        self.whitelist_apps = sanitize_patterns(&self.whitelist_apps, "--whitelist-app")?;

        if let Some(device) = &self.input_device {
            let trimmed = device.trim();
            if trimmed.is_empty() || device.chars().any(char::is_control) {
                bail!("--input-device must be a non-empty name without control characters");
            }
            self.input_device = Some(trimmed.to_string());
        }
        if self.no_mic && self.input_device.is_some() {
            bail!("--input-device cannot be combined with --no-mic");
        }
        if self.no_mic && self.voip_apps.is_empty() {
            bail!("--no-mic requires at least one --voip-app, otherwise nothing is monitored");
        }

        // Only the real mixer shells out to pactl.
        if !self.simulate {
            self.pactl_cmd = sanitize_binary(&self.pactl_cmd, "--pactl-cmd", &["pactl"])?;
        }

        Ok(())
    }

    /// Snapshot the CLI-controlled engine settings.
    pub fn engine_settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            reduction: self.reduction,
            min_noise_length: Duration::try_from_secs_f64(self.min_noise_length_secs)
                .unwrap_or(defaults.min_noise_length),
            min_mic_volume: self.min_mic_volume,
            min_app_peak: self.min_app_peak,
            restore_after: Duration::try_from_secs_f64(self.restore_after_secs)
                .unwrap_or(defaults.restore_after),
            restore_check_interval: Duration::from_millis(self.restore_check_ms),
        }
    }

    /// Snapshot the cadences and device choice for the monitor.
    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            process_scan_interval: Duration::from_millis(self.process_scan_ms),
            voip_poll_interval: Duration::from_millis(self.voip_poll_ms),
            mic_block_ms: self.mic_buffer_ms,
            mic_channel_capacity: self.mic_channel_capacity,
            input_device: self.input_device.clone(),
            listen_to_mic: !self.no_mic,
        }
    }
}

fn check_range<T>(flag: &str, value: T, (min, max): (T, T)) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        bail!("{flag} must be between {min} and {max}, got {value}");
    }
    Ok(())
}

/// Trim app patterns, drop duplicates and reject entries that cannot name an executable.
pub(super) fn sanitize_patterns(patterns: &[String], flag: &str) -> Result<Vec<String>> {
    if patterns.len() > MAX_APP_PATTERNS {
        bail!(
            "{flag} repeated too many times (max {MAX_APP_PATTERNS}, got {})",
            patterns.len()
        );
    }
    let mut cleaned: Vec<String> = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            bail!("{flag} cannot be empty");
        }
        if trimmed.len() > MAX_APP_PATTERN_BYTES {
            bail!("{flag} must be at most {MAX_APP_PATTERN_BYTES} bytes");
        }
        if trimmed.chars().any(char::is_control) {
            bail!("{flag} must not contain control characters");
        }
        if !cleaned.iter().any(|known| known == trimmed) {
            cleaned.push(trimmed.to_string());
        }
    }
    Ok(cleaned)
}

/// Allow either a known binary name or an absolute path.
pub(super) fn sanitize_binary(value: &str, flag: &str, allowlist: &[&str]) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if let Some(allowed) = allowlist
        .iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(trimmed))
    {
        return Ok((*allowed).to_string());
    }

    let path = Path::new(trimmed);
    if path.is_absolute() || trimmed.contains(std::path::MAIN_SEPARATOR) {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {flag} '{trimmed}'"))?;
        let metadata = fs::metadata(&canonical)
            .with_context(|| format!("failed to inspect {flag} '{}'", canonical.display()))?;
        if !metadata.is_file() {
            bail!("{flag} '{}' is not a file", canonical.display());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            if mode & 0o111 == 0 {
                bail!(
                    "{flag} '{}' exists but is not executable (mode {:o})",
                    canonical.display(),
                    mode
                );
            }
        }
        return canonical
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"));
    }

    bail!("{flag} must be one of {allowlist:?} or an existing binary path");
}
