use super::defaults::{MAX_APP_PATTERNS, MAX_APP_PATTERN_BYTES};
use super::validation::{sanitize_binary, sanitize_patterns};
use super::AppConfig;
use clap::Parser;
use std::env;
use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn parse(args: &[&str]) -> AppConfig {
    let mut argv = vec!["test-app", "--simulate"];
    argv.extend_from_slice(args);
    AppConfig::parse_from(argv)
}

#[test]
fn accepts_valid_defaults() {
    let mut cfg = parse(&[]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn defaults_match_engine_defaults() {
    let cfg = parse(&[]);
    let settings = cfg.engine_settings();
    let defaults = crate::engine::EngineSettings::default();
    assert_eq!(settings.reduction, defaults.reduction);
    assert!(
        (settings.min_noise_length.as_secs_f64() - defaults.min_noise_length.as_secs_f64()).abs()
            < 1e-6
    );
    assert_eq!(settings.min_mic_volume, defaults.min_mic_volume);
    assert_eq!(settings.min_app_peak, defaults.min_app_peak);
    assert_eq!(settings.restore_after, defaults.restore_after);
    assert_eq!(
        settings.restore_check_interval,
        defaults.restore_check_interval
    );
}

#[test]
fn rejects_reduction_out_of_bounds() {
    let mut cfg = parse(&["--reduction", "1.5"]);
    assert!(cfg.validate().is_err());
    let mut cfg = parse(&["--reduction=-0.1"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_reduction_bounds() {
    let mut cfg = parse(&["--reduction", "0"]);
    assert!(cfg.validate().is_ok());
    let mut cfg = parse(&["--reduction", "1"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_min_noise_length_out_of_bounds() {
    let mut cfg = parse(&["--min-noise-length-secs", "0.01"]);
    assert!(cfg.validate().is_err());
    let mut cfg = parse(&["--min-noise-length-secs", "11"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_nan_min_noise_length() {
    let mut cfg = parse(&["--min-noise-length-secs", "NaN"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_min_mic_volume_out_of_bounds() {
    let mut cfg = parse(&["--min-mic-volume", "101"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_min_app_peak_out_of_bounds() {
    let mut cfg = parse(&["--min-app-peak", "2"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_restore_after_out_of_bounds() {
    let mut cfg = parse(&["--restore-after-secs", "0.05"]);
    assert!(cfg.validate().is_err());
    let mut cfg = parse(&["--restore-after-secs", "601"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_cadences_out_of_bounds() {
    for args in [
        ["--process-scan-ms", "100"],
        ["--voip-poll-ms", "5"],
        ["--restore-check-ms", "6000"],
        ["--mic-buffer-ms", "0"],
        ["--mic-channel-capacity", "0"],
    ] {
        let mut cfg = parse(&args);
        assert!(cfg.validate().is_err(), "{args:?} should be rejected");
    }
}

#[test]
fn engine_settings_carry_cli_values() {
    let mut cfg = parse(&[
        "--reduction",
        "0.75",
        "--min-noise-length-secs",
        "0.5",
        "--min-mic-volume",
        "25",
        "--min-app-peak",
        "0.2",
        "--restore-after-secs",
        "1.5",
        "--restore-check-ms",
        "200",
    ]);
    cfg.validate().expect("valid config");
    let settings = cfg.engine_settings();
    assert_eq!(settings.reduction, 0.75);
    assert_eq!(settings.min_noise_length, Duration::from_millis(500));
    assert_eq!(settings.min_mic_volume, 25.0);
    assert_eq!(settings.min_app_peak, 0.2);
    assert_eq!(settings.restore_after, Duration::from_millis(1_500));
    assert_eq!(settings.restore_check_interval, Duration::from_millis(200));
}

#[test]
fn monitor_options_carry_cli_values() {
    let mut cfg = parse(&[
        "--process-scan-ms",
        "1000",
        "--voip-poll-ms",
        "20",
        "--mic-buffer-ms",
        "40",
        "--input-device",
        "  USB Mic ",
    ]);
    cfg.validate().expect("valid config");
    let options = cfg.monitor_options();
    assert_eq!(options.process_scan_interval, Duration::from_secs(1));
    assert_eq!(options.voip_poll_interval, Duration::from_millis(20));
    assert_eq!(options.mic_block_ms, 40);
    assert_eq!(options.input_device.as_deref(), Some("USB Mic"));
    assert!(options.listen_to_mic);
}

#[test]
fn app_patterns_are_repeatable_and_trimmed() {
    let mut cfg = parse(&[
        "--voip-app",
        " Discord.exe ",
        "--voip-app",
        "zoom",
        "--voip-app",
        "zoom",
        "--whitelist-app",
        "/usr/bin/obs",
    ]);
    cfg.validate().expect("valid config");
    assert_eq!(cfg.voip_apps, vec!["Discord.exe", "zoom"]);
    assert_eq!(cfg.whitelist_apps, vec!["/usr/bin/obs"]);
}

#[test]
fn rejects_blank_or_control_patterns() {
    let mut cfg = parse(&["--voip-app", "   "]);
    assert!(cfg.validate().is_err());
    let mut cfg = parse(&["--whitelist-app", "bad\napp"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn sanitize_patterns_enforces_limits() {
    let many: Vec<String> = (0..=MAX_APP_PATTERNS).map(|i| format!("app{i}")).collect();
    assert!(sanitize_patterns(&many, "--voip-app").is_err());

    let long = vec!["x".repeat(MAX_APP_PATTERN_BYTES + 1)];
    assert!(sanitize_patterns(&long, "--voip-app").is_err());

    let at_limit = vec!["x".repeat(MAX_APP_PATTERN_BYTES)];
    assert!(sanitize_patterns(&at_limit, "--voip-app").is_ok());
}

#[test]
fn no_mic_requires_voip_apps() {
    let mut cfg = parse(&["--no-mic"]);
    assert!(cfg.validate().is_err());

    let mut cfg = parse(&["--no-mic", "--voip-app", "zoom"]);
    assert!(cfg.validate().is_ok());
    assert!(!cfg.monitor_options().listen_to_mic);
}

#[test]
fn no_mic_conflicts_with_input_device() {
    let mut cfg = parse(&["--no-mic", "--voip-app", "zoom", "--input-device", "USB"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn pactl_cmd_is_not_checked_when_simulating() {
    let mut cfg = parse(&["--pactl-cmd", "/definitely/not/here/pactl"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn pactl_cmd_must_exist_for_real_mixer() {
    let mut cfg = AppConfig::parse_from(["test-app", "--pactl-cmd", "/definitely/not/here/pactl"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn sanitize_binary_accepts_allowlist_case_insensitive() {
    let sanitized = sanitize_binary("PACTL", "--pactl-cmd", &["pactl"]).expect("allowlisted");
    assert_eq!(sanitized, "pactl");
}

#[test]
fn sanitize_binary_rejects_empty() {
    assert!(sanitize_binary("   ", "--pactl-cmd", &["pactl"]).is_err());
}

#[test]
fn sanitize_binary_rejects_unknown_bare_name() {
    assert!(sanitize_binary("pamixer", "--pactl-cmd", &["pactl"]).is_err());
}

#[test]
fn sanitize_binary_rejects_directory_path() {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir_path = env::temp_dir().join(format!("autoduck_dir_{unique}"));
    fs::create_dir_all(&dir_path).unwrap();
    let result = sanitize_binary(dir_path.to_str().unwrap(), "--pactl-cmd", &["pactl"]);
    assert!(result.is_err());
    let _ = fs::remove_dir(&dir_path);
}

#[cfg(unix)]
#[test]
fn sanitize_binary_accepts_executable_path() {
    use std::os::unix::fs::PermissionsExt;

    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let path = env::temp_dir().join(format!("autoduck_pactl_{unique}"));
    fs::write(&path, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

    let sanitized = sanitize_binary(path.to_str().unwrap(), "--pactl-cmd", &["pactl"]).unwrap();
    assert_eq!(
        Some(sanitized.as_str()),
        path.canonicalize().unwrap().to_str()
    );

    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(sanitize_binary(path.to_str().unwrap(), "--pactl-cmd", &["pactl"]).is_err());
    let _ = fs::remove_file(&path);
}
