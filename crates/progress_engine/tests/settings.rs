use std::fs;
use std::time::Duration;

use progress_core::JobProfile;
use progress_engine::{load_settings, SettingsError, SettingsFile};
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let temp = TempDir::new().unwrap();
    let settings = load_settings(&temp.path().join("monitor.ron")).unwrap();
    assert_eq!(settings, SettingsFile::default());

    let config = settings.session_config("job-1", JobProfile::generation());
    assert_eq!(config.log_capacity, 50);
    assert_eq!(config.reconnect.delay, Duration::from_secs(3));
    assert_eq!(config.reconnect.max_attempts, Some(10));
}

#[test]
fn partial_file_overrides_only_given_fields() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("monitor.ron");
    fs::write(
        &path,
        "(reconnect_delay_ms: 500, max_reconnect_attempts: None, idle_timeout_ms: Some(30000), profile: \"insights\")",
    )
    .unwrap();

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.profile, "insights");
    assert_eq!(settings.tick_interval_ms, 1_000);

    let monitor = settings.monitor_settings();
    assert_eq!(monitor.idle_timeout, Some(Duration::from_secs(30)));
    assert_eq!(monitor.tick_interval, Duration::from_secs(1));

    let config = settings.session_config("job-9", JobProfile::insights());
    assert_eq!(config.session_id, "job-9");
    assert_eq!(config.reconnect.delay, Duration::from_millis(500));
    assert_eq!(config.reconnect.max_attempts, None);
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("monitor.ron");
    fs::write(&path, "(reconnect_delay_ms: \"soon\")").unwrap();

    let err = load_settings(&path).unwrap_err();
    assert!(matches!(err, SettingsError::Parse { .. }));
}

#[test]
fn zero_tick_interval_is_clamped() {
    let settings = SettingsFile {
        tick_interval_ms: 0,
        ..SettingsFile::default()
    };
    assert_eq!(settings.monitor_settings().tick_interval, Duration::from_millis(1));
}
