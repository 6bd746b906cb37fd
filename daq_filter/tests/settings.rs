use daq_filter::config::settings::{
    RateThresholds, Settings, DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS,
};
use daq_filter::tags::structures::{DataType, Priority, TagConfig, ValueDeadbandType};
use std::fs;
use tempfile::tempdir;

#[test]
fn load_fills_in_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("daq.toml");
    fs::write(&path, "log_level = \"debug\"\n").unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.log_level, "debug");
    assert_eq!(
        settings.filter.future_timestamp_tolerance_ms,
        DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS
    );
    assert!(!settings.dynamic.enabled);
    assert_eq!(settings.dynamic.low, RateThresholds::new(60, 30));
    assert!(settings.tags.is_empty());
}

#[test]
fn load_reads_tags_and_dynamic_section() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("daq.toml");
    fs::write(
        &path,
        r#"
[filter]
future_timestamp_tolerance_ms = 2000

[dynamic]
enabled = true
evaluation_interval_ms = 30000

[dynamic.medium]
activation_threshold = 10
deactivation_threshold = 4

[[tags]]
id = 1
name = "Plant/Temperature"
data_type = "DOUBLE"
min_value = -40.0
max_value = 120.0
value_deadband_type = "RELATIVE"
value_deadband = 2.5
time_deadband_ms = 1000

[[tags]]
id = 2
name = "Plant/Pump"
data_type = "BOOLEAN"
priority = "LOW"
static_time_deadband = false
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.log_level, "info");
    assert_eq!(settings.filter.future_timestamp_tolerance_ms, 2000);
    assert!(settings.dynamic.enabled);
    assert_eq!(settings.dynamic.evaluation_interval_ms, 30_000);
    assert_eq!(settings.dynamic.medium, RateThresholds::new(10, 4));
    assert_eq!(settings.dynamic.time_deadband_ms, 1_000);

    assert_eq!(settings.tags.len(), 2);
    let temperature = &settings.tags[0];
    assert_eq!(temperature.data_type, DataType::Double);
    assert_eq!(temperature.min_value, Some(-40.0));
    assert_eq!(temperature.value_deadband_type, ValueDeadbandType::Relative);
    assert_eq!(temperature.time_deadband_ms, 1000);
    assert!(temperature.static_time_deadband);

    let pump = &settings.tags[1];
    assert_eq!(pump.priority, Priority::Low);
    assert!(!pump.static_time_deadband);
    assert_eq!(pump.max_value, None);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(Settings::load(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn save_then_load_keeps_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("saved.toml");

    let mut settings = Settings::default();
    settings.dynamic.enabled = true;
    settings.tags.push(
        TagConfig::new(7, "Plant/Flow", DataType::Float)
            .with_range(Some(0.0), Some(50.0))
            .with_value_deadband(ValueDeadbandType::Absolute, 0.5)
            .with_priority(Priority::High),
    );
    settings.save(&path).unwrap();

    assert_eq!(Settings::load(&path).unwrap(), settings);
}
