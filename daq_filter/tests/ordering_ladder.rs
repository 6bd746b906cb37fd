
use daq_filter::filter::ladder::{classify, is_older_update, FilterReason};
use daq_filter::tags::structures::{Quality, QualityCode, TagValue, ValueDeadbandType, ValueVariant};
use test_utils::{analog_tag, T0};

fn ok_value(value: f64, timestamp: u64) -> TagValue {
    TagValue::new(ValueVariant::Float(value), Quality::ok(), timestamp)
}

fn bad_value(value: f64, code: QualityCode, timestamp: u64) -> TagValue {
    TagValue::new(
        ValueVariant::Float(value),
        Quality::invalid(code, "source reports an error"),
        timestamp,
    )
}

#[test]
fn newer_timestamp_is_never_old() {
    let stored = ok_value(1.0, T0);
    assert!(!is_older_update(&stored, &Quality::ok(), T0 + 1));
    assert!(!is_older_update(&stored, &Quality::invalid(QualityCode::DataUnavailable, ""), T0 + 1));
}

#[test]
fn same_quality_class_with_stale_timestamp_is_old() {
    let ok = ok_value(1.0, T0);
    assert!(is_older_update(&ok, &Quality::ok(), T0));
    assert!(is_older_update(&ok, &Quality::ok(), T0 - 1));

    let bad = bad_value(1.0, QualityCode::DataUnavailable, T0);
    assert!(is_older_update(&bad, &Quality::invalid(QualityCode::OutOfBounds, "x"), T0));
}

#[test]
fn quality_transition_overrides_stale_timestamp() {
    let ok = ok_value(1.0, T0);
    assert!(!is_older_update(&ok, &Quality::invalid(QualityCode::DataUnavailable, ""), T0));

    let bad = bad_value(1.0, QualityCode::DataUnavailable, T0);
    assert!(!is_older_update(&bad, &Quality::ok(), T0 - 5));
}

#[test]
fn first_value_is_never_filtered() {
    let config = analog_tag(1);
    assert_eq!(classify(&config, None, &ok_value(1.0, T0)), None);
}

#[test]
fn ordering_is_checked_before_value_comparison() {
    let config = analog_tag(1);
    let stored = ok_value(1.0, T0);
    assert_eq!(
        classify(&config, Some(&stored), &ok_value(2.0, T0)),
        Some(FilterReason::OldUpdate)
    );
}

#[test]
fn repeated_value_wins_over_deadband_zero() {
    let config = analog_tag(1).with_value_deadband(ValueDeadbandType::Absolute, 0.0);
    let stored = ok_value(4.0, T0);
    assert_eq!(
        classify(&config, Some(&stored), &ok_value(4.0, T0 + 10)),
        Some(FilterReason::RepeatedValue)
    );
}

#[test]
fn deadband_only_between_valid_values() {
    let config = analog_tag(1).with_value_deadband(ValueDeadbandType::Absolute, 10.0);
    let stored = ok_value(4.0, T0);
    assert_eq!(
        classify(&config, Some(&stored), &ok_value(5.0, T0 + 10)),
        Some(FilterReason::ValueDeadband)
    );
    assert_eq!(
        classify(
            &config,
            Some(&stored),
            &bad_value(5.0, QualityCode::DataUnavailable, T0 + 10)
        ),
        None
    );
}

#[test]
fn repeated_invalid_needs_same_quality_and_value() {
    let config = analog_tag(1);
    let stored = bad_value(150.0, QualityCode::OutOfBounds, T0);

    assert_eq!(
        classify(&config, Some(&stored), &bad_value(150.0, QualityCode::OutOfBounds, T0 + 1)),
        Some(FilterReason::RepeatedInvalid)
    );
    assert_eq!(
        classify(&config, Some(&stored), &bad_value(151.0, QualityCode::OutOfBounds, T0 + 1)),
        None
    );
    assert_eq!(
        classify(&config, Some(&stored), &bad_value(150.0, QualityCode::DataUnavailable, T0 + 1)),
        None
    );
}
