
use daq_filter::filter::value::{
    descriptions_equal, is_absolute_filtered, is_relative_filtered, is_repeated_value,
    is_value_deadband_filtered,
};
use daq_filter::tags::structures::{
    DataType, Quality, TagConfig, TagValue, ValueDeadbandType, ValueVariant,
};
use serde_json::json;
use test_utils::{analog_tag, T0};

fn last(value: ValueVariant, description: Option<&str>) -> TagValue {
    TagValue::new(value, Quality::ok(), T0).with_description(description)
}

#[test]
fn absolute_deadband_boundary() {
    let config = analog_tag(1).with_value_deadband(ValueDeadbandType::Absolute, 0.5);
    let previous = last(ValueVariant::Float(10.0), None);

    // A change of exactly the deadband is still inside it.
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(10.5), None));
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(9.5), None));
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(10.5001), None));
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(9.4), None));
}

#[test]
fn relative_deadband_of_25_percent_on_100() {
    let config = analog_tag(1).with_value_deadband(ValueDeadbandType::Relative, 25.0);
    let previous = last(ValueVariant::Float(100.0), None);

    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(120.0), None));
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(126.0), None));
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(80.0), None));
}

#[test]
fn relative_deadband_never_filters_from_zero() {
    assert!(!is_relative_filtered(0.0, 0.0, 50.0));
    assert!(!is_relative_filtered(0.0, 0.001, 50.0));
    assert!(is_relative_filtered(-10.0, -11.0, 15.0));
    assert!(!is_relative_filtered(-10.0, -12.0, 15.0));
    assert!(is_absolute_filtered(-1.0, 1.0, 2.0));
}

#[test]
fn no_deadband_never_filters() {
    let config = analog_tag(1);
    let previous = last(ValueVariant::Float(1.0), None);
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(1.0), None));
}

#[test]
fn description_change_bypasses_sensitive_deadband() {
    let config =
        analog_tag(1).with_value_deadband(ValueDeadbandType::AbsoluteValueDescrChange, 5.0);
    let previous = last(ValueVariant::Float(10.0), Some("running"));

    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(11.0), Some("running")));
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(11.0), Some("stopped")));
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(11.0), None));
}

#[test]
fn description_change_ignored_by_plain_deadband() {
    let config = analog_tag(1).with_value_deadband(ValueDeadbandType::Absolute, 5.0);
    let previous = last(ValueVariant::Float(10.0), Some("running"));
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(11.0), Some("stopped")));
}

#[test]
fn absent_and_empty_descriptions_count_as_unchanged() {
    let config =
        analog_tag(1).with_value_deadband(ValueDeadbandType::RelativeValueDescrChange, 10.0);
    let previous = last(ValueVariant::Float(100.0), None);

    assert!(descriptions_equal(None, Some("")));
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(105.0), Some("")));
    assert!(is_value_deadband_filtered(&config, &previous, &ValueVariant::Float(105.0), None));
}

#[test]
fn repeated_value_needs_same_description() {
    let previous = last(ValueVariant::Int(7), Some("auto"));
    assert!(is_repeated_value(&previous, &ValueVariant::Int(7), Some("auto")));
    assert!(!is_repeated_value(&previous, &ValueVariant::Int(7), Some("manual")));
    assert!(!is_repeated_value(&previous, &ValueVariant::Int(8), Some("auto")));
}

#[test]
fn structured_values_compare_structurally() {
    let previous = last(ValueVariant::Json(json!({"a": [1, 2], "b": "x"})), None);
    assert!(is_repeated_value(&previous, &ValueVariant::Json(json!({"b": "x", "a": [1, 2]})), None));
    assert!(!is_repeated_value(&previous, &ValueVariant::Json(json!({"a": [2, 1], "b": "x"})), None));
}

#[test]
fn numeric_deadband_on_structured_tag_falls_back_to_repeated_only() {
    let config = TagConfig::new(3, "Plant/Recipe", DataType::Object)
        .with_value_deadband(ValueDeadbandType::Absolute, 1000.0);
    let previous = last(ValueVariant::Json(json!({"step": 1})), None);
    assert!(!is_value_deadband_filtered(&config, &previous, &ValueVariant::Json(json!({"step": 2})), None));
}
