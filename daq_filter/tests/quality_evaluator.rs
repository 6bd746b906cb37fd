
use daq_filter::filter::convert::{StandardConverter, TypeConverter};
use daq_filter::filter::quality::{check_range, QualityEvaluator, Validity};
use daq_filter::tags::structures::{DataType, QualityCode, TagConfig, ValueVariant};
use serde_json::json;
use std::sync::Arc;
use test_utils::{analog_tag, ManualClock, T0};

fn evaluator(now: u64, tolerance_ms: u64) -> QualityEvaluator {
    QualityEvaluator::new(
        Arc::new(StandardConverter),
        Arc::new(ManualClock::new(now)),
        tolerance_ms,
    )
}

#[test]
fn valid_value_is_cast_to_declared_type() {
    let config = TagConfig::new(1, "Plant/Count", DataType::Integer);
    let validity = evaluator(T0, 1_000).evaluate(&config, &ValueVariant::Float(41.6), T0);
    assert_eq!(validity, Validity::Valid(ValueVariant::Int(42)));
}

#[test]
fn future_timestamp_beyond_tolerance_is_rejected() {
    let config = TagConfig::new(1, "Plant/Count", DataType::Integer);
    let eval = evaluator(T0, 1_000);

    assert!(matches!(
        eval.evaluate(&config, &ValueVariant::Int(1), T0 + 1_000),
        Validity::Valid(_)
    ));

    match eval.evaluate(&config, &ValueVariant::Float(3.0), T0 + 1_001) {
        Validity::Invalid {
            quality,
            value,
            timestamp,
        } => {
            assert_eq!(quality.code, QualityCode::FutureSourceTimestamp);
            // The cast value is still carried along.
            assert_eq!(value, ValueVariant::Int(3));
            assert_eq!(timestamp, T0);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn unconvertible_value_is_rejected() {
    let config = TagConfig::new(1, "Plant/Flag", DataType::Boolean);
    match evaluator(T0, 1_000).evaluate(&config, &ValueVariant::from("maybe"), T0) {
        Validity::Invalid { quality, value, .. } => {
            assert_eq!(quality.code, QualityCode::ConversionError);
            assert_eq!(value, ValueVariant::from("maybe"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn out_of_range_names_the_bounds() {
    let config = analog_tag(1).with_range(Some(0.0), Some(100.0));
    match evaluator(T0, 1_000).evaluate(&config, &ValueVariant::Float(150.0), T0) {
        Validity::Invalid { quality, value, timestamp } => {
            assert_eq!(quality.code, QualityCode::OutOfBounds);
            assert!(quality.description.contains("[0, 100]"));
            assert_eq!(value, ValueVariant::Float(150.0));
            assert_eq!(timestamp, T0);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn range_check_handles_open_bounds_and_non_numbers() {
    let min_only = analog_tag(1).with_range(Some(-5.0), None);
    assert!(check_range(&min_only, &ValueVariant::Float(1e12)).is_none());
    assert!(check_range(&min_only, &ValueVariant::Float(-5.5)).is_some());
    assert!(check_range(&min_only, &ValueVariant::from("text")).is_none());
    assert!(check_range(&analog_tag(2), &ValueVariant::Float(f64::MAX)).is_none());
}

#[test]
fn numeric_narrowing_checks_range() {
    let converter = StandardConverter;
    assert_eq!(
        converter.cast(&ValueVariant::Int(32_767), DataType::Short),
        Ok(ValueVariant::Int(32_767))
    );
    assert!(converter.cast(&ValueVariant::Int(32_768), DataType::Short).is_err());
    assert!(converter.cast(&ValueVariant::UInt(u64::MAX), DataType::Long).is_err());
    assert!(converter.cast(&ValueVariant::Float(1e300), DataType::Float).is_err());
    assert_eq!(
        converter.cast(&ValueVariant::Float(0.1), DataType::Float),
        Ok(ValueVariant::Float(0.1f32 as f64))
    );
}

#[test]
fn booleans_and_numbers_convert_both_ways() {
    let converter = StandardConverter;
    assert_eq!(
        converter.cast(&ValueVariant::Int(-3), DataType::Boolean),
        Ok(ValueVariant::Bool(true))
    );
    assert_eq!(
        converter.cast(&ValueVariant::Float(0.0), DataType::Boolean),
        Ok(ValueVariant::Bool(false))
    );
    assert_eq!(
        converter.cast(&ValueVariant::Bool(true), DataType::Integer),
        Ok(ValueVariant::Int(1))
    );
    assert_eq!(
        converter.cast(&ValueVariant::from("FALSE"), DataType::Boolean),
        Ok(ValueVariant::Bool(false))
    );
    assert_eq!(
        converter.cast(&ValueVariant::from(" 12.5 "), DataType::Double),
        Ok(ValueVariant::Float(12.5))
    );
}

#[test]
fn arrays_pass_through_and_objects_wrap_anything() {
    let converter = StandardConverter;
    let array = ValueVariant::Json(json!([1, 2, 3]));
    assert_eq!(converter.cast(&array, DataType::Array), Ok(array.clone()));
    assert_eq!(
        converter.cast(&ValueVariant::from("[4, 5]"), DataType::Array),
        Ok(ValueVariant::Json(json!([4, 5])))
    );
    assert!(converter.cast(&ValueVariant::Int(4), DataType::Array).is_err());
    assert_eq!(
        converter.cast(&ValueVariant::Int(4), DataType::Object),
        Ok(ValueVariant::Json(json!(4)))
    );
    assert!(converter.cast(&ValueVariant::Null, DataType::String).is_err());
}
