//! Value deadband and repeated value detection.
//!
//! These checks only make sense between two `OK` values; the ordering ladder in
//! [`crate::filter::ladder`] decides whether they are consulted at all.

use crate::tags::structures::{TagConfig, TagValue, ValueDeadbandType, ValueVariant};

/// Absent and empty descriptions are the same thing.
pub fn descriptions_equal(a: Option<&str>, b: Option<&str>) -> bool {
    a.unwrap_or("") == b.unwrap_or("")
}

/// Same value (structural equality) and same value description.
pub fn is_repeated_value(last: &TagValue, value: &ValueVariant, description: Option<&str>) -> bool {
    last.value == *value && descriptions_equal(last.value_description.as_deref(), description)
}

/// Whether the change from `last` to `value` is too small to report under the tag's deadband.
///
/// Non-numeric values never fall inside a deadband; for them only repeated value detection
/// applies.
pub fn is_value_deadband_filtered(
    config: &TagConfig,
    last: &TagValue,
    value: &ValueVariant,
    description: Option<&str>,
) -> bool {
    let deadband_type = config.value_deadband_type;
    if deadband_type == ValueDeadbandType::None {
        return false;
    }
    if deadband_type.is_description_sensitive()
        && !descriptions_equal(last.value_description.as_deref(), description)
    {
        return false;
    }
    let (Some(last_number), Some(new_number)) = (last.value.as_f64(), value.as_f64()) else {
        return false;
    };
    match deadband_type {
        ValueDeadbandType::Absolute | ValueDeadbandType::AbsoluteValueDescrChange => {
            is_absolute_filtered(last_number, new_number, config.value_deadband)
        }
        ValueDeadbandType::Relative | ValueDeadbandType::RelativeValueDescrChange => {
            is_relative_filtered(last_number, new_number, config.value_deadband)
        }
        ValueDeadbandType::None => false,
    }
}

/// `|new - last| <= deadband`
pub fn is_absolute_filtered(last: f64, new: f64, deadband: f64) -> bool {
    (new - last).abs() <= deadband
}

/// `|new - last| / |last| * 100 <= deadband`; never filters when `last` is zero.
pub fn is_relative_filtered(last: f64, new: f64, deadband: f64) -> bool {
    if last == 0.0 {
        return false;
    }
    (new - last).abs() / last.abs() * 100.0 <= deadband
}
