use crate::error::ConversionError;
use crate::tags::structures::{DataType, ValueVariant};

/// Casts raw driver values to the declared type of a tag.
pub trait TypeConverter: Send + Sync {
    fn cast(&self, value: &ValueVariant, target: DataType) -> Result<ValueVariant, ConversionError>;
}

/// Default conversion rules.
///
/// Numbers are widened or narrowed with a range check, booleans map to and from numbers via a
/// nonzero test, strings are parsed, and arrays/objects pass through as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardConverter;

impl TypeConverter for StandardConverter {
    fn cast(&self, value: &ValueVariant, target: DataType) -> Result<ValueVariant, ConversionError> {
        if value.is_null() {
            return Err(ConversionError::new(value, target, "no value"));
        }
        match target {
            DataType::Boolean => to_bool(value).map(ValueVariant::Bool),
            DataType::Short => to_integer(value, target, i16::MIN as i64, i16::MAX as i64),
            DataType::Integer => to_integer(value, target, i32::MIN as i64, i32::MAX as i64),
            DataType::Long => to_integer(value, target, i64::MIN, i64::MAX),
            DataType::Float => {
                let v = to_float(value, target)?;
                if v.is_finite() && v.abs() > f32::MAX as f64 {
                    return Err(ConversionError::new(value, target, "exceeds float range"));
                }
                Ok(ValueVariant::Float(v as f32 as f64))
            }
            DataType::Double => to_float(value, target).map(ValueVariant::Float),
            DataType::String => match value {
                ValueVariant::String(s) => Ok(ValueVariant::String(s.clone())),
                other => Ok(ValueVariant::String(other.to_string())),
            },
            DataType::Array => match value {
                ValueVariant::Json(json) if json.is_array() => Ok(value.clone()),
                ValueVariant::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json) if json.is_array() => Ok(ValueVariant::Json(json)),
                    _ => Err(ConversionError::new(value, target, "not an array")),
                },
                _ => Err(ConversionError::new(value, target, "not an array")),
            },
            DataType::Object => Ok(ValueVariant::Json(to_json(value))),
        }
    }
}

fn to_bool(value: &ValueVariant) -> Result<bool, ConversionError> {
    match value {
        ValueVariant::Bool(b) => Ok(*b),
        ValueVariant::Int(i) => Ok(*i != 0),
        ValueVariant::UInt(u) => Ok(*u != 0),
        ValueVariant::Float(f) if f.is_nan() => {
            Err(ConversionError::new(value, DataType::Boolean, "NaN"))
        }
        ValueVariant::Float(f) => Ok(*f != 0.0),
        ValueVariant::String(s) => {
            let trimmed = s.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(|n| n != 0.0)
                    .map_err(|_| ConversionError::new(value, DataType::Boolean, "not a boolean"))
            }
        }
        _ => Err(ConversionError::new(value, DataType::Boolean, "unsupported source type")),
    }
}

fn to_integer(
    value: &ValueVariant,
    target: DataType,
    min: i64,
    max: i64,
) -> Result<ValueVariant, ConversionError> {
    let out_of_range = || ConversionError::new(value, target, format!("outside [{}, {}]", min, max));
    let integer = match value {
        ValueVariant::Bool(b) => *b as i64,
        ValueVariant::Int(i) => *i,
        ValueVariant::UInt(u) => i64::try_from(*u).map_err(|_| out_of_range())?,
        ValueVariant::Float(f) => float_to_integer(*f).ok_or_else(out_of_range)?,
        ValueVariant::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i64>() {
                Ok(i) => i,
                Err(_) => trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(float_to_integer)
                    .ok_or_else(|| ConversionError::new(value, target, "not a number"))?,
            }
        }
        _ => return Err(ConversionError::new(value, target, "unsupported source type")),
    };
    if integer < min || integer > max {
        return Err(out_of_range());
    }
    Ok(ValueVariant::Int(integer))
}

// Rounds half away from zero.
fn float_to_integer(f: f64) -> Option<i64> {
    let rounded = f.round();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}

fn to_float(value: &ValueVariant, target: DataType) -> Result<f64, ConversionError> {
    match value {
        ValueVariant::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        ValueVariant::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConversionError::new(value, target, "not a number")),
        other => other
            .as_f64()
            .ok_or_else(|| ConversionError::new(value, target, "unsupported source type")),
    }
}

fn to_json(value: &ValueVariant) -> serde_json::Value {
    match value {
        ValueVariant::Null => serde_json::Value::Null,
        ValueVariant::Bool(b) => serde_json::Value::Bool(*b),
        ValueVariant::Int(i) => serde_json::Value::from(*i),
        ValueVariant::UInt(u) => serde_json::Value::from(*u),
        ValueVariant::Float(f) => serde_json::Value::from(*f),
        ValueVariant::String(s) => serde_json::Value::String(s.clone()),
        ValueVariant::Json(json) => json.clone(),
    }
}
