use crate::filter::convert::TypeConverter;
use crate::tags::structures::{now_millis, Quality, QualityCode, TagConfig, ValueVariant};
use std::sync::Arc;

/// Source of "now" for timestamp checks.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        now_millis()
    }
}

/// Outcome of validating a raw value against its tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Validity {
    /// The value, cast to the declared type.
    Valid(ValueVariant),
    /// The value was rejected. `value` is the cast value when the cast succeeded, otherwise the raw
    /// value; `timestamp` is the one to record the rejection under.
    Invalid {
        quality: Quality,
        value: ValueVariant,
        timestamp: u64,
    },
}

/// Validity checks run before any filtering: future timestamp, convertibility, range.
pub struct QualityEvaluator {
    converter: Arc<dyn TypeConverter>,
    clock: Arc<dyn Clock>,
    future_tolerance_ms: u64,
}

impl QualityEvaluator {
    pub fn new(
        converter: Arc<dyn TypeConverter>,
        clock: Arc<dyn Clock>,
        future_tolerance_ms: u64,
    ) -> Self {
        QualityEvaluator {
            converter,
            clock,
            future_tolerance_ms,
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn evaluate(&self, config: &TagConfig, value: &ValueVariant, source_timestamp: u64) -> Validity {
        let now = self.clock.now_millis();
        let cast = self.converter.cast(value, config.data_type);

        if self.is_future_timestamp(source_timestamp, now) {
            // Recorded at local time with a fixed description; the caller logs the offending
            // timestamp.
            return Validity::Invalid {
                quality: Quality::invalid(
                    QualityCode::FutureSourceTimestamp,
                    format!(
                        "source timestamp is more than {} ms ahead of local time",
                        self.future_tolerance_ms
                    ),
                ),
                value: cast.unwrap_or_else(|_| value.clone()),
                timestamp: now,
            };
        }

        let converted = match cast {
            Ok(converted) => converted,
            Err(e) => {
                return Validity::Invalid {
                    quality: Quality::invalid(QualityCode::ConversionError, e.to_string()),
                    value: value.clone(),
                    timestamp: source_timestamp,
                }
            }
        };

        if let Some(quality) = check_range(config, &converted) {
            return Validity::Invalid {
                quality,
                value: converted,
                timestamp: source_timestamp,
            };
        }

        Validity::Valid(converted)
    }

    pub fn is_future_timestamp(&self, source_timestamp: u64, now: u64) -> bool {
        source_timestamp > now.saturating_add(self.future_tolerance_ms)
    }
}

/// `Some(OUT_OF_BOUNDS)` when the value lies outside the tag's configured bounds.
/// Non-numeric values and tags without bounds always pass.
pub fn check_range(config: &TagConfig, value: &ValueVariant) -> Option<Quality> {
    let number = value.as_f64()?;
    let below = config.min_value.map_or(false, |min| number < min);
    let above = config.max_value.map_or(false, |max| number > max);
    if !(below || above) {
        return None;
    }
    Some(Quality::invalid(
        QualityCode::OutOfBounds,
        format!(
            "value is out of the configured range [{}, {}]",
            bound_label(config.min_value),
            bound_label(config.max_value)
        ),
    ))
}

fn bound_label(bound: Option<f64>) -> String {
    bound.map_or_else(|| "unbounded".to_string(), |b| b.to_string())
}
