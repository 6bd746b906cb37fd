use crate::filter::value::{is_repeated_value, is_value_deadband_filtered};
use crate::tags::structures::{Quality, TagConfig, TagValue};
use serde::Serialize;

/// Why an update was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterReason {
    RepeatedValue,
    ValueDeadband,
    TimeDeadband,
    /// Time deadband suppression on a tag promoted by the dynamic rate activator.
    DynamicTimeDeadband,
    /// Timestamp not newer than the stored one and no quality transition.
    OldUpdate,
    /// Same invalid quality and same value reported again.
    RepeatedInvalid,
}

/// Result of running an update through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Forward,
    Suppress(FilterReason),
    /// Handed to the tag's time deadband scheduler.
    Defer,
}

/// Ordering check between the stored value and an incoming update.
///
/// | timestamp         | stored / incoming quality | result       |
/// |-------------------|---------------------------|--------------|
/// | newer             | any                       | not filtered |
/// | equal or older    | both OK                   | filtered     |
/// | equal or older    | both not OK               | filtered     |
/// | equal or older    | exactly one OK            | not filtered |
///
/// A quality transition is surfaced even when the timestamp went backwards.
pub fn is_older_update(stored: &TagValue, new_quality: &Quality, new_timestamp: u64) -> bool {
    if new_timestamp > stored.source_timestamp {
        return false;
    }
    stored.quality.is_ok() == new_quality.is_ok()
}

/// Decide whether `candidate` should be filtered against `last`.
///
/// `None` means no filtering. The ordering check runs first; a quality transition then
/// forwards unconditionally, and only between two `OK` values are repeated value and value
/// deadband consulted.
pub fn classify(config: &TagConfig, last: Option<&TagValue>, candidate: &TagValue) -> Option<FilterReason> {
    let last = last?;

    if is_older_update(last, &candidate.quality, candidate.source_timestamp) {
        return Some(FilterReason::OldUpdate);
    }

    match (last.quality.is_ok(), candidate.quality.is_ok()) {
        (true, true) => {
            let description = candidate.value_description.as_deref();
            if is_repeated_value(last, &candidate.value, description) {
                Some(FilterReason::RepeatedValue)
            } else if is_value_deadband_filtered(config, last, &candidate.value, description) {
                Some(FilterReason::ValueDeadband)
            } else {
                None
            }
        }
        (false, false) => {
            if last.quality == candidate.quality && last.value == candidate.value {
                Some(FilterReason::RepeatedInvalid)
            } else {
                None
            }
        }
        _ => None,
    }
}
