use crate::tags::structures::{DataType, TagId};
use thiserror::Error;

pub use config::ConfigError;

/// A value could not be cast to the declared type of its tag.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} to {target:?}: {reason}")]
pub struct ConversionError {
    pub value: String,
    pub target: DataType,
    pub reason: String,
}

impl ConversionError {
    pub fn new(value: impl ToString, target: DataType, reason: impl Into<String>) -> Self {
        ConversionError {
            value: value.to_string(),
            target,
            reason: reason.into(),
        }
    }
}

/// Failure reported by an output sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink is closed")]
    Closed,
    #[error("sink rejected update for tag {0}: {1}")]
    Rejected(TagId, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadbandError {
    #[error("tag {0} has no time deadband configured")]
    NotConfigured(TagId),
    #[error("no time deadband scheduler registered for tag {0}")]
    UnknownScheduler(TagId),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tag {0}")]
    UnknownTag(TagId),
    #[error("tag {0} is already registered")]
    DuplicateTag(TagId),
    #[error("invalid update for tag {0} must carry a non-OK quality")]
    NotInvalid(TagId),
    #[error("no tokio runtime available for time deadband schedulers")]
    NoRuntime,
    #[error(transparent)]
    Deadband(#[from] DeadbandError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
