use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

/// Numeric identifier of a tag, unique within the DAQ process.
pub type TagId = u64;

/// Current wall clock time as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Validity classification of a tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityCode {
    Ok,
    FutureSourceTimestamp,
    ConversionError,
    OutOfBounds,
    DataUnavailable,
    ValueCorrupted,
    UnsupportedType,
    Unknown,
}

/// Quality code plus a free-text description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quality {
    pub code: QualityCode,
    pub description: String,
}

impl Quality {
    pub fn ok() -> Self {
        Quality {
            code: QualityCode::Ok,
            description: String::new(),
        }
    }

    pub fn invalid(code: QualityCode, description: impl Into<String>) -> Self {
        Quality {
            code,
            description: description.into(),
        }
    }

    /// `OK` never compares equal to any other code, whatever the description says.
    pub fn is_ok(&self) -> bool {
        self.code == QualityCode::Ok
    }
}

/// Declared data type of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    Short,
    Integer,
    Long,
    Float,
    Double,
    String,
    Array,
    Object,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Short | DataType::Integer | DataType::Long | DataType::Float | DataType::Double
        )
    }
}

/// Possible values carried by a tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueVariant {
    Null, // No value received yet, or the source did not provide one
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// Arrays and arbitrary structured values, compared structurally.
    Json(serde_json::Value),
}

impl ValueVariant {
    /// Numeric view used by range and deadband checks. Booleans are not numeric here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ValueVariant::Int(i) => Some(*i as f64),
            ValueVariant::UInt(u) => Some(*u as f64),
            ValueVariant::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueVariant::Null)
    }
}

impl fmt::Display for ValueVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueVariant::Null => write!(f, "null"),
            ValueVariant::Bool(b) => write!(f, "{}", b),
            ValueVariant::Int(i) => write!(f, "{}", i),
            ValueVariant::UInt(u) => write!(f, "{}", u),
            ValueVariant::Float(v) => write!(f, "{}", v),
            ValueVariant::String(s) => write!(f, "{}", s),
            ValueVariant::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for ValueVariant {
    fn from(b: bool) -> Self {
        ValueVariant::Bool(b)
    }
}

impl From<i64> for ValueVariant {
    fn from(i: i64) -> Self {
        ValueVariant::Int(i)
    }
}

impl From<f64> for ValueVariant {
    fn from(v: f64) -> Self {
        ValueVariant::Float(v)
    }
}

impl From<&str> for ValueVariant {
    fn from(s: &str) -> Self {
        ValueVariant::String(s.to_string())
    }
}

/// Value deadband policy of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueDeadbandType {
    #[default]
    None,
    Absolute,
    Relative,
    /// Like `Absolute`, but a changed value description always goes through.
    AbsoluteValueDescrChange,
    /// Like `Relative`, but a changed value description always goes through.
    RelativeValueDescrChange,
}

impl ValueDeadbandType {
    pub fn is_description_sensitive(&self) -> bool {
        matches!(
            self,
            ValueDeadbandType::AbsoluteValueDescrChange | ValueDeadbandType::RelativeValueDescrChange
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    /// Guaranteed delivery; never subject to dynamic time deadband.
    High,
}

/// Role of a tag. Alive and communication-fault tags bypass all filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagKind {
    #[default]
    Data,
    Alive,
    CommFault,
}

impl TagKind {
    pub fn bypasses_filtering(&self) -> bool {
        !matches!(self, TagKind::Data)
    }
}

fn default_static_time_deadband() -> bool {
    true
}

/// Static configuration of a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagConfig {
    pub id: TagId,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub kind: TagKind,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub value_deadband_type: ValueDeadbandType,
    #[serde(default)]
    pub value_deadband: f64,
    /// Time deadband interval in milliseconds, 0 disables it.
    #[serde(default)]
    pub time_deadband_ms: u64,
    #[serde(default)]
    pub priority: Priority,
    /// When false the tag may be promoted into time deadband at runtime.
    #[serde(default = "default_static_time_deadband")]
    pub static_time_deadband: bool,
}

impl TagConfig {
    pub fn new(id: TagId, name: impl Into<String>, data_type: DataType) -> Self {
        TagConfig {
            id,
            name: name.into(),
            data_type,
            kind: TagKind::Data,
            min_value: None,
            max_value: None,
            value_deadband_type: ValueDeadbandType::None,
            value_deadband: 0.0,
            time_deadband_ms: 0,
            priority: Priority::Medium,
            static_time_deadband: true,
        }
    }

    pub fn with_kind(mut self, kind: TagKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_value_deadband(mut self, deadband_type: ValueDeadbandType, deadband: f64) -> Self {
        self.value_deadband_type = deadband_type;
        self.value_deadband = deadband;
        self
    }

    pub fn with_time_deadband(mut self, interval_ms: u64) -> Self {
        self.time_deadband_ms = interval_ms;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Let the dynamic rate activator manage this tag's time deadband.
    pub fn dynamic(mut self) -> Self {
        self.static_time_deadband = false;
        self
    }
}

/// Value, quality and timestamps of a tag at one point in time.
///
/// Only the source and DAQ timestamps exist here. The server timestamp is stamped by the
/// server on receipt and never travels through this pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    pub value: ValueVariant,
    pub value_description: Option<String>,
    pub quality: Quality,
    /// Timestamp assigned by the source device (Unix milliseconds).
    pub source_timestamp: u64,
    /// Time the DAQ received the value (Unix milliseconds).
    pub daq_timestamp: u64,
}

impl TagValue {
    pub fn new(value: ValueVariant, quality: Quality, source_timestamp: u64) -> Self {
        TagValue {
            value,
            value_description: None,
            quality,
            source_timestamp,
            daq_timestamp: now_millis(),
        }
    }

    pub fn with_description(mut self, description: Option<&str>) -> Self {
        self.value_description = description.map(str::to_string);
        self
    }
}

/// Mutable per-tag record. Only ever touched through [`TagHandle::lock`].
#[derive(Debug, Clone)]
pub struct TagState {
    pub config: TagConfig,
    /// Last value that was forwarded or handed to the time deadband scheduler.
    pub current: Option<TagValue>,
    /// Interval applied while the dynamic rate activator has promoted this tag.
    pub dynamic_time_deadband_ms: Option<u64>,
}

impl TagState {
    pub fn new(config: TagConfig) -> Self {
        TagState {
            config,
            current: None,
            dynamic_time_deadband_ms: None,
        }
    }

    pub fn id(&self) -> TagId {
        self.config.id
    }

    /// Interval in effect right now, 0 when time deadband is off.
    pub fn effective_time_deadband_ms(&self) -> u64 {
        Self::time_deadband_ms_for(&self.config, self.dynamic_time_deadband_ms)
    }

    /// Interval a tag with `config` would run at, given the activator's dynamic interval.
    pub fn time_deadband_ms_for(config: &TagConfig, dynamic_interval: Option<u64>) -> u64 {
        match dynamic_interval {
            Some(interval) if !config.static_time_deadband => interval,
            _ => config.time_deadband_ms,
        }
    }

    pub fn is_dynamic_time_deadband_active(&self) -> bool {
        !self.config.static_time_deadband && self.dynamic_time_deadband_ms.is_some()
    }
}

/// A tag record behind its own exclusive lock.
#[derive(Debug)]
pub struct TagHandle {
    id: TagId,
    state: Mutex<TagState>,
}

impl TagHandle {
    pub fn new(config: TagConfig) -> Self {
        TagHandle {
            id: config.id,
            state: Mutex::new(TagState::new(config)),
        }
    }

    pub fn id(&self) -> TagId {
        self.id
    }

    /// Acquire the per-tag lock. Every mutation of the tag and its scheduler happens under it.
    pub fn lock(&self) -> MutexGuard<'_, TagState> {
        crate::lock(&self.state)
    }
}
