use crate::error::SinkError;
use crate::filter::ladder::FilterReason;
use crate::tags::structures::{Quality, TagConfig, TagId, TagValue, ValueVariant};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A value update on its way to the server, valid or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardedValue {
    pub tag_id: TagId,
    pub tag_name: String,
    pub value: ValueVariant,
    pub value_description: Option<String>,
    pub quality: Quality,
    pub source_timestamp: u64,
    pub daq_timestamp: u64,
}

impl ForwardedValue {
    pub fn new(config: &TagConfig, value: &TagValue) -> Self {
        ForwardedValue {
            tag_id: config.id,
            tag_name: config.name.clone(),
            value: value.value.clone(),
            value_description: value.value_description.clone(),
            quality: value.quality.clone(),
            source_timestamp: value.source_timestamp,
            daq_timestamp: value.daq_timestamp,
        }
    }
}

/// Statistics record for an update that was suppressed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredValue {
    pub tag_id: TagId,
    pub value: ValueVariant,
    pub timestamp: u64,
    pub value_description: Option<String>,
    pub reason: FilterReason,
    pub dynamic: bool,
}

impl FilteredValue {
    pub fn new(tag_id: TagId, value: &TagValue, reason: FilterReason, dynamic: bool) -> Self {
        FilteredValue {
            tag_id,
            value: value.value.clone(),
            timestamp: value.source_timestamp,
            value_description: value.value_description.clone(),
            reason,
            dynamic,
        }
    }
}

/// Channel towards the server. Must not block indefinitely.
pub trait AcceptedSink: Send + Sync {
    fn forward(&self, update: &ForwardedValue) -> Result<(), SinkError>;
}

/// Best-effort statistics channel for suppressed updates.
pub trait FilteredSink: Send + Sync {
    fn forward(&self, update: &FilteredValue) -> Result<(), SinkError>;
}

/// Both output channels, shared by the dispatcher and every scheduler.
#[derive(Clone)]
pub struct Sinks {
    pub accepted: Arc<dyn AcceptedSink>,
    pub filtered: Arc<dyn FilteredSink>,
}

impl Sinks {
    pub fn new(accepted: Arc<dyn AcceptedSink>, filtered: Arc<dyn FilteredSink>) -> Self {
        Sinks { accepted, filtered }
    }

    /// Report a suppression. Losing one is not a correctness problem, so failures only get logged.
    pub fn report_filtered(&self, update: &FilteredValue) {
        if let Err(e) = self.filtered.forward(update) {
            tracing::debug!("Dropped filter statistics for tag {}: {}", update.tag_id, e);
        }
    }
}

/// Sink that pushes records into an unbounded tokio channel.
#[derive(Debug)]
pub struct ChannelSink<T> {
    tx: UnboundedSender<T>,
}

impl<T> Clone for ChannelSink<T> {
    fn clone(&self) -> Self {
        ChannelSink { tx: self.tx.clone() }
    }
}

impl<T> ChannelSink<T> {
    pub fn new(tx: UnboundedSender<T>) -> Self {
        ChannelSink { tx }
    }

    /// Create a sink together with the receiver the surrounding process drains.
    pub fn channel() -> (Self, UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl AcceptedSink for ChannelSink<ForwardedValue> {
    fn forward(&self, update: &ForwardedValue) -> Result<(), SinkError> {
        self.tx.send(update.clone()).map_err(|_| SinkError::Closed)
    }
}

impl FilteredSink for ChannelSink<FilteredValue> {
    fn forward(&self, update: &FilteredValue) -> Result<(), SinkError> {
        self.tx.send(update.clone()).map_err(|_| SinkError::Closed)
    }
}
