use crate::config::settings::{Settings, DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS};
use crate::deadband::manager::TimeDeadbandManager;
use crate::dynamic::activator::{DisabledActivator, DynamicRateActivator, RateTransition};
use crate::error::DispatchError;
use crate::filter::convert::{StandardConverter, TypeConverter};
use crate::filter::ladder::{classify, FilterDecision, FilterReason};
use crate::filter::quality::{Clock, QualityEvaluator, SystemClock, Validity};
use crate::sender::sinks::{FilteredValue, ForwardedValue, Sinks};
use crate::tags::engine::TagEngine;
use crate::tags::structures::{
    Quality, QualityCode, TagConfig, TagHandle, TagId, TagState, TagValue, ValueVariant,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Entry point for every value the DAQ wants to send.
///
/// Validation, filtering and time deadband scheduling all happen under the tag's own lock;
/// the tag registry is only locked to look the tag up or to swap entries.
pub struct UpdateDispatcher {
    engine: TagEngine,
    evaluator: QualityEvaluator,
    time_deadband: TimeDeadbandManager,
    activator: Arc<dyn DynamicRateActivator>,
    sinks: Sinks,
    clock: Arc<dyn Clock>,
    dynamic_time_deadband_ms: u64,
    rate_evaluation_interval: Duration,
    runtime: Handle,
}

pub struct DispatcherBuilder {
    engine: TagEngine,
    sinks: Sinks,
    activator: Arc<dyn DynamicRateActivator>,
    converter: Arc<dyn TypeConverter>,
    clock: Arc<dyn Clock>,
    future_timestamp_tolerance_ms: u64,
    dynamic_time_deadband_ms: u64,
    rate_evaluation_interval_ms: u64,
    runtime: Option<Handle>,
}

impl DispatcherBuilder {
    pub fn activator(mut self, activator: Arc<dyn DynamicRateActivator>) -> Self {
        self.activator = activator;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn TypeConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn future_timestamp_tolerance_ms(mut self, tolerance_ms: u64) -> Self {
        self.future_timestamp_tolerance_ms = tolerance_ms;
        self
    }

    /// Interval given to tags promoted by the dynamic rate activator.
    pub fn dynamic_time_deadband_ms(mut self, interval_ms: u64) -> Self {
        self.dynamic_time_deadband_ms = interval_ms;
        self
    }

    /// Window length of the dynamic rate accounting.
    pub fn rate_evaluation_interval_ms(mut self, interval_ms: u64) -> Self {
        self.rate_evaluation_interval_ms = interval_ms;
        self
    }

    /// Take tolerance, dynamic interval and evaluation window from the loaded configuration.
    pub fn settings(self, settings: &Settings) -> Self {
        self.future_timestamp_tolerance_ms(settings.filter.future_timestamp_tolerance_ms)
            .dynamic_time_deadband_ms(settings.dynamic.time_deadband_ms)
            .rate_evaluation_interval_ms(settings.dynamic.evaluation_interval_ms)
    }

    /// Runtime the time deadband tickers are spawned on. Defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<UpdateDispatcher, DispatchError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| DispatchError::NoRuntime)?,
        };
        Ok(UpdateDispatcher {
            evaluator: QualityEvaluator::new(
                self.converter,
                Arc::clone(&self.clock),
                self.future_timestamp_tolerance_ms,
            ),
            time_deadband: TimeDeadbandManager::new(self.sinks.clone(), runtime.clone()),
            engine: self.engine,
            activator: self.activator,
            sinks: self.sinks,
            clock: self.clock,
            dynamic_time_deadband_ms: self.dynamic_time_deadband_ms,
            // tokio intervals reject a zero period.
            rate_evaluation_interval: Duration::from_millis(
                self.rate_evaluation_interval_ms.max(1),
            ),
            runtime,
        })
    }
}

impl UpdateDispatcher {
    pub fn builder(engine: TagEngine, sinks: Sinks) -> DispatcherBuilder {
        DispatcherBuilder {
            engine,
            sinks,
            activator: Arc::new(DisabledActivator),
            converter: Arc::new(StandardConverter),
            clock: Arc::new(SystemClock),
            future_timestamp_tolerance_ms: DEFAULT_FUTURE_TIMESTAMP_TOLERANCE_MS,
            dynamic_time_deadband_ms: 1_000,
            rate_evaluation_interval_ms: 60_000,
            runtime: None,
        }
    }

    pub fn engine(&self) -> &TagEngine {
        &self.engine
    }

    pub fn time_deadband(&self) -> &TimeDeadbandManager {
        &self.time_deadband
    }

    /// Run a value through validation, filtering and time deadband.
    ///
    /// Returns true when the value reached the accepted sink or was deferred into the time
    /// deadband scheduler, and false when it was suppressed. A rejected value that is forwarded
    /// with its bad quality counts as accepted; a repeat of the same rejection does not.
    pub fn send_filtered(
        &self,
        tag_id: TagId,
        value: ValueVariant,
        source_timestamp: u64,
        value_description: Option<&str>,
    ) -> Result<bool, DispatchError> {
        let tag = self.tag(tag_id)?;
        let mut state = tag.lock();

        if state.config.kind.bypasses_filtering() {
            let update = self.tag_value(value, Quality::ok(), source_timestamp, value_description);
            self.forward(&mut state, update)?;
            return Ok(true);
        }

        match self.evaluator.evaluate(&state.config, &value, source_timestamp) {
            Validity::Valid(converted) => {
                let update =
                    self.tag_value(converted, Quality::ok(), source_timestamp, value_description);
                let decision = self.route_valid(&tag, &mut state, update)?;
                Ok(!matches!(decision, FilterDecision::Suppress(_)))
            }
            Validity::Invalid {
                quality,
                value,
                timestamp,
            } => {
                warn!(
                    "Tag {} rejected value {} (source timestamp {}): {:?} {}",
                    tag_id, value, source_timestamp, quality.code, quality.description
                );
                let update = self.tag_value(value, quality, timestamp, value_description);
                let decision = self.route_invalid(&tag, &mut state, update)?;
                Ok(decision == FilterDecision::Forward)
            }
        }
    }

    /// Report the tag as invalid with the given quality. The current value is kept; the
    /// timestamp defaults to now.
    pub fn send_invalid(
        &self,
        tag_id: TagId,
        code: QualityCode,
        description: &str,
        timestamp: Option<u64>,
    ) -> Result<(), DispatchError> {
        if code == QualityCode::Ok {
            error!("Invalid update for tag {} sent with OK quality", tag_id);
            return Err(DispatchError::NotInvalid(tag_id));
        }
        let tag = self.tag(tag_id)?;
        let mut state = tag.lock();
        let timestamp = timestamp.unwrap_or_else(|| self.clock.now_millis());
        let value = state
            .current
            .as_ref()
            .map_or(ValueVariant::Null, |current| current.value.clone());
        let update = self.tag_value(value, Quality::invalid(code, description), timestamp, None);

        if state.config.kind.bypasses_filtering() {
            return self.forward(&mut state, update);
        }
        self.route_invalid(&tag, &mut state, update).map(|_| ())
    }

    fn route_valid(
        &self,
        tag: &Arc<TagHandle>,
        state: &mut TagState,
        update: TagValue,
    ) -> Result<FilterDecision, DispatchError> {
        if let Some(reason) = classify(&state.config, state.current.as_ref(), &update) {
            self.report_filtered(state, &update, reason);
            return Ok(FilterDecision::Suppress(reason));
        }

        self.activator.new_tag_value_sent(&state.config);
        if state.effective_time_deadband_ms() > 0 {
            self.time_deadband.add_to_time_deadband(tag, state, update)?;
            return Ok(FilterDecision::Defer);
        }
        self.forward(state, update)?;
        Ok(FilterDecision::Forward)
    }

    fn route_invalid(
        &self,
        tag: &Arc<TagHandle>,
        state: &mut TagState,
        update: TagValue,
    ) -> Result<FilterDecision, DispatchError> {
        match classify(&state.config, state.current.as_ref(), &update) {
            Some(FilterReason::RepeatedInvalid) => {
                // Not reported again, but the stored value follows the source.
                self.report_filtered(state, &update, FilterReason::RepeatedInvalid);
                state.current = Some(update);
                Ok(FilterDecision::Suppress(FilterReason::RepeatedInvalid))
            }
            Some(reason) => {
                self.report_filtered(state, &update, reason);
                Ok(FilterDecision::Suppress(reason))
            }
            None => {
                self.activator.new_tag_value_sent(&state.config);
                if state.effective_time_deadband_ms() > 0 && self.time_deadband.contains(state.id())
                {
                    self.time_deadband.add_to_time_deadband(tag, state, update)?;
                } else {
                    self.forward(state, update)?;
                }
                Ok(FilterDecision::Forward)
            }
        }
    }

    fn forward(&self, state: &mut TagState, update: TagValue) -> Result<(), DispatchError> {
        let record = ForwardedValue::new(&state.config, &update);
        state.current = Some(update);
        self.sinks.accepted.forward(&record).map_err(|e| {
            warn!("Could not forward value of tag {}: {}", state.id(), e);
            DispatchError::from(e)
        })
    }

    fn report_filtered(&self, state: &TagState, update: &TagValue, reason: FilterReason) {
        debug!(
            "Tag {}: filtered value {} ({:?})",
            state.id(),
            update.value,
            reason
        );
        let dynamic = self.activator.is_dynamic_time_deadband(&state.config);
        self.sinks
            .report_filtered(&FilteredValue::new(state.id(), update, reason, dynamic));
    }

    fn tag_value(
        &self,
        value: ValueVariant,
        quality: Quality,
        source_timestamp: u64,
        value_description: Option<&str>,
    ) -> TagValue {
        TagValue {
            value,
            value_description: value_description.map(str::to_string),
            quality,
            source_timestamp,
            daq_timestamp: self.clock.now_millis(),
        }
    }

    fn tag(&self, tag_id: TagId) -> Result<Arc<TagHandle>, DispatchError> {
        self.engine
            .get(tag_id)
            .ok_or(DispatchError::UnknownTag(tag_id))
    }

    /// Register a new tag.
    pub fn add_tag(&self, config: TagConfig) -> Result<(), DispatchError> {
        if self.engine.contains(config.id) {
            return Err(DispatchError::DuplicateTag(config.id));
        }
        info!("Adding tag {} ({})", config.id, config.name);
        self.engine.register_tag(config);
        Ok(())
    }

    /// Remove a tag and tear down its time deadband scheduler.
    pub fn remove_tag(&self, tag_id: TagId) -> Result<TagConfig, DispatchError> {
        let tag = self
            .engine
            .remove_tag(tag_id)
            .ok_or(DispatchError::UnknownTag(tag_id))?;
        let state = tag.lock();
        self.time_deadband.remove_from_time_deadband(tag_id);
        info!("Removed tag {} ({})", tag_id, state.config.name);
        Ok(state.config.clone())
    }

    /// Swap the configuration of a tag, keeping its current value.
    ///
    /// Disabling or changing the time deadband interval flushes whatever is pending under the
    /// old configuration, then removes the scheduler; it is recreated on the next forwarded
    /// value if still needed.
    pub fn reconfigure_tag(&self, config: TagConfig) -> Result<(), DispatchError> {
        let tag = self.tag(config.id)?;
        let mut state = tag.lock();
        let dynamic_interval = if config.static_time_deadband {
            None
        } else {
            state.dynamic_time_deadband_ms
        };
        let next_interval = TagState::time_deadband_ms_for(&config, dynamic_interval);
        if next_interval != state.effective_time_deadband_ms() {
            if let Err(e) = self.time_deadband.flush_and_remove(&state) {
                warn!("Could not flush time deadband of tag {}: {}", state.id(), e);
            }
        }
        state.dynamic_time_deadband_ms = dynamic_interval;
        state.config = config;
        info!("Reconfigured tag {} ({})", state.id(), state.config.name);
        Ok(())
    }

    /// Apply the activator's latest decisions to the affected tags.
    pub fn apply_rate_transitions(&self) -> Vec<RateTransition> {
        let transitions = self.activator.evaluate();
        for transition in &transitions {
            match *transition {
                RateTransition::Activate(tag_id) => self.activate_dynamic(tag_id),
                RateTransition::Deactivate(tag_id) => self.deactivate_dynamic(tag_id),
            }
        }
        transitions
    }

    fn activate_dynamic(&self, tag_id: TagId) {
        let Some(tag) = self.engine.get(tag_id) else {
            return;
        };
        let mut state = tag.lock();
        if state.config.static_time_deadband {
            return;
        }
        state.dynamic_time_deadband_ms = Some(self.dynamic_time_deadband_ms);
        info!(
            "Dynamic time deadband of {} ms activated for tag {}",
            self.dynamic_time_deadband_ms, tag_id
        );
    }

    fn deactivate_dynamic(&self, tag_id: TagId) {
        let Some(tag) = self.engine.get(tag_id) else {
            return;
        };
        let mut state = tag.lock();
        if state.dynamic_time_deadband_ms.take().is_none() {
            return;
        }
        info!("Dynamic time deadband deactivated for tag {}", tag_id);
        if state.effective_time_deadband_ms() == 0 {
            if let Err(e) = self.time_deadband.flush_and_remove(&state) {
                warn!("Could not flush time deadband of tag {}: {}", tag_id, e);
            }
        }
    }

    pub fn rate_evaluation_interval(&self) -> Duration {
        self.rate_evaluation_interval
    }

    /// Evaluate the dynamic rate activator once per configured window on the dispatcher's
    /// runtime. The task stops once the dispatcher is dropped.
    pub fn spawn_rate_evaluation(self: &Arc<Self>) -> JoinHandle<()> {
        let dispatcher = Arc::downgrade(self);
        let interval = self.rate_evaluation_interval;
        self.runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.apply_rate_transitions();
            }
        })
    }

    /// Send everything still pending in time deadband schedulers.
    pub fn send_delayed_time_deadband_values(&self) {
        self.time_deadband.send_delayed_time_deadband_values();
    }

    /// Drain pending time deadband values and stop all schedulers.
    pub fn shutdown(&self) {
        info!(
            "Shutting down, draining {} time deadband schedulers",
            self.time_deadband.len()
        );
        self.time_deadband.send_delayed_time_deadband_values();
        self.time_deadband.cancel_all();
    }
}
