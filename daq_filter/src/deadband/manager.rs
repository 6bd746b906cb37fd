use crate::deadband::scheduler::{TickOutcome, TimeDeadbandScheduler};
use crate::error::{DeadbandError, SinkError};
use crate::sender::sinks::Sinks;
use crate::tags::structures::{TagHandle, TagId, TagState, TagValue};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Owns every live [`TimeDeadbandScheduler`], at most one per tag.
///
/// Lock order is tag lock first, then this registry. Nothing here waits for a tag lock while
/// holding a registry shard.
pub struct TimeDeadbandManager {
    schedulers: DashMap<TagId, Arc<TimeDeadbandScheduler>>,
    sinks: Sinks,
    runtime: Handle,
}

impl TimeDeadbandManager {
    pub fn new(sinks: Sinks, runtime: Handle) -> Self {
        TimeDeadbandManager {
            schedulers: DashMap::new(),
            sinks,
            runtime,
        }
    }

    /// Make `update` the tag's current value and hand it to the tag's scheduler, creating the
    /// scheduler on first use.
    ///
    /// A valid update is scheduled for the next tick. An invalid one interrupts the scheduler:
    /// it is flushed immediately (surfacing the quality change) and disarmed until the next
    /// valid update.
    pub fn add_to_time_deadband(
        &self,
        tag: &Arc<TagHandle>,
        state: &mut TagState,
        update: TagValue,
    ) -> Result<TickOutcome, DeadbandError> {
        let interval_ms = state.effective_time_deadband_ms();
        if interval_ms == 0 {
            return Err(DeadbandError::NotConfigured(state.id()));
        }
        let scheduler = self.scheduler_for(tag, state, Duration::from_millis(interval_ms));
        let valid = update.quality.is_ok();
        state.current = Some(update);

        if valid {
            scheduler.schedule_value_for_sending(state);
            return Ok(TickOutcome::Idle);
        }
        scheduler.mark_pending(state);
        scheduler.flush_and_cancel(state).or_else(|e| {
            warn!("Flushing time deadband of tag {} failed: {}", state.id(), e);
            Ok(TickOutcome::Idle)
        })
    }

    /// Cancel and forget the tag's scheduler. Returns false if there was none.
    pub fn remove_from_time_deadband(&self, tag_id: TagId) -> bool {
        match self.schedulers.remove(&tag_id) {
            Some((_, scheduler)) => {
                scheduler.cancel();
                info!("Time deadband scheduler removed for tag {}", tag_id);
                true
            }
            None => false,
        }
    }

    /// Flush whatever is pending for the tag, then cancel and forget its scheduler.
    pub fn flush_and_remove(&self, state: &TagState) -> Result<TickOutcome, SinkError> {
        let Some((_, scheduler)) = self.schedulers.remove(&state.id()) else {
            return Ok(TickOutcome::Idle);
        };
        info!("Time deadband scheduler flushed and removed for tag {}", state.id());
        scheduler.flush_and_cancel(state)
    }

    /// Tick every live scheduler once. Used for draining at shutdown.
    pub fn send_delayed_time_deadband_values(&self) {
        for scheduler in self.snapshot() {
            if let Err(e) = scheduler.tick_now() {
                warn!(
                    "Could not send delayed value of tag {}: {}",
                    scheduler.tag_id(),
                    e
                );
            }
        }
    }

    /// Cancel and forget every scheduler.
    pub fn cancel_all(&self) {
        for scheduler in self.snapshot() {
            scheduler.cancel();
            self.schedulers.remove(&scheduler.tag_id());
        }
    }

    pub fn scheduler(&self, tag_id: TagId) -> Option<Arc<TimeDeadbandScheduler>> {
        self.schedulers.get(&tag_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, tag_id: TagId) -> bool {
        self.schedulers.contains_key(&tag_id)
    }

    pub fn len(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedulers.is_empty()
    }

    // Clone the handles out so no shard lock is held while tags get locked.
    fn snapshot(&self) -> Vec<Arc<TimeDeadbandScheduler>> {
        self.schedulers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    fn scheduler_for(
        &self,
        tag: &Arc<TagHandle>,
        state: &TagState,
        period: Duration,
    ) -> Arc<TimeDeadbandScheduler> {
        if let Some(existing) = self.scheduler(state.id()) {
            if existing.period() == period {
                return existing;
            }
            // Interval changed: send what is pending at the old rate before replacing it.
            if let Err(e) = existing.flush_and_cancel(state) {
                warn!("Flushing time deadband of tag {} failed: {}", state.id(), e);
            }
        }
        let scheduler = TimeDeadbandScheduler::new(
            Arc::clone(tag),
            period,
            self.sinks.clone(),
            self.runtime.clone(),
        );
        self.schedulers.insert(state.id(), Arc::clone(&scheduler));
        info!(
            "Time deadband scheduler created for tag {} ({} ms)",
            state.id(),
            period.as_millis()
        );
        scheduler
    }
}
