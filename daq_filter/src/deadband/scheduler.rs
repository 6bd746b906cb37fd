use crate::error::SinkError;
use crate::filter::ladder::{classify, FilterReason};
use crate::lock;
use crate::sender::sinks::{FilteredValue, ForwardedValue, Sinks};
use crate::tags::structures::{TagHandle, TagId, TagState, TagValue};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing waiting for the next tick.
    Idle,
    /// The tag's current value has to be considered at the next tick.
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Sent,
    Filtered(FilterReason),
}

/// State of one scheduler, as seen between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerRecord {
    pub tag_id: TagId,
    /// Last value sent to the server by this scheduler; `None` until the first run.
    pub last_sent: Option<TagValue>,
    pub state: SchedulerState,
    pub cancelled: bool,
    generation: u64,
}

/// Rate limiter for one tag: values handed to it reach the server at most once per period.
///
/// Every method that reads or writes the record takes the tag's [`TagState`], which can only be
/// obtained through the tag lock, so ticks never interleave with `schedule_value_for_sending`
/// or `flush_and_cancel`.
pub struct TimeDeadbandScheduler {
    tag: Arc<TagHandle>,
    period: Duration,
    sinks: Sinks,
    runtime: Handle,
    record: Mutex<SchedulerRecord>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl TimeDeadbandScheduler {
    pub fn new(tag: Arc<TagHandle>, period: Duration, sinks: Sinks, runtime: Handle) -> Arc<Self> {
        let tag_id = tag.id();
        Arc::new(TimeDeadbandScheduler {
            tag,
            period,
            sinks,
            runtime,
            record: Mutex::new(SchedulerRecord {
                tag_id,
                last_sent: None,
                state: SchedulerState::Idle,
                cancelled: false,
                generation: 0,
            }),
            ticker: Mutex::new(None),
        })
    }

    pub fn tag_id(&self) -> TagId {
        self.tag.id()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn record(&self) -> SchedulerRecord {
        lock(&self.record).clone()
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.record).state
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.record).cancelled
    }

    /// Mark the tag's current value for the next tick and make sure the ticker runs.
    /// A cancelled scheduler is re-armed and starts over as a first run.
    pub fn schedule_value_for_sending(self: &Arc<Self>, tag: &TagState) {
        debug_assert_eq!(tag.id(), self.tag_id());
        let generation = {
            let mut record = lock(&self.record);
            record.cancelled = false;
            record.state = SchedulerState::Pending;
            record.generation
        };
        self.arm(generation);
    }

    pub(crate) fn mark_pending(&self, tag: &TagState) {
        debug_assert_eq!(tag.id(), self.tag_id());
        lock(&self.record).state = SchedulerState::Pending;
    }

    /// Run one tick against the given tag state.
    ///
    /// A pending value is compared with the last sent one: if it passes the filter it goes to the
    /// accepted sink, otherwise it is reported as time deadband filtered. Either way the
    /// scheduler ends up idle, unless the accepted sink fails, in which case it stays pending.
    pub fn tick(&self, tag: &TagState) -> Result<TickOutcome, SinkError> {
        debug_assert_eq!(tag.id(), self.tag_id());
        let mut record = lock(&self.record);
        if record.state == SchedulerState::Idle {
            return Ok(TickOutcome::Idle);
        }
        let Some(current) = tag.current.as_ref() else {
            record.state = SchedulerState::Idle;
            return Ok(TickOutcome::Idle);
        };

        match classify(&tag.config, record.last_sent.as_ref(), current) {
            None => {
                self.sinks
                    .accepted
                    .forward(&ForwardedValue::new(&tag.config, current))?;
                record.last_sent = Some(current.clone());
                record.state = SchedulerState::Idle;
                Ok(TickOutcome::Sent)
            }
            Some(filtered_by) => {
                let dynamic = tag.is_dynamic_time_deadband_active();
                let reason = if dynamic {
                    FilterReason::DynamicTimeDeadband
                } else {
                    FilterReason::TimeDeadband
                };
                debug!(
                    "Tag {}: time deadband dropped value {} ({:?})",
                    tag.id(),
                    current.value,
                    filtered_by
                );
                self.sinks
                    .report_filtered(&FilteredValue::new(tag.id(), current, reason, dynamic));
                record.state = SchedulerState::Idle;
                Ok(TickOutcome::Filtered(reason))
            }
        }
    }

    /// Lock the tag and tick once.
    pub fn tick_now(&self) -> Result<TickOutcome, SinkError> {
        let tag = self.tag.lock();
        self.tick(&tag)
    }

    /// Tick once synchronously, then stop periodic firing and forget the last sent value.
    /// Calling it on an idle or cancelled scheduler does nothing beyond that.
    pub fn flush_and_cancel(&self, tag: &TagState) -> Result<TickOutcome, SinkError> {
        let outcome = self.tick(tag);
        self.cancel();
        outcome
    }

    /// Stop periodic firing. Idempotent.
    pub fn cancel(&self) {
        {
            let mut record = lock(&self.record);
            record.cancelled = true;
            record.state = SchedulerState::Idle;
            record.last_sent = None;
            record.generation += 1;
        }
        if let Some(ticker) = lock(&self.ticker).take() {
            ticker.abort();
        }
    }

    fn arm(self: &Arc<Self>, generation: u64) {
        let mut ticker = lock(&self.ticker);
        if ticker.as_ref().map_or(false, |task| !task.is_finished()) {
            return;
        }
        let scheduler = Arc::downgrade(self);
        let period = self.period;
        *ticker = Some(self.runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                if !scheduler.run_periodic_tick(generation) {
                    break;
                }
            }
        }));
    }

    // Returns false once this ticker generation has been cancelled.
    fn run_periodic_tick(&self, generation: u64) -> bool {
        let tag = self.tag.lock();
        {
            let record = lock(&self.record);
            if record.cancelled || record.generation != generation {
                return false;
            }
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.tick(&tag))) {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(
                "Time deadband tick for tag {} failed, retrying next cycle: {}",
                tag.id(),
                e
            ),
            Err(_) => error!(
                "Time deadband tick for tag {} panicked, scheduler stays armed",
                tag.id()
            ),
        }
        true
    }
}

impl Drop for TimeDeadbandScheduler {
    fn drop(&mut self) {
        let ticker = self.ticker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = ticker.take() {
            task.abort();
        }
    }
}
