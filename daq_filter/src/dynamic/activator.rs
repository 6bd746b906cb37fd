use crate::config::settings::{DynamicSettings, RateThresholds};
use crate::tags::structures::{Priority, TagConfig, TagId};
use dashmap::{DashMap, DashSet};
use tracing::debug;

/// Promotion or demotion of a tag decided by the activator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTransition {
    /// Enable time deadband on the tag.
    Activate(TagId),
    /// Return the tag to unfiltered sending.
    Deactivate(TagId),
}

/// Runtime-adaptive time deadband.
pub trait DynamicRateActivator: Send + Sync {
    /// True iff the tag does not configure its time deadband statically and dynamic time
    /// deadband is enabled for the process.
    fn is_dynamic_time_deadband(&self, config: &TagConfig) -> bool;

    /// Record one update of the tag for rate accounting.
    fn new_tag_value_sent(&self, config: &TagConfig);

    /// Close the current accounting window and report which tags change state.
    fn evaluate(&self) -> Vec<RateTransition> {
        Vec::new()
    }
}

/// Activator for processes running with dynamic time deadband switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledActivator;

impl DynamicRateActivator for DisabledActivator {
    fn is_dynamic_time_deadband(&self, _config: &TagConfig) -> bool {
        false
    }

    fn new_tag_value_sent(&self, _config: &TagConfig) {}
}

/// Counts updates per tag and window for one priority class.
#[derive(Debug)]
struct RateCounter {
    thresholds: RateThresholds,
    counts: DashMap<TagId, u32>,
    active: DashSet<TagId>,
}

impl RateCounter {
    fn new(thresholds: RateThresholds) -> Self {
        RateCounter {
            thresholds,
            counts: DashMap::new(),
            active: DashSet::new(),
        }
    }

    fn record(&self, tag_id: TagId) {
        *self.counts.entry(tag_id).or_insert(0) += 1;
    }

    fn evaluate(&self, transitions: &mut Vec<RateTransition>) {
        let mut window = Vec::new();
        self.counts.retain(|id, count| {
            window.push((*id, *count));
            false
        });

        for (tag_id, count) in &window {
            if *count >= self.thresholds.activation_threshold && self.active.insert(*tag_id) {
                debug!("Tag {} sent {} values in the last window, activating time deadband", tag_id, count);
                transitions.push(RateTransition::Activate(*tag_id));
            }
        }

        let quiet: Vec<TagId> = self
            .active
            .iter()
            .map(|id| *id)
            .filter(|id| {
                let count = window
                    .iter()
                    .find(|(tag_id, _)| tag_id == id)
                    .map_or(0, |(_, count)| *count);
                count <= self.thresholds.deactivation_threshold
            })
            .collect();
        for tag_id in quiet {
            self.active.remove(&tag_id);
            debug!("Tag {} calmed down, deactivating time deadband", tag_id);
            transitions.push(RateTransition::Deactivate(tag_id));
        }
    }

    fn forget(&self, tag_id: TagId) {
        self.counts.remove(&tag_id);
        self.active.remove(&tag_id);
    }
}

/// Promotes chatty `LOW` and `MEDIUM` tags into time deadband and demotes them again once
/// they calm down. `HIGH` priority tags are never touched.
#[derive(Debug)]
pub struct FrequencyActivator {
    enabled: bool,
    low: RateCounter,
    medium: RateCounter,
}

impl FrequencyActivator {
    pub fn new(settings: &DynamicSettings) -> Self {
        FrequencyActivator {
            enabled: settings.enabled,
            low: RateCounter::new(settings.low.clone()),
            medium: RateCounter::new(settings.medium.clone()),
        }
    }

    fn bucket(&self, priority: Priority) -> Option<&RateCounter> {
        match priority {
            Priority::Low => Some(&self.low),
            Priority::Medium => Some(&self.medium),
            Priority::High => None,
        }
    }

    /// Whether the activator currently holds the tag in time deadband.
    pub fn is_active(&self, tag_id: TagId) -> bool {
        self.low.active.contains(&tag_id) || self.medium.active.contains(&tag_id)
    }

    /// Drop all accounting for a tag, e.g. after it was removed from the configuration.
    pub fn forget(&self, tag_id: TagId) {
        self.low.forget(tag_id);
        self.medium.forget(tag_id);
    }
}

impl DynamicRateActivator for FrequencyActivator {
    fn is_dynamic_time_deadband(&self, config: &TagConfig) -> bool {
        self.enabled && !config.static_time_deadband
    }

    fn new_tag_value_sent(&self, config: &TagConfig) {
        if !self.is_dynamic_time_deadband(config) {
            return;
        }
        if let Some(counter) = self.bucket(config.priority) {
            counter.record(config.id);
        }
    }

    fn evaluate(&self) -> Vec<RateTransition> {
        let mut transitions = Vec::new();
        if self.enabled {
            self.low.evaluate(&mut transitions);
            self.medium.evaluate(&mut transitions);
        }
        transitions
    }
}
