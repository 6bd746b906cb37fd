use crate::config::settings::Settings;
use crate::tags::structures::{TagConfig, TagHandle, TagId, TagValue};
use dashmap::DashMap; // Using DashMap for concurrent R/W access
use std::sync::Arc;
use tracing::info;

/// Registry of all tags known to the DAQ.
/// The map is only locked while entries are swapped; filtering runs under the per-tag lock.
#[derive(Debug, Clone)] // Clone provides cheap Arc clones
pub struct TagEngine {
    tags: Arc<DashMap<TagId, Arc<TagHandle>>>,
}

impl TagEngine {
    pub fn new() -> Self {
        TagEngine {
            tags: Arc::new(DashMap::new()),
        }
    }

    /// Build a registry holding every tag from the configuration.
    pub fn from_settings(settings: &Settings) -> Self {
        let engine = TagEngine::new();
        for tag in &settings.tags {
            engine.register_tag(tag.clone());
        }
        info!("Tag engine loaded {} tags from configuration", engine.len());
        engine
    }

    /// Add or replace a tag definition. A replaced tag starts without a current value.
    pub fn register_tag(&self, config: TagConfig) -> Arc<TagHandle> {
        let handle = Arc::new(TagHandle::new(config));
        self.tags.insert(handle.id(), Arc::clone(&handle));
        handle
    }

    /// Remove a tag, returning its handle so the caller can tear down related state.
    pub fn remove_tag(&self, id: TagId) -> Option<Arc<TagHandle>> {
        self.tags.remove(&id).map(|(_, handle)| handle)
    }

    /// Look up a tag handle. The shard lock is released before the caller locks the tag.
    pub fn get(&self, id: TagId) -> Option<Arc<TagHandle>> {
        self.tags.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.tags.contains_key(&id)
    }

    /// Get a snapshot of a tag's current value.
    pub fn read_snapshot(&self, id: TagId) -> Option<TagValue> {
        self.get(id).and_then(|handle| handle.lock().current.clone())
    }

    pub fn get_tag_config(&self, id: TagId) -> Option<TagConfig> {
        self.get(id).map(|handle| handle.lock().config.clone())
    }

    /// Get a list of all registered tag ids.
    pub fn get_all_tag_ids(&self) -> Vec<TagId> {
        self.tags.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagEngine {
    fn default() -> Self {
        Self::new()
    }
}
