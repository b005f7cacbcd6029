//! In-memory document store
//!
//! Keeps entries in a map per class. Mutations and the snapshot they publish
//! happen under the same write lock, so subscribers see snapshots in commit
//! order.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{PulseError, Result};
use crate::storage::{DocumentStore, LiveQueryHub, Subscription};
use crate::types::{ClassId, EntryId, FeedbackEntry};

/// Process-local store without persistence
#[derive(Debug, Default)]
pub struct InMemoryStore {
    classes: RwLock<HashMap<ClassId, BTreeMap<EntryId, FeedbackEntry>>>,
    hub: LiveQueryHub,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with a specific live channel capacity
    pub fn with_live_capacity(capacity: usize) -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
            hub: LiveQueryHub::new(capacity),
        }
    }

    fn collect(entries: Option<&BTreeMap<EntryId, FeedbackEntry>>) -> Vec<FeedbackEntry> {
        entries
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn write_entry(&self, entry: &FeedbackEntry) -> Result<()> {
        debug!("Storing feedback entry {} in {}", entry.id, entry.class_id);

        let mut classes = self.classes.write().await;
        let class = classes.entry(entry.class_id.clone()).or_default();
        class.insert(entry.id.clone(), entry.clone());

        let snapshot = Self::collect(Some(class));
        self.hub.publish(&entry.class_id, snapshot);
        Ok(())
    }

    async fn list_entries(&self, class_id: &ClassId) -> Result<Vec<FeedbackEntry>> {
        let classes = self.classes.read().await;
        Ok(Self::collect(classes.get(class_id)))
    }

    async fn delete_entry(&self, class_id: &ClassId, id: &EntryId) -> Result<()> {
        let mut classes = self.classes.write().await;
        let removed = classes
            .get_mut(class_id)
            .and_then(|class| class.remove(id));

        if removed.is_none() {
            return Err(PulseError::EntryNotFound(id.to_string()));
        }

        debug!("Deleted feedback entry {} from {}", id, class_id);
        let snapshot = Self::collect(classes.get(class_id));
        if snapshot.is_empty() {
            classes.remove(class_id);
        }
        self.hub.publish(class_id, snapshot);
        Ok(())
    }

    async fn subscribe(&self, class_id: &ClassId) -> Result<Subscription> {
        // Lock first: no mutation can publish between receiver and read
        let classes = self.classes.read().await;
        let rx = self.hub.receiver(class_id);
        let initial = self.hub.snapshot(class_id, Self::collect(classes.get(class_id)));
        Ok(Subscription::new(class_id.clone(), initial, rx))
    }

    fn subscriber_count(&self, class_id: &ClassId) -> usize {
        self.hub.subscriber_count(class_id)
    }
}
