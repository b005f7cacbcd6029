//! Live-query fan-out shared by the storage backends
//!
//! Every mutation publishes a full snapshot of the affected class on a
//! per-class tokio broadcast channel. Snapshots are complete replacements, so
//! a subscriber that lags and misses some only needs the next one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt as _};
use tracing::debug;

use crate::error::{PulseError, Result};
use crate::types::{ClassId, FeedbackEntry};

/// Full entry set of one class at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub class_id: ClassId,
    pub entries: Arc<Vec<FeedbackEntry>>,
    /// Monotonic per hub; later snapshots supersede earlier ones
    pub version: u64,
}

/// Message carried on a class channel
#[derive(Debug, Clone)]
pub enum LivePush {
    Snapshot(Snapshot),
    /// The backend could not produce a snapshot after a change
    Failed(String),
}

/// Per-class broadcast channels for live queries
#[derive(Debug)]
pub struct LiveQueryHub {
    channels: Mutex<HashMap<ClassId, broadcast::Sender<LivePush>>>,
    capacity: usize,
    version: AtomicU64,
}

impl LiveQueryHub {
    /// Create new hub with per-class channel capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            version: AtomicU64::new(0),
        }
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Build a snapshot stamped with the next version
    pub fn snapshot(&self, class_id: &ClassId, entries: Vec<FeedbackEntry>) -> Snapshot {
        Snapshot {
            class_id: class_id.clone(),
            entries: Arc::new(entries),
            version: self.next_version(),
        }
    }

    /// Publish the new entry set of a class to its subscribers
    ///
    /// Channels left without receivers are dropped here.
    pub fn publish(&self, class_id: &ClassId, entries: Vec<FeedbackEntry>) {
        let snapshot = self.snapshot(class_id, entries);
        self.send(class_id, LivePush::Snapshot(snapshot));
    }

    /// Tell subscribers of a class that live updates broke
    pub fn fail(&self, class_id: &ClassId, reason: impl Into<String>) {
        self.send(class_id, LivePush::Failed(reason.into()));
    }

    fn lock_channels(&self) -> MutexGuard<'_, HashMap<ClassId, broadcast::Sender<LivePush>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn send(&self, class_id: &ClassId, push: LivePush) {
        let mut channels = self.lock_channels();

        if let Some(tx) = channels.get(class_id) {
            if tx.send(push).is_err() {
                debug!("No live subscribers left for class {}", class_id);
                channels.remove(class_id);
            }
        }
    }

    /// Register a subscriber; `initial` is delivered before any later push
    ///
    /// Callers take the receiver before reading `initial` so no change that
    /// lands in between is lost.
    pub fn receiver(&self, class_id: &ClassId) -> broadcast::Receiver<LivePush> {
        let mut channels = self.lock_channels();
        channels.retain(|_, tx| tx.receiver_count() > 0);

        channels
            .entry(class_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of live receivers on a class channel
    ///
    /// A channel found without receivers is dropped.
    pub fn subscriber_count(&self, class_id: &ClassId) -> usize {
        let mut channels = self.lock_channels();
        let count = channels
            .get(class_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0);
        if count == 0 {
            channels.remove(class_id);
        }
        count
    }
}

impl Default for LiveQueryHub {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Live query handle
///
/// Yields the initial snapshot, then every pushed snapshot. `None` means the
/// store closed the query. Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    class_id: ClassId,
    initial: Option<Snapshot>,
    rx: broadcast::Receiver<LivePush>,
    last_version: u64,
}

impl Subscription {
    pub fn new(class_id: ClassId, initial: Snapshot, rx: broadcast::Receiver<LivePush>) -> Self {
        Self {
            class_id,
            initial: Some(initial),
            rx,
            last_version: 0,
        }
    }

    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    /// Wait for the next snapshot
    pub async fn next(&mut self) -> Option<Result<Snapshot>> {
        if let Some(initial) = self.initial.take() {
            self.last_version = initial.version;
            return Some(Ok(initial));
        }

        loop {
            match self.rx.recv().await {
                Ok(LivePush::Snapshot(snapshot)) => {
                    // Pushes queued before the initial read are already reflected in it
                    if snapshot.version <= self.last_version {
                        continue;
                    }
                    self.last_version = snapshot.version;
                    return Some(Ok(snapshot));
                }
                Ok(LivePush::Failed(reason)) => {
                    return Some(Err(PulseError::Subscription(reason)));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Subscription on {} lagged by {} snapshots, resuming",
                        self.class_id, skipped
                    );
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a stream of snapshots (initial first, then live)
    pub fn into_stream(self) -> impl Stream<Item = Result<Snapshot>> + Send + 'static {
        let Subscription {
            initial,
            rx,
            last_version: _,
            class_id: _,
        } = self;

        let floor = initial.as_ref().map(|s| s.version).unwrap_or(0);
        let initial_stream = tokio_stream::iter(initial.into_iter().map(Ok));

        let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(LivePush::Snapshot(snapshot)) if snapshot.version > floor => Some(Ok(snapshot)),
            Ok(LivePush::Snapshot(_)) => None,
            Ok(LivePush::Failed(reason)) => Some(Err(PulseError::Subscription(reason))),
            Err(_) => None, // Skip lagged messages
        });

        initial_stream.chain(live_stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Reaction;

    fn entry(class: &ClassId, reaction: Reaction) -> FeedbackEntry {
        FeedbackEntry::new(class.clone(), reaction, "a@uni.edu")
    }

    #[tokio::test]
    async fn test_initial_then_live() {
        let hub = LiveQueryHub::new(8);
        let class = ClassId::new("cs101");

        let rx = hub.receiver(&class);
        let initial = hub.snapshot(&class, vec![]);
        let mut sub = Subscription::new(class.clone(), initial, rx);

        hub.publish(&class, vec![entry(&class, Reaction::Fast)]);

        let first = sub.next().await.unwrap().unwrap();
        assert!(first.entries.is_empty());
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.entries.len(), 1);
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn test_stale_push_is_skipped() {
        let hub = LiveQueryHub::new(8);
        let class = ClassId::new("cs101");

        let rx = hub.receiver(&class);
        // Published before the initial read, already contained in it
        hub.publish(&class, vec![entry(&class, Reaction::Fast)]);
        let initial = hub.snapshot(&class, vec![entry(&class, Reaction::Fast)]);
        let mut sub = Subscription::new(class.clone(), initial, rx);

        hub.publish(&class, vec![]);

        assert_eq!(sub.next().await.unwrap().unwrap().entries.len(), 1);
        assert!(sub.next().await.unwrap().unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_latest() {
        let hub = LiveQueryHub::new(2);
        let class = ClassId::new("cs101");

        let rx = hub.receiver(&class);
        let initial = hub.snapshot(&class, vec![]);
        let mut sub = Subscription::new(class.clone(), initial, rx);
        sub.next().await.unwrap().unwrap();

        for n in 1..=5 {
            let entries = (0..n).map(|_| entry(&class, Reaction::Good)).collect();
            hub.publish(&class, entries);
        }

        let mut last = 0;
        while let Ok(Some(Ok(snapshot))) =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await
        {
            last = snapshot.entries.len();
        }
        assert_eq!(last, 5);
    }

    #[tokio::test]
    async fn test_failure_is_surfaced() {
        let hub = LiveQueryHub::new(4);
        let class = ClassId::new("cs101");

        let rx = hub.receiver(&class);
        let initial = hub.snapshot(&class, vec![]);
        let mut sub = Subscription::new(class.clone(), initial, rx);
        sub.next().await.unwrap().unwrap();

        hub.fail(&class, "disk gone");
        assert!(matches!(
            sub.next().await,
            Some(Err(PulseError::Subscription(_)))
        ));
    }

    #[test]
    fn test_drop_releases_subscription() {
        let hub = LiveQueryHub::new(4);
        let class = ClassId::new("cs101");

        let rx = hub.receiver(&class);
        let sub = Subscription::new(class.clone(), hub.snapshot(&class, vec![]), rx);
        assert_eq!(hub.subscriber_count(&class), 1);

        drop(sub);
        assert_eq!(hub.subscriber_count(&class), 0);
        assert!(hub.lock_channels().is_empty());
    }

    #[test]
    fn test_idle_channels_are_pruned_on_subscribe() {
        let hub = LiveQueryHub::new(4);
        let classes: Vec<ClassId> = (0..3).map(|n| ClassId::new(format!("c{n}"))).collect();

        for class in &classes {
            drop(hub.receiver(class));
        }
        let _rx = hub.receiver(&ClassId::new("active"));

        let channels = hub.lock_channels();
        assert_eq!(channels.len(), 1);
        assert!(channels.contains_key(&ClassId::new("active")));
    }
}
