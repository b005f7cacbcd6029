//! Live aggregation of a class's feedback
//!
//! The aggregator owns one live query for the active class and republishes
//! the recomputed tally through a `watch` channel on every push. Each push
//! carries the full entry set, so the published state never depends on the
//! order pushes arrive in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::feedback::aggregate::AggregateCounts;
use crate::storage::{DocumentStore, Subscription};
use crate::types::ClassId;

/// Published aggregation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LiveState {
    /// No snapshot received yet
    Loading,
    /// Counts from the latest snapshot
    Live { counts: AggregateCounts, version: u64 },
    /// Live updates broke; `last` is the most recent tally, now stale
    Degraded {
        last: Option<AggregateCounts>,
        reason: String,
    },
}

impl LiveState {
    /// Latest known counts, stale or not
    pub fn counts(&self) -> Option<AggregateCounts> {
        match self {
            LiveState::Loading => None,
            LiveState::Live { counts, .. } => Some(*counts),
            LiveState::Degraded { last, .. } => *last,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, LiveState::Live { .. })
    }
}

/// Drive a subscription, publishing each recomputed tally
///
/// Returns when the store closes the query.
pub async fn follow(mut subscription: Subscription, state: &watch::Sender<LiveState>) {
    let class_id = subscription.class_id().clone();

    while let Some(push) = subscription.next().await {
        match push {
            Ok(snapshot) => {
                let counts = AggregateCounts::from_entries(snapshot.entries.iter());
                debug!(
                    "Live tally for {} at v{}: {:?}",
                    class_id, snapshot.version, counts.counts
                );
                state.send_replace(LiveState::Live {
                    counts,
                    version: snapshot.version,
                });
            }
            Err(e) => {
                warn!("Live updates for {} degraded: {}", class_id, e);
                let last = state.borrow().counts();
                state.send_replace(LiveState::Degraded {
                    last,
                    reason: e.to_string(),
                });
            }
        }
    }

    warn!("Live query for {} closed", class_id);
    let last = state.borrow().counts();
    state.send_replace(LiveState::Degraded {
        last,
        reason: "live updates closed".to_string(),
    });
}

/// Live feedback aggregator bound to at most one class at a time
pub struct FeedbackAggregator {
    store: Arc<dyn DocumentStore>,
    state: Arc<watch::Sender<LiveState>>,
    active: Option<(ClassId, JoinHandle<()>)>,
}

impl FeedbackAggregator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let (state, _rx) = watch::channel(LiveState::Loading);
        Self {
            store,
            state: Arc::new(state),
            active: None,
        }
    }

    /// Receiver that observes every state replacement
    pub fn watch(&self) -> watch::Receiver<LiveState> {
        self.state.subscribe()
    }

    /// Current state
    pub fn current(&self) -> LiveState {
        self.state.borrow().clone()
    }

    pub fn active_class(&self) -> Option<&ClassId> {
        self.active.as_ref().map(|(class_id, _)| class_id)
    }

    /// Start following `class_id`, releasing any previous class first
    ///
    /// On subscription failure the state becomes `Degraded` and the error is
    /// returned.
    pub async fn start(&mut self, class_id: ClassId) -> Result<()> {
        self.stop().await;
        self.state.send_replace(LiveState::Loading);

        let subscription = match self.store.subscribe(&class_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Could not subscribe to {}: {}", class_id, e);
                self.state.send_replace(LiveState::Degraded {
                    last: None,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        info!("Aggregator following {}", class_id);
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            follow(subscription, &state).await;
        });

        self.active = Some((class_id, handle));
        Ok(())
    }

    /// Switch to another class; alias of [`start`](Self::start)
    pub async fn switch_class(&mut self, class_id: ClassId) -> Result<()> {
        self.start(class_id).await
    }

    /// Release the active subscription
    ///
    /// Returns once the following task has finished, so the store no longer
    /// counts the subscription.
    pub async fn stop(&mut self) {
        if let Some((class_id, handle)) = self.active.take() {
            handle.abort();
            let _ = handle.await;
            debug!("Aggregator released {}", class_id);
        }
    }
}

impl Drop for FeedbackAggregator {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.active.take() {
            handle.abort();
        }
    }
}
