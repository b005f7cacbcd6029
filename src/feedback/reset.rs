//! Tutor reset of a class's feedback
//!
//! Deletes run as one awaited task group. Every entry's outcome is collected
//! so a partial failure is reported instead of lost.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::class::{ClassContext, ElevatedAccess};
use crate::error::{PulseError, Result};
use crate::storage::DocumentStore;
use crate::types::{ClassId, EntryId};

/// Entry that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelete {
    pub id: EntryId,
    pub error: String,
}

/// Outcome of a reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub class_id: ClassId,
    /// Entries present when the reset started
    pub requested: usize,
    /// Entries confirmed gone (including ones removed concurrently by someone else)
    pub deleted: usize,
    pub failed: Vec<FailedDelete>,
}

impl ResetReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every feedback entry of the context's class
///
/// Refused with `Forbidden` unless the context has elevated access. Fails
/// outright only if the entries cannot be listed.
pub async fn reset_feedback(
    store: Arc<dyn DocumentStore>,
    ctx: &ClassContext,
) -> Result<ResetReport> {
    if !ctx.has_elevated_access() {
        warn!(
            "Reset of {} refused for {}: no elevated access",
            ctx.class_id, ctx.user.email
        );
        return Err(PulseError::Forbidden(format!(
            "{} may not reset feedback for {}",
            ctx.user.email, ctx.class_id
        )));
    }

    let entries = store.list_entries(&ctx.class_id).await?;
    let requested = entries.len();
    info!("Resetting {} feedback entries in {}", requested, ctx.class_id);

    let mut pending: HashSet<EntryId> = entries.iter().map(|e| e.id.clone()).collect();
    let mut tasks = JoinSet::new();

    for entry in entries {
        let store = Arc::clone(&store);
        let class_id = ctx.class_id.clone();
        tasks.spawn(async move {
            let result = store.delete_entry(&class_id, &entry.id).await;
            (entry.id, result)
        });
    }

    let mut deleted = 0;
    let mut failed = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(()))) => {
                pending.remove(&id);
                deleted += 1;
            }
            Ok((id, Err(PulseError::EntryNotFound(_)))) => {
                debug!("Entry {} already gone during reset", id);
                pending.remove(&id);
                deleted += 1;
            }
            Ok((id, Err(e))) => {
                warn!("Failed to delete feedback entry {}: {}", id, e);
                pending.remove(&id);
                failed.push(FailedDelete {
                    id,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                // The id is recovered from `pending` below
                warn!("Delete task did not complete: {}", e);
            }
        }
    }

    for id in pending {
        failed.push(FailedDelete {
            id,
            error: "delete task aborted".to_string(),
        });
    }

    let report = ResetReport {
        class_id: ctx.class_id.clone(),
        requested,
        deleted,
        failed,
    };

    if report.is_complete() {
        info!("Reset of {} complete ({} deleted)", ctx.class_id, deleted);
    } else {
        warn!(
            "Reset of {} incomplete: {} of {} deletes failed",
            ctx.class_id,
            report.failed.len(),
            requested
        );
    }

    Ok(report)
}
