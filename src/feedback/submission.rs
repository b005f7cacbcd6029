//! Feedback submission

use tracing::{debug, warn};

use crate::class::ClassContext;
use crate::error::Result;
use crate::storage::DocumentStore;
use crate::types::{FeedbackEntry, Reaction};

/// Write one reaction for the context's user into the context's class
///
/// The caller's view is not updated here; the new entry reaches aggregators
/// through their live queries. A failed write is returned, never swallowed.
pub async fn submit_feedback(
    store: &dyn DocumentStore,
    ctx: &ClassContext,
    reaction: Reaction,
) -> Result<FeedbackEntry> {
    let entry = FeedbackEntry::new(ctx.class_id.clone(), reaction, ctx.user.submitter());

    match store.write_entry(&entry).await {
        Ok(()) => {
            debug!(
                "Feedback {} submitted to {} ({})",
                entry.reaction, entry.class_id, entry.id
            );
            Ok(entry)
        }
        Err(e) => {
            warn!("Failed to submit feedback to {}: {}", ctx.class_id, e);
            Err(e)
        }
    }
}
