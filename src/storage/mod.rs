//! Storage layer for classpulse
//!
//! A document store holding per-class feedback entries, with point writes,
//! point deletes, listing and live-query subscriptions that push the full
//! current entry set on every change.

pub mod libsql;
pub mod live;
pub mod memory;

use crate::error::Result;
use crate::types::{ClassId, EntryId, FeedbackEntry};
use async_trait::async_trait;

pub use live::{LivePush, LiveQueryHub, Snapshot, Subscription};

/// Document store trait defining all required operations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new entry under its class
    async fn write_entry(&self, entry: &FeedbackEntry) -> Result<()>;

    /// List every entry of a class (order unspecified)
    async fn list_entries(&self, class_id: &ClassId) -> Result<Vec<FeedbackEntry>>;

    /// Delete one entry; `EntryNotFound` if it is already gone
    async fn delete_entry(&self, class_id: &ClassId, id: &EntryId) -> Result<()>;

    /// Open a live query on a class
    ///
    /// The returned subscription yields the current entry set first and then
    /// a full snapshot after every change. Dropping it releases the query.
    async fn subscribe(&self, class_id: &ClassId) -> Result<Subscription>;

    /// Number of live subscriptions on a class
    fn subscriber_count(&self, class_id: &ClassId) -> usize;
}
