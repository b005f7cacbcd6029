//! classpulse - live lecture feedback
//!
//! Students submit one of four reactions (fast, slow, confusing, good) to the
//! active class; everyone viewing the class sees the per-reaction share
//! update live, and tutors can wipe the class's responses.
//!
//! # Architecture
//!
//! - **Types**: reactions, class and entry identifiers, feedback entries
//! - **Storage**: document store with live queries (libsql, in-memory)
//! - **Feedback**: submission, aggregation, reset and the panel render model
//! - **Class**: active class and tutor gate
//! - **API**: axum server with JSON, SSE and HTML endpoints
//!
//! # Example
//!
//! ```ignore
//! use classpulse_core::{ClassContext, ClassId, FeedbackAggregator, InMemoryStore, Reaction, UserIdentity};
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let ctx = ClassContext::new(ClassId::new("cs101"), UserIdentity::new("a@uni.edu"), false);
//!
//! let mut aggregator = FeedbackAggregator::new(store.clone());
//! aggregator.start(ctx.class_id.clone()).await?;
//!
//! submit_feedback(store.as_ref(), &ctx, Reaction::Slow).await?;
//! println!("{:?}", aggregator.current());
//! ```

pub mod api;
pub mod class;
pub mod config;
pub mod error;
pub mod feedback;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use class::{ClassContext, ClassDirectory, ClassInfo, ElevatedAccess, UserIdentity};
pub use config::PulseConfig;
pub use error::{PulseError, Result};
pub use feedback::{
    reset_feedback, submit_feedback, AggregateCounts, FeedbackAggregator, FeedbackPanel,
    LiveState, Notice, ResetReport,
};
pub use storage::{
    libsql::{ConnectionMode, LibsqlStore},
    memory::InMemoryStore,
    DocumentStore, Subscription,
};
pub use types::{ClassId, EntryId, FeedbackEntry, Reaction};
