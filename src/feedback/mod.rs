//! Live lecture feedback
//!
//! - [`submission`]: write one reaction per user action
//! - [`aggregate`]: per-reaction tally and percentages
//! - [`aggregator`]: live projection driven by a store subscription
//! - [`reset`]: tutor-only bulk delete with a per-entry report
//! - [`view`]: render model, text and HTML output

pub mod aggregate;
pub mod aggregator;
pub mod reset;
pub mod submission;
pub mod view;

pub use aggregate::{AggregateCounts, ReactionShare};
pub use aggregator::{FeedbackAggregator, LiveState};
pub use reset::{reset_feedback, FailedDelete, ResetReport};
pub use submission::submit_feedback;
pub use view::{Bar, FeedbackPanel, Notice, PanelBody};
