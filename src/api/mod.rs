//! HTTP API for live lecture feedback
//!
//! Provides:
//! - JSON endpoints for submission, tally and reset
//! - Server-Sent Events (SSE) for the live tally of a class
//! - An HTML live view with form submission
//! - An activity event stream

pub mod events;
pub mod server;
pub mod state;

pub use events::{Event, EventBroadcaster, EventType};
pub use server::{build_router, ApiServer, ApiServerConfig, FeedbackSummary, HealthResponse};
pub use state::{AppState, CurrentUser, USER_EMAIL_HEADER, USER_NAME_HEADER};
