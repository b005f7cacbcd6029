//! Shared handler state and caller identity

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use super::events::EventBroadcaster;
use crate::class::{ClassContext, ClassDirectory, UserIdentity};
use crate::error::{PulseError, Result};
use crate::storage::DocumentStore;
use crate::types::ClassId;

/// Header carrying the authenticated user's email
pub const USER_EMAIL_HEADER: &str = "x-user-email";
/// Optional header carrying the user's display name
pub const USER_NAME_HEADER: &str = "x-user-name";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub directory: Arc<ClassDirectory>,
    pub events: EventBroadcaster,
    pub instance_id: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        directory: ClassDirectory,
        events: EventBroadcaster,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            directory: Arc::new(directory),
            events,
            instance_id: instance_id.into(),
        }
    }

    /// Resolve the class context for the calling user
    pub fn context(&self, class_id: &ClassId, user: CurrentUser) -> Result<ClassContext> {
        self.directory.context_for(class_id, user.0)
    }
}

/// Identity placed on the request by the fronting identity provider
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserIdentity);

impl CurrentUser {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self> {
        let email = headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                PulseError::Unauthenticated(format!("missing {} header", USER_EMAIL_HEADER))
            })?;

        let mut user = UserIdentity::new(email);
        if let Some(name) = headers
            .get(USER_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
        {
            user = user.with_display_name(name.trim());
        }
        Ok(Self(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = PulseError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        Self::from_headers(&parts.headers)
    }
}
