//! HTTP client for a running classpulse server
//!
//! Used by the `submit`, `counts` and `reset` commands. Identity travels in
//! the same headers the fronting identity provider would set.

use std::time::Duration;

use classpulse_core::{
    api::{FeedbackSummary, USER_EMAIL_HEADER, USER_NAME_HEADER},
    error::{PulseError, Result},
    feedback::{FeedbackPanel, LiveState, Notice, ResetReport},
    types::{ClassId, FeedbackEntry, Reaction},
};
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

/// Client bound to one server and one user
pub struct PulseClient {
    base_url: String,
    email: String,
    name: Option<String>,
    http: reqwest::Client,
}

impl PulseClient {
    pub fn new(base_url: &str, email: impl Into<String>, name: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.into(),
            name,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_EMAIL_HEADER, &self.email);
        if let Some(name) = &self.name {
            req = req.header(USER_NAME_HEADER, name);
        }
        req
    }

    pub async fn submit(&self, class_id: &ClassId, reaction: Reaction) -> Result<FeedbackEntry> {
        debug!("Submitting {} to {}", reaction, class_id);
        let resp = self
            .request(reqwest::Method::POST, &format!("/classes/{}/feedback", class_id))
            .json(&json!({ "reaction": reaction.as_str() }))
            .send()
            .await?;
        Ok(error_for_status(resp).await?.json().await?)
    }

    pub async fn counts(&self, class_id: &ClassId) -> Result<FeedbackSummary> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/classes/{}/feedback", class_id))
            .send()
            .await?;
        Ok(error_for_status(resp).await?.json().await?)
    }

    pub async fn reset(&self, class_id: &ClassId) -> Result<ResetReport> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/classes/{}/feedback/reset", class_id),
            )
            .send()
            .await?;
        Ok(error_for_status(resp).await?.json().await?)
    }
}

/// Map an error response back onto the error it came from
async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => PulseError::Unauthenticated(message),
        StatusCode::FORBIDDEN => PulseError::Forbidden(message),
        StatusCode::NOT_FOUND => PulseError::ClassNotFound(message),
        StatusCode::BAD_REQUEST => PulseError::InvalidReaction(message),
        StatusCode::SERVICE_UNAVAILABLE => PulseError::Database(message),
        _ => PulseError::Other(message),
    })
}

/// Handle `submit`
pub async fn submit(client: &PulseClient, class_id: ClassId, reaction: &str) -> Result<()> {
    let reaction: Reaction = reaction.parse()?;
    match client.submit(&class_id, reaction).await {
        Ok(entry) => {
            println!("Submitted '{}' to {} ({})", entry.reaction, class_id, entry.id);
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                Notice::SubmissionFailed {
                    reason: e.to_string()
                }
                .message()
            );
            Err(e)
        }
    }
}

/// Handle `counts`
pub async fn counts(client: &PulseClient, class_id: ClassId, json: bool) -> Result<()> {
    let summary = client.counts(&class_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let state = LiveState::Live {
        counts: summary.counts,
        version: 0,
    };
    print!(
        "{}",
        FeedbackPanel::build(class_id, &state, summary.can_reset).render_text()
    );
    Ok(())
}

/// Handle `reset`
pub async fn reset(client: &PulseClient, class_id: ClassId) -> Result<()> {
    let report = client.reset(&class_id).await?;
    println!("{}", Notice::from_reset(&report).message());
    for failed in &report.failed {
        println!("  {} : {}", failed.id, failed.error);
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(PulseError::Other(format!(
            "{} of {} deletes failed",
            report.failed.len(),
            report.requested
        )))
    }
}
