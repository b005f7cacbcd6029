//! Live terminal view of a class's feedback
//!
//! Subscribes to `/classes/<id>/feedback/stream` via Server-Sent Events and
//! redraws the panel on every `state` event.
//!
//! # Reconnection
//!
//! Uses exponential backoff for reconnection:
//! - Base: 1 second
//! - Max: 30 seconds
//! - Resets on successful connection
//!
//! While disconnected the last tally stays on screen, marked stale.

use std::time::Duration;

use classpulse_core::{
    api::{USER_EMAIL_HEADER, USER_NAME_HEADER},
    error::{PulseError, Result},
    feedback::{FeedbackPanel, LiveState},
    types::ClassId,
};
use eventsource_client as es;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::client::PulseClient;

/// Reconnection settings for the watch loop
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

/// Terminal watcher for one class
pub struct Watcher<'a> {
    client: &'a PulseClient,
    class_id: ClassId,
    config: WatchConfig,
    state: LiveState,
    can_reset: bool,
}

impl<'a> Watcher<'a> {
    pub fn new(client: &'a PulseClient, class_id: ClassId, config: WatchConfig) -> Self {
        Self {
            client,
            class_id,
            config,
            state: LiveState::Loading,
            can_reset: false,
        }
    }

    /// Run until interrupted or rejected by the server
    pub async fn run(mut self) -> Result<()> {
        // The reset gate is decided server-side; ask once up front
        match self.client.counts(&self.class_id).await {
            Ok(summary) => self.can_reset = summary.can_reset,
            Err(
                e @ (PulseError::Forbidden(_)
                | PulseError::ClassNotFound(_)
                | PulseError::Unauthenticated(_)),
            ) => return Err(e),
            Err(e) => debug!("Could not fetch initial tally: {}", e),
        }
        self.draw();

        let mut delay = self.config.reconnect_delay_secs;
        loop {
            let result = tokio::select! {
                result = self.connect() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Watch interrupted");
                    return Ok(());
                }
            };

            let failed = match result {
                Ok(()) => {
                    info!("Live stream closed by server");
                    delay = self.config.reconnect_delay_secs;
                    false
                }
                Err(e) => {
                    warn!("Live stream error: {}", e);
                    true
                }
            };

            self.mark_degraded("disconnected from server");
            debug!("Reconnecting in {} seconds", delay);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                _ = tokio::signal::ctrl_c() => return Ok(()),
            }
            if failed {
                delay = next_delay(delay, &self.config);
            }
        }
    }

    async fn connect(&mut self) -> std::result::Result<(), String> {
        let url = format!(
            "{}/classes/{}/feedback/stream",
            self.client.base_url(),
            self.class_id
        );
        debug!("Connecting to {}", url);

        let mut builder = es::ClientBuilder::for_url(&url)
            .and_then(|b| b.header(USER_EMAIL_HEADER, self.client.email()))
            .map_err(|e| format!("failed to build client: {}", e))?;
        if let Some(name) = self.client.name() {
            builder = builder
                .header(USER_NAME_HEADER, name)
                .map_err(|e| format!("failed to build client: {}", e))?;
        }
        let client = builder
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();

        let mut stream = es::Client::stream(&client);
        while let Some(item) = stream.next().await {
            match item {
                Ok(es::SSE::Connected(_)) => debug!("Connected to live stream"),
                Ok(es::SSE::Event(event)) if event.event_type == "state" => {
                    match serde_json::from_str::<LiveState>(&event.data) {
                        Ok(state) => {
                            self.state = state;
                            self.draw();
                        }
                        Err(e) => warn!("Ignoring malformed state event: {}", e),
                    }
                }
                Ok(es::SSE::Event(event)) => {
                    debug!("Ignoring event of type {}", event.event_type)
                }
                Ok(es::SSE::Comment(_)) => {}
                Err(e) => return Err(e.to_string()),
            }
        }

        Ok(())
    }

    fn mark_degraded(&mut self, reason: &str) {
        if let LiveState::Degraded { .. } = self.state {
            return;
        }
        self.state = LiveState::Degraded {
            last: self.state.counts(),
            reason: reason.to_string(),
        };
        self.draw();
    }

    fn draw(&self) {
        let panel = FeedbackPanel::build(self.class_id.clone(), &self.state, self.can_reset);
        // Clear screen, cursor home
        print!("\x1b[2J\x1b[H{}", panel.render_text());
    }
}

/// Backoff step after a failed attempt
fn next_delay(delay: u64, config: &WatchConfig) -> u64 {
    (delay * 2).min(config.max_reconnect_delay_secs)
}

/// Handle `watch`
pub async fn handle(client: &PulseClient, class_id: ClassId) -> Result<()> {
    Watcher::new(client, class_id, WatchConfig::default())
        .run()
        .await
}
