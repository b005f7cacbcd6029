//! HTTP API server with SSE support

use super::{
    events::{Event, EventBroadcaster},
    state::{AppState, CurrentUser},
};
use crate::class::{ClassDirectory, ElevatedAccess};
use crate::error::{PulseError, Result};
use crate::feedback::{
    reset_feedback, submit_feedback, AggregateCounts, Bar, FeedbackAggregator, FeedbackPanel,
    LiveState, Notice, ResetReport,
};
use crate::storage::DocumentStore;
use crate::types::{ClassId, FeedbackEntry, Reaction};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive},
        Html, IntoResponse, Redirect, Response, Sse,
    },
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    Stream, StreamExt as _,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// How long the HTML view waits for the first snapshot
const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub addr: SocketAddr,
    /// Activity event channel capacity
    pub event_capacity: usize,
    pub heartbeat_secs: u64,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 3000).into(),
            event_capacity: 1000,
            heartbeat_secs: 10,
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    /// Shutdown signal for background tasks
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
    heartbeat_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        store: Arc<dyn DocumentStore>,
        directory: ClassDirectory,
    ) -> Self {
        let events = EventBroadcaster::new(config.event_capacity);
        let instance_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let state = AppState::new(store, directory, events, instance_id);
        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
            heartbeat_handle: None,
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.state.events
    }

    pub fn instance_id(&self) -> &str {
        &self.state.instance_id
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start serving with dynamic port allocation
    ///
    /// Tries the configured address first, then the next ten ports.
    pub async fn serve(mut self) -> anyhow::Result<()> {
        let router = build_router(self.state.clone());
        let instance_id = self.state.instance_id.clone();

        let _ = self
            .state
            .events
            .broadcast(Event::session_started(instance_id.clone()));

        let events = self.state.events.clone();
        let heartbeat_id = instance_id.clone();
        let period = Duration::from_secs(self.config.heartbeat_secs.max(1));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.heartbeat_handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let _ = events.broadcast(Event::heartbeat(heartbeat_id.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Heartbeat task received shutdown signal");
                        break;
                    }
                }
            }
        }));

        let base_port = self.config.addr.port();
        for offset in 0..=10u16 {
            let addr = SocketAddr::new(self.config.addr.ip(), base_port.saturating_add(offset));

            match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!("API server [{}] listening on http://{}", instance_id, addr);
                    info!("Live view: http://{}/classes/<class_id>/live", addr);
                    axum::serve(listener, router)
                        .with_graceful_shutdown(shutdown_signal())
                        .await?;
                    info!("API server [{}] stopped", instance_id);
                    return Ok(());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                    debug!("Port {} in use, trying next", addr.port());
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!(
            "All ports ({}-{}) are in use; API server unavailable for instance {}",
            base_port,
            base_port.saturating_add(10),
            instance_id
        ))
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.heartbeat_handle.take() {
            handle.abort();
            debug!("ApiServer dropped - heartbeat task aborted");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Build the router over shared state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/events", get(events_handler))
        .route("/classes", get(list_classes_handler))
        .route(
            "/classes/:class_id/feedback",
            get(get_feedback_handler).post(submit_feedback_handler),
        )
        .route("/classes/:class_id/feedback/reset", post(reset_handler))
        .route("/classes/:class_id/feedback/stream", get(stream_handler))
        .route(
            "/classes/:class_id/live",
            get(live_page_handler).post(live_submit_handler),
        )
        .route("/classes/:class_id/live/reset", post(live_reset_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
    pub subscribers: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
        subscribers: state.events.subscriber_count(),
    })
}

/// Activity events stream
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    debug!("New activity SSE client connected");

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).ok()?;
            Some(Ok(SseEvent::default().data(data).id(event.id)))
        }
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassSummary {
    pub id: ClassId,
    pub name: String,
}

async fn list_classes_handler(State(state): State<AppState>) -> Json<Vec<ClassSummary>> {
    Json(
        state
            .directory
            .list()
            .into_iter()
            .map(|c| ClassSummary {
                id: c.id.clone(),
                name: c.name.clone(),
            })
            .collect(),
    )
}

/// Point-in-time tally of a class
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub class_id: ClassId,
    pub counts: AggregateCounts,
    pub total: u64,
    pub bars: Vec<Bar>,
    /// Whether the caller may reset this class
    pub can_reset: bool,
}

async fn get_feedback_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
) -> Result<Json<FeedbackSummary>> {
    let ctx = state.context(&ClassId::new(class_id), user)?;
    let entries = state.store.list_entries(&ctx.class_id).await?;
    let counts = AggregateCounts::from_entries(entries.iter());

    Ok(Json(FeedbackSummary {
        class_id: ctx.class_id.clone(),
        counts,
        total: counts.total(),
        bars: counts.breakdown().into_iter().map(Bar::from).collect(),
        can_reset: ctx.has_elevated_access(),
    }))
}

/// Body of a submission
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub reaction: String,
}

async fn submit(
    state: &AppState,
    class_id: String,
    user: CurrentUser,
    reaction: &str,
) -> Result<FeedbackEntry> {
    let ctx = state.context(&ClassId::new(class_id), user)?;
    let reaction: Reaction = reaction.parse()?;
    let entry = submit_feedback(state.store.as_ref(), &ctx, reaction).await?;

    let _ = state
        .events
        .broadcast(Event::feedback_submitted(ctx.class_id, reaction));
    Ok(entry)
}

async fn submit_feedback_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<FeedbackEntry>)> {
    let entry = submit(&state, class_id, user, &req.reaction).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn reset(state: &AppState, class_id: String, user: CurrentUser) -> Result<ResetReport> {
    let ctx = state.context(&ClassId::new(class_id), user)?;
    let report = reset_feedback(Arc::clone(&state.store), &ctx).await?;

    let _ = state.events.broadcast(Event::feedback_reset(
        report.class_id.clone(),
        report.deleted,
        report.failed.len(),
    ));
    Ok(report)
}

/// Reset answers 200 when every entry went, 207 when some deletes failed
async fn reset_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<ResetReport>)> {
    let report = reset(&state, class_id, user).await?;
    let status = if report.is_complete() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}

/// Live tally stream, one live query per connection
///
/// Emits a `state` event carrying the [`LiveState`] JSON on every change.
/// The query is released when the client disconnects.
async fn stream_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
) -> Result<Sse<impl tokio_stream::Stream<Item = std::result::Result<SseEvent, Infallible>>>> {
    let ctx = state.context(&ClassId::new(class_id), user)?;
    let class_id = ctx.class_id.clone();
    debug!("Live stream for {} opened by {}", class_id, ctx.user.email);

    let mut aggregator = FeedbackAggregator::new(Arc::clone(&state.store));
    aggregator.start(class_id.clone()).await?;
    let events = state.events.clone();

    let stream = LiveStateStream::new(aggregator).map(move |live| {
        if let LiveState::Degraded { reason, .. } = &live {
            let _ = events.broadcast(Event::live_updates_degraded(class_id.clone(), reason.clone()));
        }
        let data = serde_json::to_string(&live).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().event("state").data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Aggregator state changes as a stream
///
/// Owns the aggregator, so dropping the stream stops it and releases its live
/// query.
struct LiveStateStream {
    states: WatchStream<LiveState>,
    _aggregator: FeedbackAggregator,
}

impl LiveStateStream {
    fn new(aggregator: FeedbackAggregator) -> Self {
        Self {
            states: WatchStream::new(aggregator.watch()),
            _aggregator: aggregator,
        }
    }
}

impl Stream for LiveStateStream {
    type Item = LiveState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LiveState>> {
        Pin::new(&mut self.states).poll_next(cx)
    }
}

/// First settled state of a class, for one-shot rendering
async fn first_state(state: &AppState, class_id: &ClassId) -> LiveState {
    let mut aggregator = FeedbackAggregator::new(Arc::clone(&state.store));
    if aggregator.start(class_id.clone()).await.is_err() {
        return aggregator.current();
    }

    let mut rx = aggregator.watch();
    let live = {
        let settled = tokio::time::timeout(
            FIRST_SNAPSHOT_TIMEOUT,
            rx.wait_for(|s| !matches!(s, LiveState::Loading)),
        )
        .await;
        match settled {
            Ok(Ok(live)) => live.clone(),
            _ => aggregator.current(),
        }
    };
    aggregator.stop().await;
    live
}

async fn render_panel(
    state: &AppState,
    class_id: String,
    user: CurrentUser,
    notice: impl FnOnce() -> Option<Notice>,
) -> Result<FeedbackPanel> {
    let ctx = state.context(&ClassId::new(class_id), user)?;
    let live = first_state(state, &ctx.class_id).await;
    let mut panel = FeedbackPanel::build(ctx.class_id.clone(), &live, ctx.has_elevated_access());
    if let Some(notice) = notice() {
        panel = panel.with_notice(notice);
    }
    Ok(panel)
}

async fn live_page_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
) -> Result<Html<String>> {
    let panel = render_panel(&state, class_id, user, || None).await?;
    Ok(Html(panel.render_html()))
}

/// Form body posted by the live page
#[derive(Debug, Deserialize)]
pub struct ReactionForm {
    pub reaction: String,
}

async fn live_submit_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
    Form(form): Form<ReactionForm>,
) -> Response {
    match submit(&state, class_id.clone(), user.clone(), &form.reaction).await {
        Ok(_) => Redirect::to(&format!("/classes/{}/live", class_id)).into_response(),
        Err(e @ (PulseError::ClassNotFound(_) | PulseError::Forbidden(_))) => e.into_response(),
        Err(e) => {
            let status = e.status_code();
            let reason = e.to_string();
            match render_panel(&state, class_id, user, || {
                Some(Notice::SubmissionFailed { reason })
            })
            .await
            {
                Ok(panel) => (status, Html(panel.render_html())).into_response(),
                Err(e) => e.into_response(),
            }
        }
    }
}

async fn live_reset_handler(
    State(state): State<AppState>,
    Path(class_id): Path<String>,
    user: CurrentUser,
) -> Result<Html<String>> {
    let report = reset(&state, class_id.clone(), user.clone()).await?;
    let panel = render_panel(&state, class_id, user, || Some(Notice::from_reset(&report))).await?;
    Ok(Html(panel.render_html()))
}
