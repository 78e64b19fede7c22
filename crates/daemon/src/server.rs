//! Local HTTP control surface.
//!
//! - `POST /api/control`: one [`ControlRequest`] in, one [`ControlResponse`] out
//! - `GET /api/events`: server-sent events for every observer
//! - `GET /api/observers/{handle}/events`: direct events for one observer
//! - `GET /api/health`

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chatwatch_core::{ControlRequest, ControlResponse, ObserverEvent, ObserverHandle};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::engine::EngineHandle;
use crate::fanout::FanOut;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub fanout: FanOut,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/control", post(control))
        .route("/events", get(events))
        .route("/observers/{handle}/events", get(observer_events));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// GET /api/health: daemon liveness check.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/control
async fn control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Json<ControlResponse> {
    Json(state.engine.request(request).await)
}

/// GET /api/events: every event, for any number of surfaces.
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.fanout.subscribe()).filter_map(|item| match item {
        Ok(event) => sse_event(&event).map(Ok),
        Err(lagged) => {
            debug!("Event subscriber lagged: {lagged}");
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/observers/{handle}/events: attaches `handle` as a direct
/// delivery target until the connection closes.
async fn observer_events(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.fanout.attach(ObserverHandle::new(handle));
    debug!(observer = %subscription.handle(), "Observer attached");
    let stream = subscription.filter_map(|event| sse_event(&event).map(Ok));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &ObserverEvent) -> Option<Event> {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!("Could not encode {} event: {e}", event.name());
            None
        }
    }
}
