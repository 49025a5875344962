use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationManager, Phase};
use crate::channel::{StateChannel, StatusSnapshot};
use crate::commands::{dispatch, CalCommand, CommandReply};
use crate::service::now_ms;
use crate::watch::WatchRegistry;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    manager: Arc<Mutex<CalibrationManager>>,
    channel: Arc<StateChannel>,
    watches: Arc<WatchRegistry>,
}

impl ApiState {
    pub fn new(
        manager: Arc<Mutex<CalibrationManager>>,
        channel: Arc<StateChannel>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            manager,
            channel,
            watches,
        }
    }

    fn run(&self, command: CalCommand) -> CommandReply {
        let mut manager = self
            .manager
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        dispatch(command, &mut manager, &self.channel, now_ms())
    }
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum ApiError {
    Command(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Command(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub calibration_active: bool,
    pub watch_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub phase: String,
    pub interval_sec: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub param: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchRequest {
    pub interval_sec: Option<u64>,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(monitor_status))
        .route("/cal", get(cal_help))
        .route("/cal/params", get(cal_params))
        .route("/cal/status", get(cal_status))
        .route("/cal/start", post(cal_start))
        .route("/cal/set", post(cal_set))
        .route("/cal/watch", post(cal_watch))
        .route("/cal/watch_stop", post(cal_watch_stop))
        .route("/cal/stop", post(cal_stop))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: ApiState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding API listener")?;
    let router = build_router(state);
    axum::serve(listener, router)
        .await
        .context("serving API router")?;
    Ok(())
}

fn reply_response(reply: CommandReply) -> Result<Json<CommandReply>, ApiError> {
    if reply.ok {
        Ok(Json(reply))
    } else {
        Err(ApiError::Command(reply.text))
    }
}

pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let calibration_active = state
        .manager
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .is_active();
    Json(HealthResponse {
        status: "ok",
        calibration_active,
        watch_count: state.watches.active_count(),
    })
}

/// Latest status snapshot from the audio process, if one was published
pub async fn monitor_status(
    State(state): State<ApiState>,
) -> Result<Json<Option<StatusSnapshot>>, ApiError> {
    state
        .channel
        .read_status()
        .map(Json)
        .map_err(|err| ApiError::Unavailable(err.to_string()))
}

pub async fn cal_help(State(state): State<ApiState>) -> Json<CommandReply> {
    Json(state.run(CalCommand::Help))
}

pub async fn cal_params(State(state): State<ApiState>) -> Result<Json<CommandReply>, ApiError> {
    reply_response(state.run(CalCommand::Params))
}

pub async fn cal_status(State(state): State<ApiState>) -> Result<Json<CommandReply>, ApiError> {
    reply_response(state.run(CalCommand::Status))
}

pub async fn cal_start(
    State(state): State<ApiState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<CommandReply>, ApiError> {
    let phase: Phase = request
        .phase
        .parse()
        .map_err(|err| ApiError::Command(format!("{}", err)))?;
    reply_response(state.run(CalCommand::Start {
        phase,
        interval: request.interval_sec,
    }))
}

pub async fn cal_set(
    State(state): State<ApiState>,
    Json(request): Json<SetRequest>,
) -> Result<Json<CommandReply>, ApiError> {
    reply_response(state.run(CalCommand::Set {
        param: request.param,
        value: request.value,
    }))
}

/// Enable the periodic watch task alongside the session flag
pub async fn cal_watch(
    State(state): State<ApiState>,
    Json(request): Json<WatchRequest>,
) -> Result<Json<CommandReply>, ApiError> {
    let reply = state.run(CalCommand::Watch {
        interval: request.interval_sec,
    });
    if !reply.ok {
        return Err(ApiError::Command(reply.text));
    }

    let interval_sec = {
        let manager = state
            .manager
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        manager
            .session()
            .map(|session| session.interval_sec)
            .unwrap_or(crate::calibration::DEFAULT_CALIBRATION_INTERVAL_SECONDS)
    };

    let emitter_state = state.clone();
    state
        .watches
        .start("http", Duration::from_secs(interval_sec), move || {
            let status = emitter_state.run(CalCommand::Status);
            info!("[watch] {}", status.text);
        })
        .await;

    Ok(Json(reply))
}

pub async fn cal_watch_stop(
    State(state): State<ApiState>,
) -> Result<Json<CommandReply>, ApiError> {
    state.watches.stop("http").await;
    reply_response(state.run(CalCommand::WatchStop))
}

pub async fn cal_stop(State(state): State<ApiState>) -> Result<Json<CommandReply>, ApiError> {
    let reply = state.run(CalCommand::Stop);
    if reply.ok {
        state.watches.stop_all().await;
    }
    reply_response(reply)
}
