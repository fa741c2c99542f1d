use crate::influx::InfluxClient;
use crate::model::ReadingResponse;
use crate::service::SensorService;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    service: Arc<SensorService<InfluxClient>>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    days: Option<u32>,
}

pub fn create_router(service: Arc<SensorService<InfluxClient>>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/api/v1/readings/latest", get(get_latest))
        .route("/api/v1/readings/history", get(get_history))
        .with_state(state)
}

/// Latest reading per channel. The service degrades internally, so this
/// handler always answers 200 with whatever data is available.
async fn get_latest(State(state): State<AppState>) -> Json<ReadingResponse> {
    let data = state.service.latest().await;
    Json(ReadingResponse {
        total: data.len(),
        data,
    })
}

/// Daily mean aggregates over the requested lookback window.
async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Json<ReadingResponse> {
    let days = params.days.unwrap_or(30).clamp(1, 365);
    let data = state.service.historical(days).await;
    Json(ReadingResponse {
        total: data.len(),
        data,
    })
}
