use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use hail_core::AuthUser;
use hail_shared::Coordinates;
use hail_trip::InMemoryDriverIndex;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::require_driver;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub lat: f64,
    pub lng: f64,
}

/// Position reporting for drivers, served when drivers are tracked in process.
pub fn driver_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/drivers/me/location", put(update_location).delete(go_offline))
        .route_layer(axum::middleware::from_fn(require_driver))
}

fn index(state: &AppState) -> Result<&Arc<InMemoryDriverIndex>, AppError> {
    state.drivers.as_ref().ok_or_else(|| {
        AppError::NotFoundError("driver positions are managed by the driver service".to_string())
    })
}

async fn update_location(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<LocationUpdate>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(update) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let coord = Coordinates::new(update.lat, update.lng);
    if !coord.is_valid() {
        return Err(AppError::ValidationError("coordinates out of range".to_string()));
    }

    index(&state)?.upsert(user.id, coord).await;
    tracing::debug!(driver_id = user.id, lat = coord.lat, lng = coord.lng, "Driver position updated");
    Ok(StatusCode::NO_CONTENT)
}

async fn go_offline(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> Result<StatusCode, AppError> {
    if index(&state)?.remove(user.id).await {
        tracing::debug!(driver_id = user.id, "Driver went offline");
    }
    Ok(StatusCode::NO_CONTENT)
}
