use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hail_core::{AuthUser, Rating, Trip, TripView};
use hail_trip::{RatingRequest, TripRequest};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{require_driver, require_passenger};
use crate::state::AppState;

pub fn passenger_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(create_trip))
        .route("/v1/trips/{id}/cancel", post(cancel_trip))
        .route("/v1/trips/{id}/rematch", post(retry_matching))
        .route("/v1/trips/{id}/rating", post(rate_trip))
        .route_layer(axum::middleware::from_fn(require_passenger))
}

pub fn driver_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}/accept", post(accept_trip))
        .route("/v1/trips/{id}/reject", post(reject_trip))
        .route("/v1/trips/{id}/start", post(start_trip))
        .route("/v1/trips/{id}/complete", post(complete_trip))
        .route_layer(axum::middleware::from_fn(require_driver))
}

pub fn shared_routes() -> Router<AppState> {
    Router::new().route("/v1/trips/{id}", get(get_trip))
}

async fn create_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let result = state.trips.create_trip(&user, request).await;
    state.metrics.observe("create_trip", &result);
    Ok((StatusCode::CREATED, Json(result?)))
}

async fn get_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TripView>, AppError> {
    let result = state.trips.get_trip(&user, id).await;
    state.metrics.observe("get_trip", &result);
    Ok(Json(result?))
}

async fn accept_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.accept_trip(&user, id).await;
    state.metrics.observe("accept_trip", &result);
    Ok(Json(result?))
}

async fn reject_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.reject_trip(&user, id).await;
    state.metrics.observe("reject_trip", &result);
    Ok(Json(result?))
}

async fn start_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.start_trip(&user, id).await;
    state.metrics.observe("start_trip", &result);
    Ok(Json(result?))
}

async fn complete_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.complete_trip(&user, id).await;
    state.metrics.observe("complete_trip", &result);
    Ok(Json(result?))
}

async fn cancel_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.cancel_trip(&user, id).await;
    state.metrics.observe("cancel_trip", &result);
    Ok(Json(result?))
}

async fn retry_matching(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let result = state.trips.retry_matching(&user, id).await;
    state.metrics.observe("retry_matching", &result);
    Ok(Json(result?))
}

async fn rate_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let result = state.trips.rate_trip(&user, id, request).await;
    state.metrics.observe("rate_trip", &result);
    Ok((StatusCode::CREATED, Json(result?)))
}
