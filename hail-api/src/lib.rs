use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bootstrap;
pub mod drivers;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod stream;
pub mod trips;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = Router::new()
        .merge(trips::passenger_routes())
        .merge(trips::driver_routes())
        .merge(trips::shared_routes())
        .merge(drivers::driver_routes())
        .route("/v1/events", get(stream::events_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::metrics_handler))
        .merge(authenticated)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}

/// Liveness plus the state of each configured backing store.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match &state.db {
        Some(db) => component(Some(db.ping().await.is_ok())),
        None => component(None),
    };
    let redis = match &state.redis {
        Some(redis) => component(Some(redis.ping().await.is_ok())),
        None => component(None),
    };

    let healthy = database != "down" && redis != "down";
    if !healthy {
        tracing::warn!(database, redis, "Health check failed");
    }
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "database": database,
            "redis": redis,
        })),
    )
}

fn component(reachable: Option<bool>) -> &'static str {
    match reachable {
        Some(true) => "up",
        Some(false) => "down",
        None => "disabled",
    }
}
