use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use hail_trip::TripResult;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    trip_operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let trip_operations = IntCounterVec::new(
            Opts::new(
                "hail_trip_operations_total",
                "Trip operations partitioned by operation and outcome.",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(trip_operations.clone()))?;
        Ok(Self {
            registry,
            trip_operations,
        })
    }

    /// Count one operation; the outcome is `ok` or the error kind.
    pub fn observe<T>(&self, operation: &str, result: &TripResult<T>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.trip_operations.with_label_values(&[operation, outcome]).inc();
    }

    pub fn render(&self) -> Result<(String, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((
            encoder.format_type().to_string(),
            String::from_utf8_lossy(&buffer).into_owned(),
        ))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok((content_type, body)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
