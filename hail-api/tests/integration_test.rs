use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use hail_api::{app, bootstrap};
use hail_store::app_config::Config;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const PASSENGER: i64 = 1;
const DRIVER: i64 = 101;

fn test_config() -> Config {
    config_with_proximity("memory")
}

fn config_with_proximity(backend: &str) -> Config {
    Config::from_toml_str(&format!(
        r#"
        [auth]
        jwt_secret = "{}"

        [proximity]
        backend = "{}"

        [storage]
        backend = "memory"

        [notifications]
        backend = "sse"
        "#,
        SECRET, backend
    ))
    .unwrap()
}

struct TestApp {
    router: Router,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

async fn spawn_app_with(config: Config) -> TestApp {
    let bootstrap::Bootstrap { state, workers } = bootstrap::build(&config).await.unwrap();
    workers.spawn(state.trips.clone());
    TestApp { router: app(state) }
}

async fn driver_online(app: &TestApp, token: &str) {
    let (status, _) = send(
        app,
        "PUT",
        "/v1/drivers/me/location",
        Some(token),
        Some(json!({ "lat": 10.771, "lng": 106.70 })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

fn token(sub: Value, role: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": sub, "role": role, "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn passenger_token() -> String {
    token(json!(PASSENGER), "PASSENGER")
}

fn driver_token() -> String {
    token(json!(DRIVER.to_string()), "DRIVER")
}

async fn send(app: &TestApp, method: &str, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn trip_body() -> Value {
    json!({ "from_lat": 10.77, "from_lng": 106.70, "to_lat": 10.78, "to_lng": 106.80 })
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = spawn_app().await;
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "disabled");
    assert_eq!(body["redis"], "disabled");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = spawn_app().await;
    let (status, body) = send(&app, "POST", "/v1/trips", None, Some(trip_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&app, "POST", "/v1/trips", Some("not-a-jwt"), Some(trip_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let app = spawn_app().await;
    let driver = driver_token();
    let (status, _) = send(&app, "POST", "/v1/trips", Some(&driver), Some(trip_body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let passenger = passenger_token();
    let uri = format!("/v1/trips/{}/accept", uuid::Uuid::new_v4());
    let (status, _) = send(&app, "POST", &uri, Some(&passenger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_out_of_range_coordinates_are_bad_request() {
    let app = spawn_app().await;
    let passenger = passenger_token();
    let body = json!({ "from_lat": 95.0, "from_lng": 106.70, "to_lat": 10.78, "to_lng": 106.80 });
    let (status, body) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pickup"));

    let (status, _) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(json!({ "from_lat": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trip_without_drivers_stays_searching() {
    let app = spawn_app().await;
    let passenger = passenger_token();

    let (status, trip) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(trip_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["status"], "SEARCHING");
    assert!(trip["driver_id"].is_null());
    assert_eq!(trip["price_estimate"], "50000.00");

    let (status, _) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(trip_body())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A driver comes online; the passenger asks for another search.
    driver_online(&app, &driver_token()).await;
    let uri = format!("/v1/trips/{}/rematch", trip["id"].as_str().unwrap());
    let (status, trip) = send(&app, "POST", &uri, Some(&passenger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "DRIVER_FOUND");
    assert_eq!(trip["driver_id"], DRIVER);
}

#[tokio::test]
async fn test_full_trip_lifecycle_over_http() {
    let app = spawn_app().await;
    let passenger = passenger_token();
    let driver = driver_token();
    driver_online(&app, &driver).await;

    let (status, trip) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(trip_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["status"], "DRIVER_FOUND");
    assert_eq!(trip["driver_id"], DRIVER);
    let id = trip["id"].as_str().unwrap().to_string();

    let (status, view) = send(&app, "GET", &format!("/v1/trips/{}", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "DRIVER_FOUND");

    let (status, trip) = send(&app, "POST", &format!("/v1/trips/{}/accept", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "ACCEPTED");

    let (status, _) = send(&app, "POST", &format!("/v1/trips/{}/accept", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, trip) = send(&app, "POST", &format!("/v1/trips/{}/start", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "IN_PROGRESS");

    let (status, _) = send(&app, "POST", &format!("/v1/trips/{}/cancel", id), Some(&passenger), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, trip) = send(&app, "POST", &format!("/v1/trips/{}/complete", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "COMPLETED");

    let rating_uri = format!("/v1/trips/{}/rating", id);
    let (status, _) = send(&app, "POST", &rating_uri, Some(&passenger), Some(json!({ "rating": 6 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, rating) = send(
        &app,
        "POST",
        &rating_uri,
        Some(&passenger),
        Some(json!({ "rating": 4, "comment": "friendly driver" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rating["score"], 4);
    assert_eq!(rating["driver_id"], DRIVER);

    let (status, _) = send(&app, "POST", &rating_uri, Some(&passenger), Some(json!({ "rating": 5 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, view) = send(&app, "GET", &format!("/v1/trips/{}", id), Some(&passenger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "COMPLETED");
    assert_eq!(view["rating"]["score"], 4);
}

#[tokio::test]
async fn test_reject_over_http_excludes_driver() {
    let app = spawn_app().await;
    let passenger = passenger_token();
    let driver = driver_token();
    driver_online(&app, &driver).await;

    let (_, trip) = send(&app, "POST", "/v1/trips", Some(&passenger), Some(trip_body())).await;
    let id = trip["id"].as_str().unwrap().to_string();

    let (status, trip) = send(&app, "POST", &format!("/v1/trips/{}/reject", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "SEARCHING");
    assert!(trip["driver_id"].is_null());

    let (status, trip) = send(&app, "POST", &format!("/v1/trips/{}/rematch", id), Some(&passenger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "SEARCHING");

    // Once released, the rejecting driver can no longer see the trip.
    let (status, _) = send(&app, "GET", &format!("/v1/trips/{}", id), Some(&driver), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_trip_is_not_found() {
    let app = spawn_app().await;
    let passenger = passenger_token();
    let uri = format!("/v1/trips/{}", uuid::Uuid::new_v4());
    let (status, body) = send(&app, "GET", &uri, Some(&passenger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_metrics_count_operations() {
    let app = spawn_app().await;
    let passenger = passenger_token();
    send(&app, "POST", "/v1/trips", Some(&passenger), Some(trip_body())).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"hail_trip_operations_total{operation="create_trip",outcome="ok"} 1"#));
}

#[tokio::test]
async fn test_offline_driver_is_not_matched() {
    let app = spawn_app().await;
    let driver = driver_token();
    driver_online(&app, &driver).await;

    let (status, _) = send(&app, "DELETE", "/v1/drivers/me/location", Some(&driver), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, trip) = send(&app, "POST", "/v1/trips", Some(&passenger_token()), Some(trip_body())).await;
    assert_eq!(trip["status"], "SEARCHING");
}

#[tokio::test]
async fn test_location_updates_are_validated_and_driver_only() {
    let app = spawn_app().await;
    let bad = json!({ "lat": 10.77, "lng": 190.0 });
    let (status, _) = send(&app, "PUT", "/v1/drivers/me/location", Some(&driver_token()), Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "lat": 10.77, "lng": 106.70 });
    let (status, _) = send(&app, "PUT", "/v1/drivers/me/location", Some(&passenger_token()), Some(body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_location_route_needs_in_process_driver_index() {
    let app = spawn_app_with(config_with_proximity("http")).await;
    let body = json!({ "lat": 10.77, "lng": 106.70 });
    let (status, _) = send(&app, "PUT", "/v1/drivers/me/location", Some(&driver_token()), Some(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
