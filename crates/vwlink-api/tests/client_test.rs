#![allow(clippy::unwrap_used)]
// Integration tests for `VehicleClient` endpoints using wiremock.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vwlink_api::{
    CommandRequest, Credentials, Endpoints, Error, Region, RemoteStatus, Session, Spin,
    TransportConfig, VehicleClient,
};

const VIN: &str = "WVWZZZ1KZAW000001";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, VehicleClient) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "access",
            "refreshToken": "refresh",
            "expiresIn": 3600,
        })))
        .mount(&server)
        .await;

    let credentials = Credentials::new("driver@example.com", SecretString::from("pw"));
    let session = Session::new(
        credentials,
        Endpoints::single_host(Url::parse(&server.uri()).unwrap()),
        &TransportConfig::default(),
    )
    .unwrap();
    (server, VehicleClient::new(Arc::new(session)))
}

fn vehicle_path(suffix: &str) -> String {
    format!("/vehicle/v1/vehicles/{VIN}/{suffix}")
}

// ── Status endpoints ────────────────────────────────────────────────

#[tokio::test]
async fn test_selective_status_requests_jobs_and_parses_fields() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(vehicle_path("selectivestatus")))
        .and(query_param("jobs", "access,charging"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": {
                "accessStatus": {
                    "value": {
                        "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                        "overallStatus": "safe",
                        "doorLockStatus": "locked",
                        "doors": [{ "name": "frontLeft", "status": ["locked", "closed"] }],
                        "windows": []
                    }
                }
            },
            "charging": {
                "batteryStatus": {
                    "value": {
                        "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                        "currentSOC_pct": 81,
                        "cruisingRangeElectric_km": 312
                    }
                },
                "chargingStatus": {
                    "error": { "message": "Forbidden", "code": 4111, "group": 2 }
                }
            }
        })))
        .mount(&server)
        .await;

    let status = client
        .selective_status(VIN, &["access", "charging"])
        .await
        .unwrap();

    let access = status.access.unwrap().access_status.unwrap().value.unwrap();
    assert_eq!(access.door_lock_status.as_deref(), Some("locked"));
    assert_eq!(access.doors[0].status, vec!["locked", "closed"]);

    let charging = status.charging.unwrap();
    let battery = charging.battery_status.unwrap().value.unwrap();
    assert_eq!(battery.current_soc_pct, Some(81.0));
    let err = charging.charging_status.unwrap().error.unwrap();
    assert_eq!(err.code, Some(4111));
}

#[tokio::test]
async fn test_parking_position_no_content_is_unavailable() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(vehicle_path("parkingposition")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = client.parking_position(VIN).await;
    assert!(
        matches!(result, Err(Error::ResourceUnavailable { .. })),
        "expected ResourceUnavailable, got: {result:?}"
    );
}

#[tokio::test]
async fn test_parking_position_success() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(vehicle_path("parkingposition")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "carCapturedTimestamp": "2026-03-01T10:00:00Z", "lat": 52.42, "lon": 10.78 }
        })))
        .mount(&server)
        .await;

    let position = client.parking_position(VIN).await.unwrap();
    assert_eq!(position.lat, Some(52.42));
    assert_eq!(position.lon, Some(10.78));
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
        .mount(&server)
        .await;

    let result = client.list_vehicles().await;
    assert!(
        matches!(result, Err(Error::RateLimited { retry_after_secs: 120 })),
        "expected RateLimited(120), got: {result:?}"
    );
}

#[tokio::test]
async fn test_status_code_mapping() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(vehicle_path("capabilities")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/v2/vehicle-images/WVWZZZ1KZAW000001"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client.capabilities(VIN).await.unwrap_err();
    assert!(err.is_not_found(), "expected not found, got: {err:?}");

    let err = client.images(VIN).await.unwrap_err();
    assert!(
        matches!(err, Error::Server { status: 502, .. }),
        "expected Server(502), got: {err:?}"
    );
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/vehicle/v1/vehicles"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client.list_vehicles().await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body.contains("maintenance")),
        "expected Deserialization, got: {result:?}"
    );
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_lock_sends_spin_and_returns_request_id() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(vehicle_path("access/lock")))
        .and(body_json(json!({ "spin": "1234" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "requestID": "req-42" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client
        .submit_command(VIN, &CommandRequest::Lock { spin: Spin::new("1234") })
        .await
        .unwrap();
    assert_eq!(ack.request_id.as_deref(), Some("req-42"));
}

#[tokio::test]
async fn test_no_content_ack_means_synchronous_completion() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(vehicle_path("vehiclewakeuptrigger")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let ack = client
        .submit_command(VIN, &CommandRequest::WakeUp)
        .await
        .unwrap();
    assert_eq!(ack.request_id, None);
}

#[tokio::test]
async fn test_window_heating_posts_empty_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(vehicle_path("windowheating/stop")))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "requestID": "req-7" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = client
        .submit_command(VIN, &CommandRequest::WindowHeating { start: false })
        .await
        .unwrap();
    assert_eq!(ack.request_id.as_deref(), Some("req-7"));
}

#[tokio::test]
async fn test_command_status_polling() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(vehicle_path("requests/req-42/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "status": "successful" }
        })))
        .mount(&server)
        .await;

    let status = client.command_status(VIN, "req-42").await.unwrap();
    assert_eq!(status, RemoteStatus::Succeeded);
    assert!(status.is_terminal());
}

#[tokio::test]
async fn test_vendor_rejects_command() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(vehicle_path("charging/start")))
        .respond_with(ResponseTemplate::new(400).set_body_string("charging not possible"))
        .mount(&server)
        .await;

    let result = client
        .submit_command(VIN, &CommandRequest::StartCharging)
        .await;
    assert!(
        matches!(result, Err(Error::Api { status: 400, .. })),
        "expected Api(400), got: {result:?}"
    );
}

// ── North America ───────────────────────────────────────────────────

const VEHICLE_ID: &str = "3f1c6a52-0d3e-4c55-9d1e-6f7f2b0a9c11";

async fn setup_na() -> (MockServer, VehicleClient) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oidc/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "refresh_token": "refresh",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account/v1/garage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "vehicles": [{
                "vin": VIN,
                "vehicleId": VEHICLE_ID,
                "vehicleNickName": "Atlas",
                "modelName": "ID.4",
                "capabilities": [{ "id": "access", "status": [] }],
                "representativeImgURLComplete": "https://img.example/atlas.png"
            }] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = Credentials::new("driver@example.com", SecretString::from("pw"));
    let session = Session::new(
        credentials,
        Endpoints::single_host(Url::parse(&server.uri()).unwrap()).with_region(Region::Na),
        &TransportConfig::default(),
    )
    .unwrap();
    (server, VehicleClient::new(Arc::new(session)))
}

#[tokio::test]
async fn test_na_garage_serves_vehicles_capabilities_and_image() {
    let (_server, client) = setup_na().await;

    let vehicles = client.list_vehicles().await.unwrap();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].nickname.as_deref(), Some("Atlas"));
    assert_eq!(vehicles[0].model.as_deref(), Some("ID.4"));

    // Both come from the garage listing above; the mock allows one call.
    let capabilities = client.capabilities(VIN).await.unwrap();
    assert_eq!(capabilities[0].id, "access");
    let images = client.images(VIN).await.unwrap();
    assert_eq!(images[0].url, "https://img.example/atlas.png");
}

#[tokio::test]
async fn test_na_report_uses_vehicle_id_and_millisecond_timestamps() {
    let (server, client) = setup_na().await;

    Mock::given(method("GET"))
        .and(path(format!("/rvs/v1/vehicle/{VEHICLE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "clampStateTimestamp": 1_772_359_200_000_i64,
                "currentMileage": 12345,
                "powerStatus": { "cruiseRange": 180, "cruiseRangeUnits": "MI" },
                "exteriorStatus": {
                    "secure": "SECURE",
                    "doorStatus": { "frontLeft": "CLOSED", "doorStatusTimestamp": 1_772_359_200_000_i64 }
                }
            }
        })))
        .mount(&server)
        .await;

    let report = client.vehicle_report(VIN).await.unwrap();
    assert_eq!(
        report.captured_at(),
        Some("2026-03-01T10:00:00Z".parse().unwrap())
    );
    assert_eq!(report.current_mileage, Some(12345.0));
    let exterior = report.exterior_status.unwrap();
    assert_eq!(exterior.secure.as_deref(), Some("SECURE"));
    assert_eq!(exterior.door_status["frontLeft"], "CLOSED");
}

#[tokio::test]
async fn test_na_summaries_accept_bare_bodies() {
    let (server, client) = setup_na().await;

    Mock::given(method("GET"))
        .and(path(format!("/ev/v1/vehicle/{VEHICLE_ID}/charge/summary")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batteryStatus": { "carCapturedTimestamp": 1_772_359_200_000_i64, "currentSOCPct": 72 },
            "plugStatus": {
                "carCapturedTimestamp": 1_772_359_200_000_i64,
                "plugConnectionState": "connected",
                "plugLockState": "locked"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/ev/v1/vehicle/{VEHICLE_ID}/climate/summary")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "climateStatusReport": {
                    "carCapturedTimestamp": 1_772_359_200_000_i64,
                    "climateStatusInd": "heating"
                },
                "windowHeatingStatus": { "value": {
                    "carCapturedTimestamp": "2026-03-01T10:00:00Z",
                    "windowHeatingStatus": [{ "windowLocation": "front", "windowHeatingState": "on" }]
                } }
            }
        })))
        .mount(&server)
        .await;

    let charge = client.charge_summary(VIN).await.unwrap();
    assert_eq!(charge.battery_status.unwrap().current_soc_pct, Some(72.0));
    assert_eq!(
        charge.plug_status.unwrap().plug_connection_state.as_deref(),
        Some("connected")
    );

    let climate = client.climate_summary(VIN).await.unwrap();
    assert_eq!(
        climate.climate_status_report.unwrap().climate_status_ind.as_deref(),
        Some("heating")
    );
    let heating = climate.window_heating_status.unwrap().value.unwrap();
    assert_eq!(heating.window_heating_status[0].window_location, "front");
}

#[tokio::test]
async fn test_na_unknown_vin_is_not_found() {
    let (_server, client) = setup_na().await;

    let result = client.vehicle_report("WVWZZZ1KZAW999999").await;
    assert!(
        matches!(result, Err(Error::NotFound { .. })),
        "expected NotFound, got: {result:?}"
    );
}
