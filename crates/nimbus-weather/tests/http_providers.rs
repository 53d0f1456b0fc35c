//! Provider adapters wired through the orchestrator against wiremock servers.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use nimbus_core::{ProviderKind, WeatherConfig};
use nimbus_weather::{
    ConditionCategory, FetchError, FetchOrchestrator, GeoPoint, Provider, RetryPolicy, SnapshotStore,
    Units, WeatherSource,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn open_meteo(server: &MockServer) -> Provider {
    Provider::from_config(&WeatherConfig {
        provider: ProviderKind::OpenMeteo,
        base_url: Some(server.uri()),
        geocoding_url: Some(server.uri()),
        ..WeatherConfig::default()
    })
    .unwrap()
}

fn orchestrator(provider: Provider, policy: RetryPolicy) -> FetchOrchestrator {
    FetchOrchestrator::new(Arc::new(provider), SnapshotStore::in_memory(), policy)
}

#[tokio::test]
async fn test_open_meteo_minimal_current() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "51.5"))
        .and(query_param("longitude", "-0.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "current": { "temperature_2m": 15.2, "weathercode": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let weather = open_meteo(&server)
        .fetch_current(&GeoPoint::new(51.5, -0.12), Units::Metric)
        .await
        .unwrap();

    assert_eq!(weather.main.temp, 15.2);
    let condition = weather.condition().unwrap();
    assert_eq!(condition.main, ConditionCategory::Clear);
    assert!(condition.icon.ends_with('d') || condition.icon.ends_with('n'));
}

#[tokio::test]
async fn test_not_found_is_requested_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": true,
            "reason": "No data for this location"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = orchestrator(open_meteo(&server), RetryPolicy::new(3, 10, 100))
        .fetch_forecast(&GeoPoint::new(51.5, -0.12), Units::Metric, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::Client {
            status: 404,
            message: "No data for this location".into()
        }
    );
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "utc_offset_seconds": 0,
            "current": { "time": "2026-06-21T12:00", "temperature_2m": 21.0, "weathercode": 0 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = orchestrator(open_meteo(&server), RetryPolicy::new(1, 10, 100))
        .fetch_current(&GeoPoint::new(51.5, -0.12), Units::Imperial, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!fetched.is_from_snapshot());
    assert!((fetched.value.main.temp - 69.8).abs() < 1e-9);
}

#[tokio::test]
async fn test_malformed_body_is_data_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "current": { "weathercode": 3 }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let err = orchestrator(open_meteo(&server), RetryPolicy::new(1, 10, 100))
        .fetch_current(&GeoPoint::new(51.5, -0.12), Units::Metric, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::DataShape(_)));
}

#[tokio::test]
async fn test_open_weather_map_through_config() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "London"))
        .and(query_param("appid", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "London", "lat": 51.5073, "lon": -0.1276, "country": "GB"},
            {"name": "London", "lat": 42.9834, "lon": -81.233, "country": "CA"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let provider = Provider::from_config(&WeatherConfig {
        provider: ProviderKind::OpenWeatherMap,
        api_key: Some("secret".into()),
        base_url: Some(server.uri()),
        ..WeatherConfig::default()
    })
    .unwrap();

    let places = orchestrator(provider, RetryPolicy::default())
        .search_locations("London", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(places.len(), 2);
    assert_eq!(places[1].display_name(), "London, CA");
}
