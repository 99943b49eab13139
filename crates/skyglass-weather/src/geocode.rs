//! Forward and reverse geocoding against a LocationIQ-compatible service.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::http::{build_client, normalize_base_url, read_json, DEFAULT_TIMEOUT_SECS};
use crate::types::{Coordinates, WeatherError};

pub const LOCATIONIQ_BASE_URL: &str = "https://us1.locationiq.com";

/// LocationIQ sends coordinates as strings; accept plain numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Degrees {
    Number(f64),
    Text(String),
}

impl Degrees {
    fn value(&self) -> Result<f64, WeatherError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s.trim().parse().map_err(|_| {
                WeatherError::MalformedResponse(format!("invalid coordinate '{}'", s))
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchCandidate {
    lat: Degrees,
    lon: Degrees,
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<ReverseAddress>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
}

impl ReverseAddress {
    /// Prefer city > town > village > municipality
    fn place_name(self) -> Option<String> {
        [self.city, self.town, self.village, self.municipality]
            .into_iter()
            .flatten()
            .map(|name| name.trim().to_string())
            .find(|name| !name.is_empty())
    }
}

/// Geocoding client
#[derive(Debug, Clone)]
pub struct Geocoder {
    client: Client,
    api_key: String,
    base_url: String,
}

impl Geocoder {
    pub fn new(api_key: impl Into<String>) -> Result<Self, WeatherError> {
        Self::with_base_url(api_key, LOCATIONIQ_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, WeatherError> {
        Self::with_timeout(api_key, base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            base_url: normalize_base_url(base_url),
        })
    }

    /// Resolve free text to the coordinates of the first matching candidate.
    ///
    /// Empty text is rejected without issuing a request.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve_coordinates(
        &self,
        location_text: &str,
    ) -> Result<Coordinates, WeatherError> {
        let query = location_text.trim();
        if query.is_empty() {
            return Err(WeatherError::InvalidInput("location is empty".to_string()));
        }

        let url = format!("{}/v1/search.php", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", query), ("format", "json")])
            .send()
            .await?;

        let candidates: Vec<SearchCandidate> = match read_json(response).await {
            Ok(c) => c,
            // "Unable to geocode" comes back as a 404
            Err(WeatherError::Status { status: 404, .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let first = candidates
            .first()
            .ok_or_else(|| WeatherError::EmptyResult(query.to_string()))?;

        let coordinates = Coordinates::new(first.lat.value()?, first.lon.value()?)
            .map_err(|e| WeatherError::MalformedResponse(e.to_string()))?;

        tracing::info!("Geocoded '{}' to {}", query, coordinates);
        Ok(coordinates)
    }

    /// Reverse geocode a position to a city name.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve_location_name(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<String, WeatherError> {
        let url = format!("{}/v1/reverse.php", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("format", "json")])
            .query(&[("lat", latitude), ("lon", longitude)])
            .send()
            .await?;

        let body: ReverseResponse = read_json(response).await?;
        let name = body
            .address
            .and_then(ReverseAddress::place_name)
            .ok_or_else(|| WeatherError::EmptyResult(format!("{}, {}", latitude, longitude)))?;

        tracing::info!("Reverse geocoded to: {}", name);
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_resolve_coordinates_uses_first_candidate() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .and(query_param("key", "geo_key"))
            .and(query_param("q", "Portland"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"lat": "45.5202471", "lon": "-122.674194", "display_name": "Portland, Oregon"},
                {"lat": "43.6610277", "lon": "-70.2548596", "display_name": "Portland, Maine"}
            ])))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("geo_key", &mock_server.uri()).unwrap();
        let coords = geocoder.resolve_coordinates("Portland").await.unwrap();

        assert!((coords.latitude - 45.5202471).abs() < 1e-9);
        assert!((coords.longitude + 122.674194).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_resolve_coordinates_accepts_numeric_fields() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"lat": 51.5, "lon": -0.12}])),
            )
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let coords = geocoder.resolve_coordinates("London").await.unwrap();
        assert_eq!(coords, Coordinates::new(51.5, -0.12).unwrap());
    }

    #[tokio::test]
    async fn test_resolve_coordinates_zero_candidates() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_coordinates("Atlantis").await.unwrap_err();
        assert!(matches!(err, WeatherError::EmptyResult(ref q) if q == "Atlantis"));
    }

    #[tokio::test]
    async fn test_resolve_coordinates_not_found_status_is_empty_result() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "Unable to geocode"})),
            )
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_coordinates("Nowhere").await.unwrap_err();
        assert!(matches!(err, WeatherError::EmptyResult(_)));
    }

    #[tokio::test]
    async fn test_resolve_coordinates_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"lat": "north", "lon": "1.0"}])),
            )
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_coordinates("Somewhere").await.unwrap_err();
        assert!(matches!(err, WeatherError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_resolve_coordinates_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/search.php"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid key"))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("bad", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_coordinates("Paris").await.unwrap_err();
        assert!(matches!(err, WeatherError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_resolve_coordinates_empty_input_issues_no_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_coordinates("   ").await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_resolve_location_name() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/reverse.php"))
            .and(query_param("lat", "47.6062"))
            .and(query_param("lon", "-122.3321"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "display_name": "Seattle, King County, Washington, USA",
                "address": {"city": "Seattle", "state": "Washington", "country": "USA"}
            })))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let name = geocoder
            .resolve_location_name(47.6062, -122.3321)
            .await
            .unwrap();
        assert_eq!(name, "Seattle");
    }

    #[tokio::test]
    async fn test_resolve_location_name_falls_back_to_town() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/reverse.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": {"town": "Hood River", "country": "USA"}
            })))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let name = geocoder.resolve_location_name(45.7, -121.5).await.unwrap();
        assert_eq!(name, "Hood River");
    }

    #[tokio::test]
    async fn test_resolve_location_name_without_place() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/reverse.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "address": {"country": "International Waters"}
            })))
            .mount(&mock_server)
            .await;

        let geocoder = Geocoder::with_base_url("k", &mock_server.uri()).unwrap();
        let err = geocoder.resolve_location_name(0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, WeatherError::EmptyResult(_)));
    }
}
