//! Current conditions and forecast from an OpenWeatherMap-compatible service.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::http::{build_client, normalize_base_url, read_json, DEFAULT_TIMEOUT_SECS};
use crate::types::{Coordinates, CurrentConditions, RawForecastEntry, UnitSystem, WeatherError};

pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Deserialize)]
struct Description {
    description: String,
}

#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: CurrentMain,
    weather: Vec<Description>,
    wind: Wind,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: Option<i64>,
    dt_txt: Option<String>,
    main: ForecastMain,
    weather: Vec<Description>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
}

fn first_description(weather: Vec<Description>) -> Result<String, WeatherError> {
    weather
        .into_iter()
        .next()
        .map(|w| w.description)
        .ok_or_else(|| WeatherError::MalformedResponse("missing weather description".to_string()))
}

impl TryFrom<CurrentResponse> for CurrentConditions {
    type Error = WeatherError;

    fn try_from(resp: CurrentResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            temperature: resp.main.temp,
            feels_like: resp.main.feels_like,
            humidity: resp.main.humidity.round().clamp(0.0, 100.0) as u8,
            wind_speed: resp.wind.speed,
            condition: first_description(resp.weather)?,
        })
    }
}

impl TryFrom<ForecastItem> for RawForecastEntry {
    type Error = WeatherError;

    fn try_from(item: ForecastItem) -> Result<Self, Self::Error> {
        // dt_txt is the service's own UTC rendering; dt is the fallback
        let timestamp = match (item.dt_txt.as_deref(), item.dt) {
            (Some(text), _) => NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| {
                    WeatherError::MalformedResponse(format!("invalid dt_txt '{}': {}", text, e))
                })?,
            (None, Some(secs)) => DateTime::from_timestamp(secs, 0)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    WeatherError::MalformedResponse(format!("invalid timestamp {}", secs))
                })?,
            (None, None) => {
                return Err(WeatherError::MalformedResponse(
                    "forecast entry has no timestamp".to_string(),
                ))
            }
        };

        Ok(Self {
            timestamp,
            temperature: item.main.temp,
            temp_min: item.main.temp_min,
            temp_max: item.main.temp_max,
            condition: first_description(item.weather)?,
        })
    }
}

/// Weather service client
#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl WeatherProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, WeatherError> {
        Self::with_base_url(api_key, OPENWEATHER_BASE_URL)
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

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        coordinates: Coordinates,
        unit: UnitSystem,
    ) -> Result<T, WeatherError> {
        let url = format!("{}/data/2.5/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(&[("lat", coordinates.latitude), ("lon", coordinates.longitude)])
            .query(&[("units", unit.api_token()), ("appid", self.api_key.as_str())])
            .send()
            .await?;

        read_json(response).await
    }

    /// Fetch current conditions.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_current(
        &self,
        coordinates: Coordinates,
        unit: UnitSystem,
    ) -> Result<CurrentConditions, WeatherError> {
        let resp: CurrentResponse = self.get("weather", coordinates, unit).await?;
        CurrentConditions::try_from(resp)
    }

    /// Fetch the sub-daily forecast, unreduced and in delivery order.
    #[instrument(skip(self), level = "debug")]
    pub async fn fetch_forecast(
        &self,
        coordinates: Coordinates,
        unit: UnitSystem,
    ) -> Result<Vec<RawForecastEntry>, WeatherError> {
        let resp: ForecastResponse = self.get("forecast", coordinates, unit).await?;
        resp.list
            .into_iter()
            .map(RawForecastEntry::try_from)
            .collect()
    }

    /// Fetch current conditions and forecast concurrently.
    ///
    /// Fails as a whole if either request fails.
    pub async fn fetch_conditions(
        &self,
        coordinates: Coordinates,
        unit: UnitSystem,
    ) -> Result<(CurrentConditions, Vec<RawForecastEntry>), WeatherError> {
        let (current, forecast) = tokio::try_join!(
            self.fetch_current(coordinates, unit),
            self.fetch_forecast(coordinates, unit),
        )?;

        tracing::info!(
            "Fetched weather for {} ({}): {} forecast entries",
            coordinates,
            unit,
            forecast.len()
        );
        Ok((current, forecast))
    }
}
