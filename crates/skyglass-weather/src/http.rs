//! Shared HTTP plumbing for the geocoding and weather clients.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::types::WeatherError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("Skyglass/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> Result<Client, WeatherError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Decode a successful response body, mapping non-success statuses to
/// [`WeatherError::Status`] and undecodable bodies to
/// [`WeatherError::MalformedResponse`].
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, WeatherError> {
    let status = response.status();

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(WeatherError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| WeatherError::MalformedResponse(format!("JSON parse error: {}", e)))
}

/// Strip any trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://x/"), "http://x");
        assert_eq!(normalize_base_url("http://x"), "http://x");
    }
}
