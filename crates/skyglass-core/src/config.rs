use serde::{Deserialize, Serialize};
use skyglass_weather::geocode::LOCATIONIQ_BASE_URL;
use skyglass_weather::provider::OPENWEATHER_BASE_URL;
use skyglass_weather::{Coordinates, LocationSource, UnitSystem, DEFAULT_TIMEOUT_SECS};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

pub const GEOCODING_API_KEY_ENV: &str = "SKYGLASS_GEOCODING_API_KEY";
pub const WEATHER_API_KEY_ENV: &str = "SKYGLASS_WEATHER_API_KEY";
pub const UNIT_ENV: &str = "SKYGLASS_UNIT";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Geocoding and weather service settings
    #[serde(default)]
    pub services: ServiceConfig,

    /// Weather display settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Startup location settings
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// LocationIQ API key (overridden by SKYGLASS_GEOCODING_API_KEY)
    #[serde(default)]
    pub geocoding_api_key: String,

    /// OpenWeatherMap API key (overridden by SKYGLASS_WEATHER_API_KEY)
    #[serde(default)]
    pub weather_api_key: String,

    #[serde(default = "default_geocoding_base_url")]
    pub geocoding_base_url: String,

    #[serde(default = "default_weather_base_url")]
    pub weather_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_geocoding_base_url() -> String {
    LOCATIONIQ_BASE_URL.to_string()
}

fn default_weather_base_url() -> String {
    OPENWEATHER_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            geocoding_api_key: String::new(),
            weather_api_key: String::new(),
            geocoding_base_url: default_geocoding_base_url(),
            weather_base_url: default_weather_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WeatherConfig {
    /// Unit system used at startup
    #[serde(default)]
    pub unit: UnitSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LocationConfig {
    /// Place to look up when the device position yields nothing
    pub default_location: Option<String>,

    /// Device position; both must be set to take effect
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationConfig {
    /// Device position source described by this config
    pub fn location_source(&self) -> LocationSource {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => match Coordinates::new(lat, lon) {
                Ok(coordinates) => LocationSource::Fixed(coordinates),
                Err(e) => {
                    tracing::warn!("Ignoring configured device position: {}", e);
                    LocationSource::Disabled
                }
            },
            _ => LocationSource::Disabled,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if it doesn't
    /// exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from `path`, writing defaults there if it is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult), ConfigError> {
        let config = Self::load()?;
        config.into_validated()
    }

    /// Validate an already loaded config, logging warnings
    ///
    /// A missing API key is reported as [`ConfigError::MissingSetting`], any
    /// other validation error as [`ConfigError::Invalid`].
    pub fn into_validated(self) -> Result<(Self, ValidationResult), ConfigError> {
        let validation = self.validate();

        if !validation.is_valid() {
            let summary = validation.error_summary();
            let missing_key = validation
                .errors
                .iter()
                .any(|e| e.field.ends_with("_api_key"));
            return Err(if missing_key {
                ConfigError::MissingSetting(summary)
            } else {
                ConfigError::Invalid(summary)
            });
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Apply environment overrides. `lookup` returns the value of a variable.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup(GEOCODING_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.services.geocoding_api_key = key.trim().to_string();
        }
        if let Some(key) = lookup(WEATHER_API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.services.weather_api_key = key.trim().to_string();
        }
        if let Some(unit) = lookup(UNIT_ENV) {
            self.weather.unit = unit
                .parse::<UnitSystem>()
                .map_err(|e| ConfigError::Invalid(format!("{}: {}", UNIT_ENV, e)))?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.services.geocoding_api_key.trim().is_empty() {
            result.add_error(
                "services.geocoding_api_key",
                format!("Not set (config file or {})", GEOCODING_API_KEY_ENV),
            );
        }
        if self.services.weather_api_key.trim().is_empty() {
            result.add_error(
                "services.weather_api_key",
                format!("Not set (config file or {})", WEATHER_API_KEY_ENV),
            );
        }

        validate_url(
            &self.services.geocoding_base_url,
            "services.geocoding_base_url",
            &mut result,
        );
        validate_url(
            &self.services.weather_base_url,
            "services.weather_base_url",
            &mut result,
        );

        if self.services.request_timeout_secs == 0 {
            result.add_error(
                "services.request_timeout_secs",
                "Timeout must be greater than 0",
            );
        } else if self.services.request_timeout_secs > 120 {
            result.add_warning(
                "services.request_timeout_secs",
                "Timeout is unusually long (>120 seconds)",
            );
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if let Err(e) = Coordinates::new(lat, lon) {
                    result.add_error("location", e.to_string());
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                result.add_error(
                    "location",
                    "latitude and longitude must be set together",
                );
            }
            (None, None) => {}
        }

        if let Some(name) = &self.location.default_location {
            if name.trim().is_empty() {
                result.add_warning("location.default_location", "Empty default location");
            }
        }

        result
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("cannot serialize: {}", e)))?;

        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("no user config directory".to_string()))?
            .join("skyglass");

        Ok(config_dir.join("config.toml"))
    }
}

/// Validate a URL field
fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
    match Url::parse(url_str) {
        Ok(url) => {
            if url.scheme() != "http" && url.scheme() != "https" {
                result.add_error(
                    field_name,
                    format!("URL must use http or https scheme, got: {}", url.scheme()),
                );
            }

            if url.host().is_none() {
                result.add_error(field_name, "URL must have a host");
            }
        }
        Err(e) => {
            result.add_error(field_name, format!("Invalid URL: {}", e));
        }
    }
}
