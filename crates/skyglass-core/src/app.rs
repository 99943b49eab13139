use std::path::Path;
use std::sync::Arc;

use skyglass_weather::{Geocoder, Phase, WeatherController, WeatherProvider};

use crate::error::AppError;
use crate::Config;

/// Application state: validated config plus the weather controller built
/// from it
pub struct App {
    config: Arc<Config>,
    controller: Arc<WeatherController>,
}

impl App {
    /// Load and validate the config from its default location, then build
    /// the application from it
    pub fn new() -> Result<Self, AppError> {
        let (config, _) = Config::load_validated()?;
        Self::with_config(config)
    }

    /// Same as [`App::new`] with an explicit config file
    pub fn from_config_file(path: &Path) -> Result<Self, AppError> {
        let mut config = Config::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        let (config, _) = config.into_validated()?;
        Self::with_config(config)
    }

    /// Build the application from an already loaded config
    pub fn with_config(config: Config) -> Result<Self, AppError> {
        let services = &config.services;
        let timeout = services.request_timeout();

        let geocoder = Geocoder::with_timeout(
            services.geocoding_api_key.clone(),
            &services.geocoding_base_url,
            timeout,
        )?;
        let provider = WeatherProvider::with_timeout(
            services.weather_api_key.clone(),
            &services.weather_base_url,
            timeout,
        )?;

        let controller = WeatherController::new(
            geocoder,
            provider,
            config.location.location_source(),
            config.weather.unit,
        );

        Ok(Self {
            config: Arc::new(config),
            controller: Arc::new(controller),
        })
    }

    /// Startup sequence: seed from the device position, falling back to the
    /// configured default location.
    pub async fn start(&self) -> Phase {
        let phase = self.controller.mount().await;
        if !self.controller.location().trim().is_empty() {
            return phase;
        }

        match self.config.location.default_location.as_deref() {
            Some(name) if !name.trim().is_empty() => {
                tracing::info!("Using configured default location: {}", name);
                self.controller.commit_location(name).await
            }
            _ => phase,
        }
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn controller(&self) -> &Arc<WeatherController> {
        &self.controller
    }
}
