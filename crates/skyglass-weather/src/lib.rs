//! Weather lookup for Skyglass
//!
//! Resolves a place name to coordinates, fetches current conditions and a
//! daily forecast for it, and keeps the result in the selected unit system.

pub mod controller;
pub mod forecast;
pub mod geocode;
mod http;
pub mod location;
pub mod provider;
pub mod types;

pub use controller::{Phase, WeatherController, WeatherSnapshot};
pub use geocode::Geocoder;
pub use http::DEFAULT_TIMEOUT_SECS;
pub use location::LocationSource;
pub use provider::WeatherProvider;
pub use types::*;
