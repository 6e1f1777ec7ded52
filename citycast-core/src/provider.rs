use crate::{
    Config,
    error::WeatherError,
    model::{CurrentConditions, GeocodingCandidate, Location},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// What one successful fetch returns for a location.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPayload {
    pub current: CurrentConditions,
    /// The forecast `list` exactly as received; left to the normalizer to
    /// validate entry by entry.
    pub forecast: serde_json::Value,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions plus raw 3-hour forecast for `location`.
    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, WeatherError>;

    /// Look up candidate places by name or postal code.
    async fn search(&self, query: &str) -> Result<Vec<GeocodingCandidate>, WeatherError>;
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.resolved_api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No OpenWeather API key configured.\n\
                 Hint: run `citycast configure` or set OPENWEATHER_API_KEY."
        )
    })?;

    let provider = OpenWeatherProvider::with_base_urls(
        api_key,
        config.api_base_url(),
        config.geo_base_url(),
    );

    Ok(Arc::new(provider))
}
