use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    error::{Endpoint, WeatherError},
    model::{CurrentConditions, GeocodingCandidate, Location},
    units::{mps_to_kmh, round_half_up},
};

use super::{ProviderPayload, WeatherProvider};

pub const DEFAULT_API_BASE_URL: &str = "https://api.openweathermap.org";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_LIMIT: &str = "5";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    api_base: String,
    geo_base: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_urls(api_key, DEFAULT_API_BASE_URL, DEFAULT_API_BASE_URL)
    }

    /// Point the client at other hosts, e.g. a local mock server.
    pub fn with_base_urls(api_key: String, api_base: &str, geo_base: &str) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            geo_base: geo_base.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn api_key(&self) -> Result<&str, WeatherError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(WeatherError::Configuration);
        }
        Ok(key)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, WeatherError> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| WeatherError::Request { endpoint, source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| WeatherError::Request { endpoint, source })?;

        if !status.is_success() {
            return Err(WeatherError::Status {
                endpoint,
                status,
                body: truncate_body(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| WeatherError::Payload {
            endpoint,
            message: e.to_string(),
        })
    }

    async fn fetch_current(
        &self,
        api_key: &str,
        lat: &str,
        lon: &str,
    ) -> Result<CurrentConditions, WeatherError> {
        let url = format!("{}/data/2.5/weather", self.api_base);

        let parsed: OwCurrentResponse = self
            .get_json(
                Endpoint::Current,
                &url,
                &[("lat", lat), ("lon", lon), ("appid", api_key), ("units", "metric")],
            )
            .await?;

        let weather = parsed
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| WeatherError::Payload {
                endpoint: Endpoint::Current,
                message: "response contained no weather conditions".to_string(),
            })?;

        Ok(CurrentConditions {
            temperature: round_half_up(parsed.main.temp),
            feels_like: round_half_up(parsed.main.feels_like),
            condition: weather.main,
            icon: weather.icon,
            humidity: parsed.main.humidity,
            wind_speed_kmh: mps_to_kmh(parsed.wind.speed),
            sunrise: parsed.sys.sunrise,
            sunset: parsed.sys.sunset,
        })
    }

    async fn fetch_forecast(
        &self,
        api_key: &str,
        lat: &str,
        lon: &str,
    ) -> Result<serde_json::Value, WeatherError> {
        let url = format!("{}/data/2.5/forecast", self.api_base);

        let parsed: OwForecastResponse = self
            .get_json(
                Endpoint::Forecast,
                &url,
                &[("lat", lat), ("lon", lon), ("appid", api_key), ("units", "metric")],
            )
            .await?;

        Ok(parsed.list)
    }

    async fn search_by_zip(
        &self,
        api_key: &str,
        zip: &str,
    ) -> Result<Vec<GeocodingCandidate>, WeatherError> {
        let url = format!("{}/geo/1.0/zip", self.geo_base);

        let candidate: GeocodingCandidate = self
            .get_json(Endpoint::Geocoding, &url, &[("zip", zip), ("appid", api_key)])
            .await?;

        Ok(vec![candidate])
    }

    async fn search_by_name(
        &self,
        api_key: &str,
        name: &str,
    ) -> Result<Vec<GeocodingCandidate>, WeatherError> {
        let url = format!("{}/geo/1.0/direct", self.geo_base);

        self.get_json(
            Endpoint::Geocoding,
            &url,
            &[("q", name), ("limit", SEARCH_LIMIT), ("appid", api_key)],
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    sys: OwSys,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default)]
    list: serde_json::Value,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, location: &Location) -> Result<ProviderPayload, WeatherError> {
        let api_key = self.api_key()?;
        let lat = location.coordinates.lat.to_string();
        let lon = location.coordinates.lon.to_string();

        let (current, forecast) = tokio::try_join!(
            self.fetch_current(api_key, &lat, &lon),
            self.fetch_forecast(api_key, &lat, &lon),
        )?;

        Ok(ProviderPayload { current, forecast })
    }

    async fn search(&self, query: &str) -> Result<Vec<GeocodingCandidate>, WeatherError> {
        let api_key = self.api_key()?;
        let query = query.trim();

        if query.is_empty() {
            return Ok(Vec::new());
        }

        if query.chars().all(|c| c.is_ascii_digit()) {
            self.search_by_zip(api_key, query).await
        } else {
            self.search_by_name(api_key, query).await
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
