use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::model::LocationId;

/// Upstream endpoint a request was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Current,
    Forecast,
    Geocoding,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Current => "current weather",
            Endpoint::Forecast => "forecast",
            Endpoint::Geocoding => "geocoding",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures while talking to the weather provider.
///
/// `Configuration` is fatal for the fetch that hit it. Every other variant is a
/// transport failure and only costs the affected location its snapshot for the
/// current cycle.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error(
        "OpenWeather API key is not configured.\n\
         Hint: run `citycast configure` or set OPENWEATHER_API_KEY."
    )]
    Configuration,

    #[error("Failed to send {endpoint} request to OpenWeather: {source}")]
    Request {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("OpenWeather {endpoint} request failed with status {status}: {body}")]
    Status {
        endpoint: Endpoint,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to parse OpenWeather {endpoint} response: {message}")]
    Payload { endpoint: Endpoint, message: String },
}

impl WeatherError {
    pub fn is_transport(&self) -> bool {
        !matches!(self, WeatherError::Configuration)
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        match self {
            WeatherError::Configuration => None,
            WeatherError::Request { endpoint, .. }
            | WeatherError::Status { endpoint, .. }
            | WeatherError::Payload { endpoint, .. } => Some(*endpoint),
        }
    }
}

/// Rejected city-list mutations. The registry is left untouched whenever one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Please select at least one city")]
    EmptyCityList,

    #[error("No city with id {0} is registered")]
    UnknownCity(LocationId),

    #[error("A city with id {0} is already registered")]
    DuplicateId(LocationId),

    #[error("Coordinates out of range: lat {lat}, lon {lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("No free city id left")]
    IdsExhausted,
}
