//! Core library for the `citycast` weather dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The city registry and its default cities
//! - The OpenWeather client (current conditions, forecast, geocoding)
//! - Forecast normalization into daily summaries
//! - The refresh aggregator and its periodic scheduler
//!
//! It is used by `citycast-cli`, but can also be reused by other front ends.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod model;
pub mod normalizer;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod units;

pub use aggregator::{Aggregator, CycleState, FailedLocation, RefreshOutcome};
pub use config::Config;
pub use error::{Endpoint, RegistryError, WeatherError};
pub use model::{
    Coordinates, CurrentConditions, DailySummary, GeocodingCandidate, Location, LocationId,
    RawForecastSample, SnapshotMap, WeatherSnapshot,
};
pub use normalizer::{NormalizeReport, SampleAnomaly};
pub use provider::{ProviderPayload, WeatherProvider, provider_from_config};
pub use registry::{CityRegistry, SharedRegistry, default_cities};
pub use scheduler::{RefreshCycle, RefreshScheduler};
pub use units::TemperatureUnit;
