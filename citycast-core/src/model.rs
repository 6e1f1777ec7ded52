use std::{collections::HashMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type LocationId = u32;

/// Snapshots of the most recent cycle, keyed by location id.
pub type SnapshotMap = HashMap<LocationId, WeatherSnapshot>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A monitored city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub country: String,
    pub coordinates: Coordinates,
}

impl Location {
    pub fn new(
        id: LocationId,
        name: impl Into<String>,
        country: impl Into<String>,
        lat: f64,
        lon: f64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            country: country.into(),
            coordinates: Coordinates::new(lat, lon),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.name, self.country)
    }
}

/// Current conditions as shown to the user. Temperatures are °C and wind is
/// km/h, all rounded to whole numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub temperature: i32,
    pub feels_like: i32,
    pub condition: String,
    pub icon: String,
    pub humidity: u8,
    pub wind_speed_kmh: i32,
    pub sunrise: i64,
    pub sunset: i64,
}

/// One 3-hour forecast entry exactly as the provider sent it. Every field is
/// optional so that a single broken entry can be skipped instead of failing the
/// whole list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawForecastSample {
    #[serde(default)]
    pub dt: Option<i64>,
    #[serde(default)]
    pub main: Option<RawForecastMain>,
    #[serde(default)]
    pub weather: Option<Vec<RawCondition>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawForecastMain {
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCondition {
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Min/max summary for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// Timestamp of the first sample seen for this day.
    pub dt: i64,
    pub min: i32,
    pub max: i32,
    pub condition: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub current: CurrentConditions,
    pub daily: Vec<DailySummary>,
}

/// A place returned by the geocoding search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodingCandidate {
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl GeocodingCandidate {
    pub fn display_name(&self) -> String {
        format!(
            "{}, {} {}",
            self.name,
            self.state.as_deref().unwrap_or(""),
            self.country
        )
    }

    pub fn into_location(self, id: LocationId) -> Location {
        Location::new(id, self.name, self.country, self.lat, self.lon)
    }
}

impl fmt::Display for GeocodingCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_range_checks() {
        assert!(Coordinates::new(90.0, -180.0).is_valid());
        assert!(Coordinates::new(-33.8688, 151.2093).is_valid());
        assert!(!Coordinates::new(90.5, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, 180.1).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn raw_sample_tolerates_missing_fields() {
        let sample: RawForecastSample =
            serde_json::from_value(serde_json::json!({ "dt": 1700000000, "weather": null }))
                .expect("lenient sample");

        assert_eq!(sample.dt, Some(1_700_000_000));
        assert!(sample.main.is_none());
        assert!(sample.weather.is_none());
    }

    #[test]
    fn candidate_display_name_without_state() {
        let c = GeocodingCandidate {
            name: "Algiers".into(),
            state: None,
            country: "DZ".into(),
            lat: 36.7538,
            lon: 3.0588,
        };
        assert_eq!(c.display_name(), "Algiers,  DZ");

        let loc = c.into_location(9);
        assert_eq!(loc.id, 9);
        assert_eq!(loc.to_string(), "Algiers, DZ");
    }
}
