//! Rounding and unit conversion used at the display boundary.

use serde::{Deserialize, Serialize};

const MPS_TO_KMH: f64 = 3.6;

/// Round to the nearest integer with halves going up (`-2.5 -> -2`, `2.5 -> 3`).
/// Results outside the `i32` range clamp to its bounds; NaN becomes 0.
pub fn round_half_up(value: f64) -> i32 {
    let floor = value.floor();
    let rounded = if value - floor >= 0.5 { floor + 1.0 } else { floor };
    rounded as i32
}

pub fn mps_to_kmh(speed_mps: f64) -> i32 {
    round_half_up(speed_mps * MPS_TO_KMH)
}

pub fn celsius_to_fahrenheit(celsius: i32) -> i32 {
    round_half_up(f64::from(celsius) * 9.0 / 5.0 + 32.0)
}

pub fn fahrenheit_to_celsius(fahrenheit: i32) -> i32 {
    round_half_up((f64::from(fahrenheit) - 32.0) * 5.0 / 9.0)
}

/// Display preference. The data model is always Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn toggle(self) -> Self {
        match self {
            TemperatureUnit::Celsius => TemperatureUnit::Fahrenheit,
            TemperatureUnit::Fahrenheit => TemperatureUnit::Celsius,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// Convert a Celsius value into this unit.
    pub fn display(&self, celsius: i32) -> i32 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius_to_fahrenheit(celsius),
        }
    }
}

pub fn icon_url(icon: &str) -> String {
    format!("https://openweathermap.org/img/wn/{icon}.png")
}
