use std::fmt::Write;

use chrono::{DateTime, Local, TimeZone};
use citycast_core::{Location, RefreshOutcome, TemperatureUnit, WeatherSnapshot};

pub const FETCH_FAILED_BANNER: &str = "Failed to fetch weather data. Please try again later.";

/// `6:15 AM`
pub fn format_time_in<Tz: TimeZone>(ts: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    DateTime::from_timestamp(ts, 0)
        .map(|utc| utc.with_timezone(tz).format("%-I:%M %p").to_string())
        .unwrap_or_else(|| "--:--".to_string())
}

/// `Fri, Mar 1`
pub fn format_date_in<Tz: TimeZone>(ts: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    DateTime::from_timestamp(ts, 0)
        .map(|utc| utc.with_timezone(tz).format("%a, %b %-d").to_string())
        .unwrap_or_else(|| "?".to_string())
}

pub fn city_card_in<Tz: TimeZone>(
    location: &Location,
    snapshot: &WeatherSnapshot,
    unit: TemperatureUnit,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let current = &snapshot.current;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{location}  {}{}  (feels like {}°)",
        unit.display(current.temperature),
        unit.symbol(),
        unit.display(current.feels_like),
    );
    let _ = writeln!(
        out,
        "  {} | humidity {}% | wind {} km/h | sunrise {} / sunset {}",
        current.condition,
        current.humidity,
        current.wind_speed_kmh,
        format_time_in(current.sunrise, tz),
        format_time_in(current.sunset, tz),
    );

    if !snapshot.daily.is_empty() {
        let days: Vec<String> = snapshot
            .daily
            .iter()
            .map(|day| {
                format!(
                    "{} {}°/{}° {}",
                    format_date_in(day.dt, tz),
                    unit.display(day.max),
                    unit.display(day.min),
                    day.condition
                )
            })
            .collect();
        let _ = writeln!(out, "  {}", days.join("  ·  "));
    }

    out
}

/// Cards for every city that has a snapshot, in registry order.
pub fn dashboard_in<Tz: TimeZone>(
    cities: &[Location],
    outcome: &RefreshOutcome,
    unit: TemperatureUnit,
    tz: &Tz,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    if outcome.all_failed() {
        return format!("{FETCH_FAILED_BANNER}\n");
    }

    let mut out = String::new();
    for city in cities {
        if let Some(snapshot) = outcome.snapshots.get(&city.id) {
            out.push_str(&city_card_in(city, snapshot, unit, tz));
            out.push('\n');
        }
    }

    if !outcome.failed.is_empty() {
        let names: Vec<&str> = outcome.failed.iter().map(|f| f.name.as_str()).collect();
        let _ = writeln!(out, "No data this cycle for: {}", names.join(", "));
    }

    out
}

pub fn dashboard(cities: &[Location], outcome: &RefreshOutcome, unit: TemperatureUnit) -> String {
    dashboard_in(cities, outcome, unit, &Local)
}
