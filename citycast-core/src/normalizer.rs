//! Collapse 3-hour forecast samples into one min/max summary per calendar day.
//!
//! Broken samples are skipped one at a time and reported as anomalies; they
//! never abort the batch. The condition and icon of a day come from the first
//! valid sample seen for it and are not revisited as later samples widen the
//! temperature range.

use std::fmt;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    model::{DailySummary, RawForecastSample},
    units::round_half_up,
};

pub const MAX_DAYS: usize = 7;

/// Why a sample was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleAnomaly {
    /// Not an object, or a field of the wrong type.
    Malformed,
    MissingTimestamp,
    MissingTemperature,
    MissingCondition,
}

impl SampleAnomaly {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleAnomaly::Malformed => "malformed",
            SampleAnomaly::MissingTimestamp => "missing_timestamp",
            SampleAnomaly::MissingTemperature => "missing_temperature",
            SampleAnomaly::MissingCondition => "missing_condition",
        }
    }
}

impl fmt::Display for SampleAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one normalization pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub summaries: Vec<DailySummary>,
    pub accepted: usize,
    pub skipped: usize,
}

struct ValidSample<'a> {
    dt: i64,
    temp_min: f64,
    temp_max: f64,
    condition: &'a str,
    icon: &'a str,
}

fn validate(sample: &RawForecastSample) -> Result<ValidSample<'_>, SampleAnomaly> {
    let dt = sample
        .dt
        .filter(|&dt| dt != 0)
        .ok_or(SampleAnomaly::MissingTimestamp)?;

    let main = sample.main.as_ref().ok_or(SampleAnomaly::MissingTemperature)?;
    let (Some(temp_min), Some(temp_max)) = (main.temp_min, main.temp_max) else {
        return Err(SampleAnomaly::MissingTemperature);
    };

    let primary = sample
        .weather
        .as_deref()
        .and_then(<[_]>::first)
        .ok_or(SampleAnomaly::MissingCondition)?;

    let condition = primary
        .main
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(SampleAnomaly::MissingCondition)?;
    let icon = primary
        .icon
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(SampleAnomaly::MissingCondition)?;

    Ok(ValidSample {
        dt,
        temp_min,
        temp_max,
        condition,
        icon,
    })
}

fn day_key<Tz: TimeZone>(dt: i64, tz: &Tz) -> Option<NaiveDate> {
    DateTime::from_timestamp(dt, 0).map(|utc| utc.with_timezone(tz).date_naive())
}

struct DayAccumulator {
    date: NaiveDate,
    dt: i64,
    min: f64,
    max: f64,
    condition: String,
    icon: String,
}

impl DayAccumulator {
    fn finish(self) -> DailySummary {
        DailySummary {
            date: self.date,
            dt: self.dt,
            min: round_half_up(self.min),
            max: round_half_up(self.max),
            condition: self.condition,
            icon: self.icon,
        }
    }
}

fn skip(index: usize, anomaly: SampleAnomaly, report: &mut NormalizeReport) {
    report.skipped += 1;
    tracing::warn!(index, anomaly = %anomaly, "Skipping forecast sample");
}

/// Summarise typed samples, grouping by calendar day in `tz`.
pub fn normalize_in<Tz: TimeZone>(samples: &[RawForecastSample], tz: &Tz) -> NormalizeReport {
    summarise(samples.iter().map(Ok), tz)
}

/// Summarise the provider's raw `list` value. Anything other than a JSON array
/// yields an empty report.
pub fn normalize_value_in<Tz: TimeZone>(list: &Value, tz: &Tz) -> NormalizeReport {
    let Some(items) = list.as_array() else {
        tracing::warn!(kind = value_kind(list), "Forecast list is not an array");
        return NormalizeReport::default();
    };

    let entries: Vec<Result<RawForecastSample, SampleAnomaly>> = items
        .iter()
        .map(|item| {
            RawForecastSample::deserialize(item).map_err(|_| SampleAnomaly::Malformed)
        })
        .collect();

    summarise(entries.iter().map(|e| e.as_ref().map_err(|a| *a)), tz)
}

fn summarise<'a, Tz: TimeZone>(
    entries: impl Iterator<Item = Result<&'a RawForecastSample, SampleAnomaly>>,
    tz: &Tz,
) -> NormalizeReport {
    let mut report = NormalizeReport::default();
    let mut days: Vec<DayAccumulator> = Vec::new();

    for (index, entry) in entries.enumerate() {
        let valid = match entry.and_then(validate) {
            Ok(valid) => valid,
            Err(anomaly) => {
                skip(index, anomaly, &mut report);
                continue;
            }
        };

        let Some(date) = day_key(valid.dt, tz) else {
            skip(index, SampleAnomaly::MissingTimestamp, &mut report);
            continue;
        };

        report.accepted += 1;

        match days.iter_mut().find(|d| d.date == date) {
            Some(day) => {
                day.min = day.min.min(valid.temp_min);
                day.max = day.max.max(valid.temp_max);
            }
            None => days.push(DayAccumulator {
                date,
                dt: valid.dt,
                min: valid.temp_min,
                max: valid.temp_max,
                condition: valid.condition.to_owned(),
                icon: valid.icon.to_owned(),
            }),
        }
    }

    report.summaries = days
        .into_iter()
        .take(MAX_DAYS)
        .map(DayAccumulator::finish)
        .collect();

    if report.skipped > 0 {
        tracing::info!(
            accepted = report.accepted,
            skipped = report.skipped,
            days = report.summaries.len(),
            "Forecast normalized with skipped samples"
        );
    }

    report
}

/// Summarise the provider's raw `list` value by local calendar day.
pub fn normalize_value(list: &Value) -> NormalizeReport {
    normalize_value_in(list, &Local)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
