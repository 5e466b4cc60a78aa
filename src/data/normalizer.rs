//! Session record normalization
//!
//! Practice and qualifying exports arrive with whatever keys the timing system used.
//! Every attribute is resolved through a fixed alias list; anything missing or malformed
//! falls back to a default so a single bad row never fails a request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::taxonomy::{classify_live, RaceClass};

pub const DEFAULT_NUMBER: &str = "0";
pub const DEFAULT_TEAM: &str = "Unknown Team";
pub const DEFAULT_VEHICLE: &str = "Unknown Vehicle";
pub const DEFAULT_CLASS: &str = "Unknown";
pub const DEFAULT_LAP_TIME: &str = "0:00.000";
pub const DEFAULT_FIRST_NAME: &str = "Driver";
pub const DEFAULT_LAST_NAME: &str = "One";

const NUMBER_KEYS: &[&str] = &["number", "CarNumber", "no", "car_number", "NUMBER"];
const TEAM_KEYS: &[&str] = &["team", "Team", "TEAM", "team_name"];
const VEHICLE_KEYS: &[&str] = &["vehicle", "Vehicle", "VEHICLE", "car"];
const CLASS_KEYS: &[&str] = &["class", "Class", "CLASS", "car_class", "category"];
const GRID_KEYS: &[&str] = &["grid_position", "grid", "QualPos", "position", "pos", "POSITION"];
const LAP_TIME_KEYS: &[&str] = &["best_lap_time", "best_lap", "BestLap", "LapTime", "time"];
const DRIVERS_KEYS: &[&str] = &["drivers", "Drivers"];
const DRIVER_TEXT_KEYS: &[&str] = &["driver", "Driver", "driver_name"];
const FIRST_NAME_KEYS: &[&str] = &["first_name", "firstname", "FirstName"];
const LAST_NAME_KEYS: &[&str] = &["last_name", "lastname", "LastName"];

/// Driver name pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub first_name: String,
    pub last_name: String,
}

impl Default for Driver {
    fn default() -> Self {
        Self {
            first_name: DEFAULT_FIRST_NAME.to_string(),
            last_name: DEFAULT_LAST_NAME.to_string(),
        }
    }
}

/// One car's session snapshot after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct CarEntry {
    pub number: String,
    pub team: String,
    pub vehicle: String,
    pub raw_class: String,
    pub canonical_class: RaceClass,
    pub grid_position: u32,
    pub best_lap_time: String,
    /// Always holds at least one driver
    pub drivers: Vec<Driver>,
}

impl CarEntry {
    pub fn lead_driver(&self) -> &Driver {
        &self.drivers[0]
    }

    /// Whether the session reported a lap time for this car
    pub fn has_lap_time(&self) -> bool {
        self.best_lap_time != DEFAULT_LAP_TIME
    }
}

/// Normalize one raw session record
///
/// Non-object input yields an entry made entirely of defaults.
pub fn normalize(raw: &Value) -> CarEntry {
    let empty = Map::new();
    let record = raw.as_object().unwrap_or(&empty);

    let raw_class = resolve_text(record, CLASS_KEYS).unwrap_or_else(|| DEFAULT_CLASS.to_string());
    let canonical_class = classify_live(&raw_class);

    CarEntry {
        number: resolve_text(record, NUMBER_KEYS).unwrap_or_else(|| DEFAULT_NUMBER.to_string()),
        team: resolve_text(record, TEAM_KEYS).unwrap_or_else(|| DEFAULT_TEAM.to_string()),
        vehicle: resolve_text(record, VEHICLE_KEYS)
            .unwrap_or_else(|| DEFAULT_VEHICLE.to_string()),
        raw_class,
        canonical_class,
        grid_position: resolve(record, GRID_KEYS).map(to_grid_position).unwrap_or(0),
        best_lap_time: resolve(record, LAP_TIME_KEYS)
            .and_then(to_lap_time)
            .unwrap_or_else(|| DEFAULT_LAP_TIME.to_string()),
        drivers: extract_drivers(record),
    }
}

/// First alias holding a usable value
fn resolve<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find(|value| is_present(value))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn resolve_text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    resolve(record, keys).and_then(value_to_text)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Cast a grid source to a non-negative integer, 0 on anything unusable
fn to_grid_position(value: &Value) -> u32 {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    };

    parsed
        .filter(|p| *p >= 0)
        .and_then(|p| u32::try_from(p).ok())
        .unwrap_or(0)
}

fn to_lap_time(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_f64().filter(|s| s.is_finite() && *s >= 0.0).map(format_lap_time),
        other => value_to_text(other),
    }
}

/// Format seconds as `m:ss.sss`
pub fn format_lap_time(seconds: f64) -> String {
    let millis = (seconds * 1000.0).round() as u64;
    let minutes = millis / 60_000;
    let rem = millis % 60_000;
    format!("{}:{:02}.{:03}", minutes, rem / 1000, rem % 1000)
}

fn extract_drivers(record: &Map<String, Value>) -> Vec<Driver> {
    let listed = resolve(record, DRIVERS_KEYS)
        .and_then(Value::as_array)
        .filter(|drivers| !drivers.is_empty());

    if let Some(drivers) = listed {
        let mut out = vec![driver_from_value(&drivers[0])];
        if let Some(second) = drivers.get(1) {
            let co_driver = driver_from_value(second);
            let last_name = name_part(second, LAST_NAME_KEYS).unwrap_or_default();
            out.push(Driver {
                first_name: co_driver.first_name,
                last_name,
            });
        }
        return out;
    }

    let text = resolve_text(record, DRIVER_TEXT_KEYS);
    vec![text.map(|t| split_driver_name(&t)).unwrap_or_default()]
}

fn driver_from_value(value: &Value) -> Driver {
    match value {
        Value::String(text) => split_driver_name(text),
        Value::Object(_) => Driver {
            first_name: name_part(value, FIRST_NAME_KEYS)
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            last_name: name_part(value, LAST_NAME_KEYS)
                .unwrap_or_else(|| DEFAULT_LAST_NAME.to_string()),
        },
        _ => Driver::default(),
    }
}

fn name_part(value: &Value, keys: &[&str]) -> Option<String> {
    value.as_object().and_then(|obj| resolve_text(obj, keys))
}

/// Split free text on the first space into first/last name
fn split_driver_name(text: &str) -> Driver {
    let text = text.trim();
    let (first, last) = match text.split_once(' ') {
        Some((first, last)) => (first.trim(), last.trim()),
        None => (text, ""),
    };

    let or_default = |part: &str, default: &str| {
        if part.is_empty() {
            default.to_string()
        } else {
            part.to_string()
        }
    };

    Driver {
        first_name: or_default(first, DEFAULT_FIRST_NAME),
        last_name: or_default(last, DEFAULT_LAST_NAME),
    }
}
