use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::data::types::ForecastRecord;
use crate::error::DecodeError;

/// Decode an OpenWeatherMap `/forecast` body into records.
///
/// Only the batch shape is enforced: the body must be a JSON object with a
/// `list` array. Every other field is read get-or-zero, so partial payloads
/// still produce records. The first decoded element is the current sample.
pub fn decode(body: &[u8]) -> Result<Vec<ForecastRecord>, DecodeError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    if !root.is_object() {
        return Err(DecodeError::Malformed("JSON object was expected".to_string()));
    }

    let list = root
        .get("list")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingList)?;

    let city_name = match root.pointer("/city/name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => {
            warn!("Forecast payload has no city name, continuing without one");
            String::new()
        }
    };

    let mut records = Vec::with_capacity(list.len());
    for (index, entry) in list.iter().enumerate() {
        if !entry.is_object() {
            warn!("Skipping forecast entry {}: not a JSON object", index);
            continue;
        }
        let is_current = records.is_empty();
        records.push(decode_entry(entry, &city_name, is_current));
    }

    debug!("Decoded {} forecast records for '{}'", records.len(), city_name);
    Ok(records)
}

fn decode_entry(entry: &Value, city_name: &str, is_current: bool) -> ForecastRecord {
    let timestamp = int_at(entry, "/dt");

    ForecastRecord {
        is_current,
        timestamp,
        date_time: DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_default(),
        date_text: text_at(entry, "/dt_txt"),
        city_name: city_name.to_string(),
        condition_id: text_at(entry, "/weather/0/id"),
        condition_main: text_at(entry, "/weather/0/main"),
        condition_description: text_at(entry, "/weather/0/description"),
        icon_id: text_at(entry, "/weather/0/icon"),
        temperature: float_at(entry, "/main/temp"),
        temperature_min: float_at(entry, "/main/temp_min"),
        temperature_max: float_at(entry, "/main/temp_max"),
        wind_speed: float_at(entry, "/wind/speed"),
        humidity: int_at(entry, "/main/humidity"),
        cloudiness: int_at(entry, "/clouds/all"),
        precipitation_probability: float_at(entry, "/pop"),
        rain_volume_3h: float_at(entry, "/rain/3h"),
        snow_volume_3h: float_at(entry, "/snow/3h"),
    }
}

fn float_at(value: &Value, pointer: &str) -> f64 {
    value
        .pointer(pointer)
        .and_then(Value::as_f64)
        .unwrap_or_default()
}

fn int_at(value: &Value, pointer: &str) -> i64 {
    match value.pointer(pointer) {
        Some(v) => v
            .as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
            .unwrap_or_default(),
        None => 0,
    }
}

/// Strings pass through; numbers are rendered (condition ids arrive as ints).
fn text_at(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
