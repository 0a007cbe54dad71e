//! Payload normalization.
//!
//! Raw request payloads arrive in one of two shapes: a flat mapping of
//! entity id to a list of readings, or a nested mapping of entity id
//! to sensor-type to `{"timeseries_data": [...]}`. This module
//! resolves the shape exactly once into [`SensorData`] and converts
//! each reading list into a canonical, time-ordered [`TimeSeries`].
//!
//! Isolation is the central contract: a key whose records are
//! malformed becomes an `Invalid` slot at that key, and every sibling
//! key is processed normally.

use crate::models::{
    parse_timestamp, EntitySlot, Reading, SensorData, SeriesSlot, TimeSeries, DEFAULT_ENTITY_ID,
};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Raw reading field carrying the instant, canonicalized to
/// `timestamp`.
const FIELD_DATETIME: &str = "datetime";
const FIELD_TIMESTAMP: &str = "timestamp";
const FIELD_VALUE: &str = "reading_value";

/// Nested-shape field holding an inner reading list.
const FIELD_SERIES: &str = "timeseries_data";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    /// The request body was not valid JSON at all.
    #[error("Invalid JSON")]
    InvalidJson,

    /// The payload was valid JSON but matched neither accepted shape.
    #[error("Invalid sensor data format")]
    UnrecognizedShape,
}

/// Parse raw payload text into canonical sensor data.
#[allow(dead_code)] // Entry point for payload-only callers
pub fn parse_payload(text: &str) -> Result<SensorData, NormalizeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        warn!(error = %e, "Payload is not valid JSON");
        NormalizeError::InvalidJson
    })?;
    from_value(&value)
}

/// Normalize an already-parsed payload into canonical sensor data.
///
/// A bare array is treated as a single-entity flat payload under the
/// default id. An object is nested when its entity values are
/// predominantly objects, flat otherwise; entities that do not match
/// the resolved shape become `Invalid` slots.
pub fn from_value(value: &Value) -> Result<SensorData, NormalizeError> {
    match value {
        Value::Array(_) => {
            let mut entities = BTreeMap::new();
            entities.insert(DEFAULT_ENTITY_ID.to_string(), parse_series_list(value));
            Ok(SensorData::Flat(entities))
        }
        Value::Object(map) => {
            let objects = map.values().filter(|v| v.is_object()).count();
            let arrays = map.values().filter(|v| v.is_array()).count();
            if objects >= arrays && objects > 0 {
                Ok(SensorData::Nested(parse_nested(map)))
            } else {
                Ok(SensorData::Flat(parse_flat(map)))
            }
        }
        _ => Err(NormalizeError::UnrecognizedShape),
    }
}

fn parse_flat(map: &serde_json::Map<String, Value>) -> BTreeMap<String, SeriesSlot> {
    map.iter()
        .map(|(id, raw)| {
            let slot = parse_series_list(raw);
            if matches!(slot, SeriesSlot::Invalid) {
                warn!(entity = %id, "Entity has malformed readings, isolating");
            }
            (id.clone(), slot)
        })
        .collect()
}

fn parse_nested(map: &serde_json::Map<String, Value>) -> BTreeMap<String, EntitySlot> {
    map.iter()
        .map(|(id, raw)| {
            let slot = match raw {
                Value::Object(sensor_map) => EntitySlot::Sensors(
                    sensor_map
                        .iter()
                        .map(|(name, info)| {
                            let slot = parse_sensor_info(info);
                            if matches!(slot, SeriesSlot::Invalid) {
                                warn!(entity = %id, sensor = %name, "Sensor has malformed readings, isolating");
                            }
                            (name.clone(), slot)
                        })
                        .collect(),
                ),
                _ => {
                    warn!(entity = %id, "Entity does not fit the nested shape, isolating");
                    EntitySlot::Invalid
                }
            };
            (id.clone(), slot)
        })
        .collect()
}

/// Parse one nested sensor entry: an object whose `timeseries_data`
/// field (absent means an empty series) holds the reading list.
fn parse_sensor_info(info: &Value) -> SeriesSlot {
    match info {
        Value::Object(fields) => match fields.get(FIELD_SERIES) {
            Some(raw) => parse_series_list(raw),
            None => SeriesSlot::Series(TimeSeries::default()),
        },
        _ => SeriesSlot::Invalid,
    }
}

/// Parse a reading list. Any malformed element invalidates the whole
/// key, mirroring a failed frame conversion.
fn parse_series_list(raw: &Value) -> SeriesSlot {
    let Value::Array(items) = raw else {
        return SeriesSlot::Invalid;
    };

    let mut readings = Vec::with_capacity(items.len());
    for item in items {
        match parse_reading(item) {
            Some(reading) => readings.push(reading),
            None => return SeriesSlot::Invalid,
        }
    }
    SeriesSlot::Series(TimeSeries::new(readings))
}

fn parse_reading(item: &Value) -> Option<Reading> {
    let fields = item.as_object()?;
    let raw_ts = fields
        .get(FIELD_DATETIME)
        .or_else(|| fields.get(FIELD_TIMESTAMP))?
        .as_str()?;
    let timestamp = parse_timestamp(raw_ts)?;
    let value = fields.get(FIELD_VALUE)?.as_f64()?;
    Some(Reading { timestamp, value })
}
