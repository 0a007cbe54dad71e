//! Data model for the analytics engine.
//!
//! This module contains the core data structures used throughout the
//! engine: readings, time series, and the canonical sensor-data shape
//! produced by the normalizer.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Wire format for timestamps, both inbound and outbound.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Entity id assigned to a bare top-level array payload.
pub const DEFAULT_ENTITY_ID: &str = "1";

/// Parse a wire timestamp.
///
/// Accepts the space-separated wire format and the `T`-separated
/// variant, each with an optional fractional-seconds suffix.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// Format a timestamp in the wire format.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// A single timestamped sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Instant the value was recorded.
    pub timestamp: NaiveDateTime,
    /// Recorded numeric value.
    pub value: f64,
}

/// An ordered sequence of readings for one sensor channel.
///
/// Readings are sorted ascending by timestamp at construction; no
/// deduplication is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    readings: Vec<Reading>,
}

impl TimeSeries {
    /// Build a series, sorting readings ascending by timestamp.
    pub fn new(mut readings: Vec<Reading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        Self { readings }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    #[allow(dead_code)] // Utility accessor
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// All readings in ascending timestamp order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Values in timestamp order.
    pub fn values(&self) -> Vec<f64> {
        self.readings.iter().map(|r| r.value).collect()
    }

    /// Most recent reading, if any.
    pub fn latest(&self) -> Option<&Reading> {
        self.readings.last()
    }

    /// Readings at or after the cutoff, as a new series.
    pub fn since(&self, cutoff: NaiveDateTime) -> TimeSeries {
        TimeSeries {
            readings: self
                .readings
                .iter()
                .copied()
                .filter(|r| r.timestamp >= cutoff)
                .collect(),
        }
    }

    /// Merge another series' readings into this one, keeping order.
    pub fn merge(&mut self, other: &TimeSeries) {
        self.readings.extend_from_slice(&other.readings);
        self.readings.sort_by_key(|r| r.timestamp);
    }
}

/// Per-key normalization outcome.
///
/// A key whose records do not fit the expected shape is kept in the
/// map as `Invalid` so sibling keys are unaffected; routines render it
/// as a per-key format error.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesSlot {
    Series(TimeSeries),
    Invalid,
}

impl SeriesSlot {
    #[allow(dead_code)] // Utility accessor
    pub fn series(&self) -> Option<&TimeSeries> {
        match self {
            SeriesSlot::Series(ts) => Some(ts),
            SeriesSlot::Invalid => None,
        }
    }
}

/// Per-entity normalization outcome under the nested shape.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySlot {
    /// Sensor-type name to per-key outcome.
    Sensors(BTreeMap<String, SeriesSlot>),
    /// The entity's value did not fit the nested shape.
    Invalid,
}

/// Canonical sensor payload, shape-resolved exactly once.
///
/// `Flat` maps entity id to a series; `Nested` maps entity id to
/// sensor-type name to a series. Every routine consumes this form
/// through [`SensorData::flat_view`] or [`SensorData::nested_view`].
#[derive(Debug, Clone, PartialEq)]
pub enum SensorData {
    Flat(BTreeMap<String, SeriesSlot>),
    Nested(BTreeMap<String, EntitySlot>),
}

/// Borrowed view of one slot, with shape mismatches folded in as
/// `Invalid`.
#[derive(Debug, Clone, Copy)]
pub enum SlotView<'a> {
    Series(&'a TimeSeries),
    Invalid,
}

impl<'a> SlotView<'a> {
    pub fn series(&self) -> Option<&'a TimeSeries> {
        match self {
            SlotView::Series(ts) => Some(ts),
            SlotView::Invalid => None,
        }
    }

    fn from_slot(slot: &'a SeriesSlot) -> Self {
        match slot {
            SeriesSlot::Series(ts) => SlotView::Series(ts),
            SeriesSlot::Invalid => SlotView::Invalid,
        }
    }
}

/// Borrowed view of one entity under the nested shape.
#[derive(Debug, Clone)]
pub enum EntityView<'a> {
    /// Sensor-type name to slot, in key order.
    Sensors(Vec<(&'a str, SlotView<'a>)>),
    /// The entity's value did not fit the nested shape.
    Invalid,
}

impl SensorData {
    /// True when the payload holds no entities at all.
    pub fn is_empty(&self) -> bool {
        match self {
            SensorData::Flat(map) => map.is_empty(),
            SensorData::Nested(map) => map.is_empty(),
        }
    }

    /// Entity-to-series view for routines that consume the flat shape.
    ///
    /// Entities of a nested payload appear as `Invalid`: a flat
    /// routine cannot interpret them, but the mismatch stays scoped to
    /// each key.
    pub fn flat_view(&self) -> Vec<(&str, SlotView<'_>)> {
        match self {
            SensorData::Flat(map) => map
                .iter()
                .map(|(id, slot)| (id.as_str(), SlotView::from_slot(slot)))
                .collect(),
            SensorData::Nested(map) => map
                .iter()
                .map(|(id, _)| (id.as_str(), SlotView::Invalid))
                .collect(),
        }
    }

    /// Entity-to-sensor-types view for routines that consume the
    /// nested shape. Entities of a flat payload, and nested entities
    /// whose value did not fit the shape, appear as
    /// [`EntityView::Invalid`].
    pub fn nested_view(&self) -> Vec<(&str, EntityView<'_>)> {
        match self {
            SensorData::Nested(map) => map
                .iter()
                .map(|(id, slot)| {
                    let view = match slot {
                        EntitySlot::Sensors(sensors) => EntityView::Sensors(
                            sensors
                                .iter()
                                .map(|(name, slot)| (name.as_str(), SlotView::from_slot(slot)))
                                .collect(),
                        ),
                        EntitySlot::Invalid => EntityView::Invalid,
                    };
                    (id.as_str(), view)
                })
                .collect(),
            SensorData::Flat(map) => map
                .iter()
                .map(|(id, _)| (id.as_str(), EntityView::Invalid))
                .collect(),
        }
    }

    /// Merge all valid readings for one sensor-type key across every
    /// entity of a nested payload.
    ///
    /// Flat payloads have no sensor-type keys, so the result is empty,
    /// which the aggregated-metric routines report as "no data".
    pub fn collect_sensor(&self, sensor_key: &str) -> TimeSeries {
        let mut merged = TimeSeries::default();
        if let SensorData::Nested(map) = self {
            for slot in map.values() {
                if let EntitySlot::Sensors(sensors) = slot {
                    if let Some(SeriesSlot::Series(ts)) = sensors.get(sensor_key) {
                        merged.merge(ts);
                    }
                }
            }
        }
        merged
    }
}

impl fmt::Display for SensorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorData::Flat(map) => write!(f, "flat ({} entities)", map.len()),
            SensorData::Nested(map) => write!(f, "nested ({} entities)", map.len()),
        }
    }
}

/// Optional per-request routine parameters, extracted from the
/// reserved `params` object next to `analysis_type`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Params {
    /// Sensor-type override for single-sensor routines.
    pub target_sensor: Option<String>,
    /// Rolling window override for the trend routine.
    pub window: Option<usize>,
    /// Resampling frequency code (e.g. "H", "15T", "2D").
    pub frequency: Option<String>,
    /// Z-score threshold for anomaly detection.
    pub threshold: Option<f64>,
    /// Use the robust (median/MAD) z-score.
    pub robust: Option<bool>,
    /// Sensor-type to (min, max) mapping for health alerts.
    pub thresholds: Option<BTreeMap<String, (f64, f64)>>,
    /// Trailing window in hours for potential-failure detection.
    pub time_window_hours: Option<i64>,
    /// Z-score threshold for potential-failure detection.
    pub anomaly_threshold: Option<f64>,
}
