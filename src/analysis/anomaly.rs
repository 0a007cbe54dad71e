//! Anomaly analyses: IQR outliers in HVAC channels, z-score anomaly
//! detection, potential-failure flagging and downtime forecasting.

use super::{invalid_entry, message_entry};
use crate::config::AnomalyConfig;
use crate::models::{format_timestamp, EntityView, Params, SensorData};
use crate::stats;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Map, Value};
use tracing::warn;

/// IQR outlier scan over HVAC channels.
///
/// Only sensor-type names containing "HVAC" (case-insensitive) are
/// examined, restricted to the lookback window before the evaluation
/// instant. The result is keyed by sensor-type name.
pub fn hvac_anomalies(data: &SensorData, cfg: &AnomalyConfig, now: NaiveDateTime) -> Value {
    let cutoff = now - Duration::days(cfg.hvac_lookback_days);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), invalid_entry());
            continue;
        };

        for (name, slot) in sensors {
            if !name.to_uppercase().contains("HVAC") {
                continue;
            }

            let Some(series) = slot.series() else {
                response.insert(name.to_string(), invalid_entry());
                continue;
            };

            let recent = series.since(cutoff);
            if recent.is_empty() {
                response.insert(
                    name.to_string(),
                    message_entry("No HVAC data available for the past week."),
                );
                continue;
            }

            let values = recent.values();
            let entry = match stats::quartiles(&values) {
                None => message_entry("No HVAC data available for the past week."),
                Some((q1, q3)) => {
                    let (low, high) = stats::outlier_bounds(q1, q3);
                    let outliers = values.iter().filter(|v| **v < low || **v > high).count();
                    if outliers > 0 {
                        json!({
                            "anomaly_count": outliers,
                            "message": format!(
                                "Sensor {} detected {} anomalies in the past week.",
                                name, outliers
                            ),
                        })
                    } else {
                        message_entry("No significant anomalies detected in the HVAC system.")
                    }
                }
            };
            response.insert(name.to_string(), entry);
        }
    }

    if response.is_empty() {
        return message_entry("No HVAC sensor data available.");
    }
    Value::Object(response)
}

/// Z-score anomaly detection per (entity, sensor-type).
///
/// Uses the standard z-score, or the robust median/MAD variant when
/// requested; readings whose absolute score exceeds the threshold are
/// returned with formatted timestamps. Every key gets an entry, even
/// when no reading is anomalous.
pub fn detect_anomalies(data: &SensorData, cfg: &AnomalyConfig, params: &Params) -> Value {
    let threshold = params.threshold.unwrap_or(cfg.zscore_threshold);
    let robust = params.robust.unwrap_or(false);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), json!({"error": "Anomaly detection failed"}));
            continue;
        };

        for (name, slot) in sensors {
            let key = format!("{}_{}", id, name);
            let Some(series) = slot.series() else {
                response.insert(key, json!({"error": "Anomaly detection failed"}));
                continue;
            };

            let values = series.values();
            let scores = if robust {
                stats::robust_zscores(&values)
            } else {
                stats::zscores(&values)
            };

            let anomalies: Vec<Value> = series
                .readings()
                .iter()
                .zip(scores.iter())
                .filter(|(_, z)| z.abs() > threshold)
                .map(|(reading, z)| {
                    json!({
                        "timestamp": format_timestamp(reading.timestamp),
                        "reading_value": reading.value,
                        "zscore": z,
                    })
                })
                .collect();

            response.insert(key, Value::Array(anomalies));
        }
    }

    Value::Object(response)
}

/// Flag series showing recent anomalous excursions.
///
/// A reading is anomalous when its rolling z-score (window from
/// config, zero std guarded to 1) exceeds the threshold; the series
/// is flagged only when an anomaly falls within the trailing window
/// measured from that series' own latest timestamp. Returns the flat
/// list of flagged "entity_sensorType" keys.
pub fn potential_failures(data: &SensorData, cfg: &AnomalyConfig, params: &Params) -> Value {
    let window_hours = params
        .time_window_hours
        .unwrap_or(cfg.failure_time_window_hours);
    let threshold = params.anomaly_threshold.unwrap_or(cfg.zscore_threshold);

    let mut flagged = Vec::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            warn!(entity = %id, "Skipping entity that does not fit the nested shape");
            continue;
        };

        for (name, slot) in sensors {
            let Some(series) = slot.series() else {
                warn!(entity = %id, sensor = %name, "Skipping malformed series");
                continue;
            };
            if series.is_empty() {
                continue;
            }

            let values = series.values();
            let means = stats::rolling_mean(&values, cfg.rolling_window);
            let stds = stats::rolling_std(&values, cfg.rolling_window);

            let latest = match series.latest() {
                Some(reading) => reading.timestamp,
                None => continue,
            };
            let cutoff = latest - Duration::hours(window_hours);

            let has_recent_anomaly = series.readings().iter().enumerate().any(|(i, reading)| {
                let std = if stds[i] == 0.0 { 1.0 } else { stds[i] };
                let z = ((reading.value - means[i]) / std).abs();
                z > threshold && reading.timestamp >= cutoff
            });

            if has_recent_anomaly {
                flagged.push(Value::String(format!("{}_{}", id, name)));
            }
        }
    }

    Value::Array(flagged)
}

/// Forecast potential downtimes from rolling statistics.
///
/// Every reading below rolling_mean - 2*rolling_std is flagged; the
/// result maps each "entity_sensorType" key to the list of formatted
/// timestamps. The rule is deliberately sensitive: on a noisy series
/// ordinary low excursions are reported too.
pub fn forecast_downtimes(data: &SensorData, cfg: &AnomalyConfig) -> Value {
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), Value::Array(Vec::new()));
            continue;
        };

        for (name, slot) in sensors {
            let key = format!("{}_{}", id, name);
            let Some(series) = slot.series() else {
                response.insert(key, Value::Array(Vec::new()));
                continue;
            };

            let values = series.values();
            let means = stats::rolling_mean(&values, cfg.rolling_window);
            let stds = stats::rolling_std(&values, cfg.rolling_window);

            let timestamps: Vec<Value> = series
                .readings()
                .iter()
                .enumerate()
                .filter(|(i, reading)| reading.value < means[*i] - 2.0 * stds[*i])
                .map(|(_, reading)| Value::String(format_timestamp(reading.timestamp)))
                .collect();

            response.insert(key, Value::Array(timestamps));
        }
    }

    Value::Object(response)
}
