//! Trend analyses: variance-based failure trends, moving-average
//! direction, per-entity target-sensor trends and static-pressure
//! range checks.

use super::{invalid_entry, message_entry};
use crate::config::TrendConfig;
use crate::models::{EntityView, Params, SensorData};
use crate::stats;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Map, Value};

/// Rising variance detector.
///
/// Restricts each series to the lookback window before the evaluation
/// instant and flags it when the latest rolling std exceeds the
/// configured multiple of the baseline std.
pub fn failure_trends(data: &SensorData, cfg: &TrendConfig, now: NaiveDateTime) -> Value {
    let cutoff = now - Duration::hours(cfg.failure_lookback_hours);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), invalid_entry());
            continue;
        };

        let mut per_sensor = Map::new();
        for (name, slot) in sensors {
            let Some(series) = slot.series() else {
                per_sensor.insert(name.to_string(), invalid_entry());
                continue;
            };

            let recent = series.since(cutoff);
            if recent.is_empty() {
                per_sensor.insert(name.to_string(), message_entry("No recent data available."));
                continue;
            }

            let values = recent.values();
            let baseline_std = stats::sample_std(&values);
            let rolling = stats::rolling_std(&values, cfg.failure_window);
            let current_std = rolling.last().copied().unwrap_or(0.0);
            let mean = stats::mean(&values).unwrap_or(0.0);

            let message = if baseline_std > 0.0 && current_std > cfg.failure_std_ratio * baseline_std
            {
                format!(
                    "Sensor {} ({}) shows increased variance suggesting potential failure.",
                    id, name
                )
            } else {
                format!("Sensor {} ({}) readings are within normal range.", id, name)
            };

            per_sensor.insert(
                name.to_string(),
                json!({
                    "historical_mean": mean,
                    "historical_std": baseline_std,
                    "latest_rolling_std": current_std,
                    "message": message,
                }),
            );
        }
        response.insert(id.to_string(), Value::Object(per_sensor));
    }

    if response.is_empty() {
        return message_entry("No sensor data available for analysis in the last 24 hours.");
    }
    Value::Object(response)
}

/// Moving-average direction per (entity, sensor-type): the change
/// between the first and last rolling mean classifies the series as
/// upward, downward or stable.
pub fn sensor_trend(data: &SensorData, cfg: &TrendConfig, params: &Params) -> Value {
    let window = params.window.unwrap_or(cfg.window);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), invalid_entry());
            continue;
        };

        let mut per_sensor = Map::new();
        for (name, slot) in sensors {
            let Some(series) = slot.series() else {
                per_sensor.insert(name.to_string(), invalid_entry());
                continue;
            };
            if series.is_empty() {
                per_sensor.insert(name.to_string(), message_entry("No data available"));
                continue;
            }

            let rolling = stats::rolling_mean(&series.values(), window);
            let first = rolling.first().copied().unwrap_or(0.0);
            let last = rolling.last().copied().unwrap_or(0.0);
            let difference = last - first;

            let trend = if difference.abs() < cfg.stable_delta {
                "stable"
            } else if difference > 0.0 {
                "upward"
            } else {
                "downward"
            };

            per_sensor.insert(
                name.to_string(),
                json!({
                    "initial_rolling_mean": first,
                    "latest_rolling_mean": last,
                    "trend": trend,
                    "difference": difference,
                }),
            );
        }
        response.insert(id.to_string(), Value::Object(per_sensor));
    }

    Value::Object(response)
}

/// Per-entity trend of one target sensor: latest reading versus the
/// series mean classifies rising, falling or stable.
pub fn air_quality_trends(data: &SensorData, cfg: &TrendConfig, params: &Params) -> Value {
    let target = params
        .target_sensor
        .as_deref()
        .unwrap_or(&cfg.air_quality_sensor);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let entry = match entity {
            EntityView::Invalid => json!({ target: {"error": "Data format issue."} }),
            EntityView::Sensors(sensors) => {
                match sensors.iter().find(|(name, _)| *name == target) {
                    None => json!({
                        target: {"message": format!("No data found for {}.", target)}
                    }),
                    Some((_, slot)) => match slot.series() {
                        None => json!({ target: {"error": "Data format issue."} }),
                        Some(series) if series.is_empty() => {
                            json!({ target: {"message": "No data available."} })
                        }
                        Some(series) => {
                            let values = series.values();
                            let norm = stats::mean(&values).unwrap_or(0.0);
                            let latest = series.latest().map(|r| r.value).unwrap_or(0.0);

                            let trend = if latest > norm {
                                "rising"
                            } else if latest < norm {
                                "falling"
                            } else {
                                "stable"
                            };

                            json!({
                                target: {
                                    "norm": stats::round_to(norm, 2),
                                    "latest_reading": stats::round_to(latest, 2),
                                    "trend": trend,
                                    "message": format!(
                                        "{} trend is {} compared to average.",
                                        target, trend
                                    ),
                                }
                            })
                        }
                    },
                }
            }
        };
        response.insert(id.to_string(), entry);
    }

    if response.is_empty() {
        return message_entry(format!("No trend analysis found for {}.", target));
    }
    Value::Object(response)
}

/// Average static pressure per (entity, sensor-type) checked against
/// the expected range.
pub fn pressure_trend(data: &SensorData, cfg: &TrendConfig) -> Value {
    let (low, high) = cfg.pressure_range;
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), invalid_entry());
            continue;
        };

        let mut per_sensor = Map::new();
        for (name, slot) in sensors {
            let Some(series) = slot.series() else {
                per_sensor.insert(name.to_string(), invalid_entry());
                continue;
            };
            if series.is_empty() {
                per_sensor.insert(
                    name.to_string(),
                    message_entry("No data available for this sensor."),
                );
                continue;
            }

            let avg = stats::mean(&series.values()).unwrap_or(0.0);
            let (status, message) = if (low..=high).contains(&avg) {
                (
                    "normal",
                    format!(
                        "Sensor {} ({}) average pressure {:.2} is within the expected range.",
                        id, name, avg
                    ),
                )
            } else {
                (
                    "abnormal",
                    format!(
                        "Sensor {} ({}) average pressure {:.2} is out of the expected range ({}, {}).",
                        id, name, avg, low, high
                    ),
                )
            };

            per_sensor.insert(
                name.to_string(),
                json!({
                    "average_pressure": stats::round_to(avg, 2),
                    "status": status,
                    "message": message,
                }),
            );
        }
        response.insert(id.to_string(), Value::Object(per_sensor));
    }

    if response.is_empty() {
        return message_entry("No pressure sensor data found.");
    }
    Value::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;
    use crate::normalize;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        parse_timestamp("2025-02-10 12:00:00").unwrap()
    }

    #[test]
    fn test_failure_trends_quiet_series() {
        let cfg = TrendConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "Air_Temperature_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 20.0},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 20.1},
                        {"datetime": "2025-02-10 07:00:00", "reading_value": 19.9},
                        {"datetime": "2025-02-10 08:00:00", "reading_value": 20.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = failure_trends(&data, &cfg, now());
        let entry = &result["1"]["Air_Temperature_Sensor"];
        assert!(entry["message"]
            .as_str()
            .unwrap()
            .contains("within normal range"));
    }

    #[test]
    fn test_failure_trends_variance_spike() {
        let cfg = TrendConfig::default();
        // Flat baseline with a violent burst in the final window.
        let data = normalize::from_value(&json!({
            "1": {
                "Vibration_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 05:10:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 05:20:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 05:30:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 05:40:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 05:50:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:10:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:20:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:30:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:40:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 06:50:00", "reading_value": 10.0},
                        {"datetime": "2025-02-10 07:00:00", "reading_value": 50.0},
                        {"datetime": "2025-02-10 07:10:00", "reading_value": -30.0},
                        {"datetime": "2025-02-10 07:20:00", "reading_value": 60.0},
                        {"datetime": "2025-02-10 07:30:00", "reading_value": -40.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = failure_trends(&data, &cfg, now());
        let entry = &result["1"]["Vibration_Sensor"];
        assert!(entry["message"]
            .as_str()
            .unwrap()
            .contains("increased variance"));
    }

    #[test]
    fn test_failure_trends_old_data_excluded() {
        let cfg = TrendConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "Air_Temperature_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-01 05:00:00", "reading_value": 20.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = failure_trends(&data, &cfg, now());
        assert_eq!(
            result["1"]["Air_Temperature_Sensor"]["message"],
            json!("No recent data available.")
        );
    }

    #[test]
    fn test_sensor_trend_directions() {
        let cfg = TrendConfig::default();
        let rising = normalize::from_value(&json!({
            "1": {
                "S": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 1.0},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 2.0},
                        {"datetime": "2025-02-10 07:00:00", "reading_value": 3.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = sensor_trend(&rising, &cfg, &Params::default());
        assert_eq!(result["1"]["S"]["trend"], json!("upward"));

        let flat = normalize::from_value(&json!({
            "1": {
                "S": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 1.0},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 1.01}
                    ]
                }
            }
        }))
        .unwrap();

        let result = sensor_trend(&flat, &cfg, &Params::default());
        assert_eq!(result["1"]["S"]["trend"], json!("stable"));
    }

    #[test]
    fn test_air_quality_trends_rising() {
        let cfg = TrendConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "Air_Quality_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 78.0},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 85.0}
                    ]
                }
            },
            "2": {
                "Other_Sensor": {"timeseries_data": []}
            }
        }))
        .unwrap();

        let result = air_quality_trends(&data, &cfg, &Params::default());
        assert_eq!(result["1"]["Air_Quality_Sensor"]["trend"], json!("rising"));
        assert_eq!(
            result["2"]["Air_Quality_Sensor"]["message"],
            json!("No data found for Air_Quality_Sensor.")
        );
    }

    #[test]
    fn test_pressure_trend_in_and_out_of_range() {
        let cfg = TrendConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "Static_Pressure_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 1.2},
                        {"datetime": "2025-02-10 06:00:00", "reading_value": 1.3}
                    ]
                }
            },
            "2": {
                "Static_Pressure_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:00:00", "reading_value": 3.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = pressure_trend(&data, &cfg);
        assert_eq!(
            result["1"]["Static_Pressure_Sensor"]["status"],
            json!("normal")
        );
        assert_eq!(
            result["2"]["Static_Pressure_Sensor"]["status"],
            json!("abnormal")
        );
    }
}
