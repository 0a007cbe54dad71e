//! Reporting-status analyses: online/offline classification and
//! latest-reading deviation flags.

use super::{invalid_entry, message_entry};
use crate::config::StatusConfig;
use crate::models::{format_timestamp, EntityView, SensorData};
use crate::stats;
use chrono::{Duration, NaiveDateTime};
use serde_json::{json, Map, Value};

/// Flag series whose latest reading falls outside mean +/- sigma*std.
pub fn device_deviation(data: &SensorData, cfg: &StatusConfig) -> Value {
    let mut response = Map::new();

    for (id, slot) in data.flat_view() {
        let Some(series) = slot.series() else {
            response.insert(id.to_string(), json!({"error": "Processing failed"}));
            continue;
        };
        if series.is_empty() {
            response.insert(id.to_string(), message_entry("No data available"));
            continue;
        }

        let values = series.values();
        let mean = stats::mean(&values).unwrap_or(0.0);
        let std = stats::sample_std(&values);
        let latest = series.latest().map(|r| r.value).unwrap_or(0.0);

        let deviates = std > 0.0
            && (latest < mean - cfg.deviation_sigma * std
                || latest > mean + cfg.deviation_sigma * std);

        let message = if deviates {
            "Deviation detected beyond 2 STD."
        } else {
            "Within normal range."
        };
        response.insert(
            id.to_string(),
            json!({
                "historical_mean": stats::round_to(mean, 4),
                "historical_std": stats::round_to(std, 4),
                "latest_reading": stats::round_to(latest, 4),
                "message": message,
            }),
        );
    }

    Value::Object(response)
}

/// Classify each sensor online or offline from its most recent report
/// time, relative to the injected evaluation instant.
pub fn sensor_status(data: &SensorData, cfg: &StatusConfig, now: NaiveDateTime) -> Value {
    let threshold = now - Duration::minutes(cfg.offline_after_minutes);
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

            let last_report = series.latest().map(|r| r.timestamp);
            let online = last_report.map_or(false, |t| t >= threshold);

            let (status, message) = if online {
                (
                    "online",
                    format!(
                        "Sensor {} ({}) is reporting data normally. Last report at {}.",
                        id,
                        name,
                        format_timestamp(last_report.unwrap_or(now))
                    ),
                )
            } else {
                (
                    "offline",
                    format!(
                        "Sensor {} ({}) appears offline or not reporting recently.",
                        id, name
                    ),
                )
            };

            per_sensor.insert(
                name.to_string(),
                json!({
                    "last_report": last_report.map(format_timestamp),
                    "status": status,
                    "message": message,
                }),
            );
        }
        response.insert(id.to_string(), Value::Object(per_sensor));
    }

    if response.is_empty() {
        return message_entry("No sensor data available for analysis.");
    }
    Value::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;
    use crate::normalize;
    use serde_json::json;

    #[test]
    fn test_device_deviation_flagged() {
        let cfg = StatusConfig::default();
        // History hovers around 20 with a std near 2; the latest
        // reading of 25 clears mean + 2*std (about 24.4) and must be
        // flagged.
        let data = normalize::from_value(&json!({
            "dev-1": [
                {"datetime": "2025-02-10 05:00:00", "reading_value": 19.0},
                {"datetime": "2025-02-10 05:05:00", "reading_value": 21.0},
                {"datetime": "2025-02-10 05:10:00", "reading_value": 19.0},
                {"datetime": "2025-02-10 05:15:00", "reading_value": 21.0},
                {"datetime": "2025-02-10 05:20:00", "reading_value": 19.0},
                {"datetime": "2025-02-10 05:25:00", "reading_value": 21.0},
                {"datetime": "2025-02-10 05:30:00", "reading_value": 19.0},
                {"datetime": "2025-02-10 05:35:00", "reading_value": 21.0},
                {"datetime": "2025-02-10 05:40:00", "reading_value": 25.0}
            ]
        }))
        .unwrap();

        let result = device_deviation(&data, &cfg);
        let entry = &result["dev-1"];
        let mean = entry["historical_mean"].as_f64().unwrap();
        let std = entry["historical_std"].as_f64().unwrap();
        assert!(25.0 > mean + 2.0 * std);
        assert_eq!(entry["message"], json!("Deviation detected beyond 2 STD."));
    }

    #[test]
    fn test_device_deviation_within_range() {
        let cfg = StatusConfig::default();
        let data = normalize::from_value(&json!({
            "dev-1": [
                {"datetime": "2025-02-10 05:00:00", "reading_value": 20.0},
                {"datetime": "2025-02-10 05:05:00", "reading_value": 20.5},
                {"datetime": "2025-02-10 05:10:00", "reading_value": 19.5},
                {"datetime": "2025-02-10 05:15:00", "reading_value": 20.2}
            ]
        }))
        .unwrap();

        let result = device_deviation(&data, &cfg);
        assert_eq!(result["dev-1"]["message"], json!("Within normal range."));
    }

    #[test]
    fn test_device_deviation_single_reading_no_fault() {
        let cfg = StatusConfig::default();
        let data = normalize::from_value(&json!({
            "dev-1": [{"datetime": "2025-02-10 05:00:00", "reading_value": 42.0}]
        }))
        .unwrap();

        let result = device_deviation(&data, &cfg);
        let entry = &result["dev-1"];
        assert_eq!(entry["historical_std"], json!(0.0));
        assert_eq!(entry["message"], json!("Within normal range."));
    }

    #[test]
    fn test_sensor_status_online_and_offline() {
        let cfg = StatusConfig::default();
        let now = parse_timestamp("2025-02-10 06:00:00").unwrap();
        let data = normalize::from_value(&json!({
            "1": {
                "Fresh_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:30:00", "reading_value": 1.0}
                    ]
                },
                "Stale_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 03:00:00", "reading_value": 1.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = sensor_status(&data, &cfg, now);
        assert_eq!(result["1"]["Fresh_Sensor"]["status"], json!("online"));
        assert_eq!(
            result["1"]["Fresh_Sensor"]["last_report"],
            json!("2025-02-10 05:30:00")
        );
        assert_eq!(result["1"]["Stale_Sensor"]["status"], json!("offline"));
    }

    #[test]
    fn test_sensor_status_empty_series_is_offline() {
        let cfg = StatusConfig::default();
        let now = parse_timestamp("2025-02-10 06:00:00").unwrap();
        let data = normalize::from_value(&json!({
            "1": {"Silent_Sensor": {"timeseries_data": []}}
        }))
        .unwrap();

        let result = sensor_status(&data, &cfg, now);
        let entry = &result["1"]["Silent_Sensor"];
        assert_eq!(entry["status"], json!("offline"));
        assert_eq!(entry["last_report"], json!(null));
    }

    #[test]
    fn test_sensor_status_deterministic_for_fixed_instant() {
        let cfg = StatusConfig::default();
        let now = parse_timestamp("2025-02-10 06:00:00").unwrap();
        let data = normalize::from_value(&json!({
            "1": {
                "S": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:30:00", "reading_value": 1.0}
                    ]
                }
            }
        }))
        .unwrap();

        let first = sensor_status(&data, &cfg, now);
        let second = sensor_status(&data, &cfg, now);
        assert_eq!(first, second);
    }
}
