//! Aggregation analyses: fixed-frequency resampling summaries and
//! the nearest-timestamp Pearson correlation matrix.

use super::{AnalysisError, Result};
use crate::config::AggregationConfig;
use crate::models::{format_timestamp, EntityView, Params, SensorData};
use crate::stats;
use chrono::Duration;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Resample every (entity, sensor-type) series into bucket summaries.
///
/// The bucket frequency comes from the request, falling back to the
/// configured default; an unparseable code is a routine failure.
pub fn aggregate_sensor_data(
    data: &SensorData,
    cfg: &AggregationConfig,
    params: &Params,
) -> Result<Value> {
    let code = params
        .frequency
        .as_deref()
        .unwrap_or(&cfg.default_frequency);
    let period = stats::parse_frequency(code)
        .ok_or_else(|| AnalysisError::UnsupportedFrequency(code.to_string()))?;

    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            response.insert(id.to_string(), json!({"error": "Aggregation failed"}));
            continue;
        };

        let mut per_sensor = Map::new();
        for (name, slot) in sensors {
            let Some(series) = slot.series() else {
                per_sensor.insert(name.to_string(), json!({"error": "Aggregation failed"}));
                continue;
            };

            let records: Vec<Value> = stats::resample(series, period)
                .into_iter()
                .map(|bucket| {
                    json!({
                        "timestamp": format_timestamp(bucket.timestamp),
                        "mean": bucket.mean,
                        "std": bucket.std,
                        "min": bucket.min,
                        "max": bucket.max,
                    })
                })
                .collect();
            per_sensor.insert(name.to_string(), Value::Array(records));
        }
        response.insert(id.to_string(), Value::Object(per_sensor));
    }

    Ok(Value::Object(response))
}

/// Pearson correlation matrix across flat series.
///
/// Series are merged on the first series' time axis, taking each
/// other series' nearest reading within the configured tolerance.
/// Series that failed normalization or carry no readings are skipped;
/// the matrix covers the remainder.
pub fn correlate_sensors(data: &SensorData, cfg: &AggregationConfig) -> Value {
    let mut usable = Vec::new();
    for (id, slot) in data.flat_view() {
        match slot.series() {
            Some(series) if !series.is_empty() => usable.push((id.to_string(), series)),
            _ => warn!(series = %id, "Skipping series unusable for correlation"),
        }
    }

    if usable.is_empty() {
        return json!({"error": "No valid timeseries data to correlate."});
    }

    let aligned = stats::align_series(&usable, Duration::seconds(cfg.correlation_tolerance_secs));
    let matrix = stats::pearson_matrix(&aligned);

    let mut response = Map::new();
    for (i, id) in aligned.ids.iter().enumerate() {
        let mut row = Map::new();
        for (j, other) in aligned.ids.iter().enumerate() {
            row.insert(other.clone(), json!(matrix[i][j]));
        }
        response.insert(id.clone(), Value::Object(row));
    }
    Value::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;
    use serde_json::json;

    #[test]
    fn test_aggregate_hourly() {
        let cfg = AggregationConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "S": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:10:00", "reading_value": 1.0},
                        {"datetime": "2025-02-10 05:50:00", "reading_value": 3.0},
                        {"datetime": "2025-02-10 06:20:00", "reading_value": 5.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = aggregate_sensor_data(&data, &cfg, &Params::default()).unwrap();
        let records = result["1"]["S"].as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["timestamp"], json!("2025-02-10 05:00:00"));
        assert_eq!(records[0]["mean"], json!(2.0));
        assert_eq!(records[0]["min"], json!(1.0));
        assert_eq!(records[0]["max"], json!(3.0));
        assert_eq!(records[1]["timestamp"], json!("2025-02-10 06:00:00"));
        assert_eq!(records[1]["std"], json!(0.0));
    }

    #[test]
    fn test_aggregate_bucket_boundary_round_trip() {
        let cfg = AggregationConfig::default();
        let params = Params {
            frequency: Some("15T".to_string()),
            ..Params::default()
        };
        let data = normalize::from_value(&json!({
            "1": {
                "S": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:17:42", "reading_value": 1.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = aggregate_sensor_data(&data, &cfg, &params).unwrap();
        let records = result["1"]["S"].as_array().unwrap();
        let boundary = records[0]["timestamp"].as_str().unwrap();
        // The emitted boundary reparses to the 15-minute bucket start.
        let reparsed = crate::models::parse_timestamp(boundary).unwrap();
        assert_eq!(crate::models::format_timestamp(reparsed), "2025-02-10 05:15:00");
    }

    #[test]
    fn test_aggregate_bad_frequency_is_failure() {
        let cfg = AggregationConfig::default();
        let params = Params {
            frequency: Some("yearly".to_string()),
            ..Params::default()
        };
        let data = normalize::from_value(&json!({
            "1": {"S": {"timeseries_data": []}}
        }))
        .unwrap();

        let err = aggregate_sensor_data(&data, &cfg, &params).unwrap_err();
        assert_eq!(err, AnalysisError::UnsupportedFrequency("yearly".to_string()));
    }

    #[test]
    fn test_correlate_linear_series() {
        let cfg = AggregationConfig::default();
        let data = normalize::from_value(&json!({
            "a": [
                {"datetime": "2025-03-15 00:02:01", "reading_value": 10.0},
                {"datetime": "2025-03-15 00:03:01", "reading_value": 11.0},
                {"datetime": "2025-03-15 00:04:01", "reading_value": 12.0}
            ],
            "b": [
                {"datetime": "2025-03-15 00:02:01", "reading_value": 20.0},
                {"datetime": "2025-03-15 00:03:01", "reading_value": 22.0},
                {"datetime": "2025-03-15 00:04:01", "reading_value": 24.0}
            ]
        }))
        .unwrap();

        let result = correlate_sensors(&data, &cfg);
        let r = result["a"]["b"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-6);
        assert!((result["b"]["b"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_correlate_skips_invalid_series() {
        let cfg = AggregationConfig::default();
        let data = normalize::from_value(&json!({
            "good": [
                {"datetime": "2025-03-15 00:02:01", "reading_value": 1.0},
                {"datetime": "2025-03-15 00:03:01", "reading_value": 2.0}
            ],
            "bad": [
                {"datetime": "nope", "reading_value": 1.0}
            ]
        }))
        .unwrap();

        let result = correlate_sensors(&data, &cfg);
        assert!(result.get("bad").is_none());
        assert!(result.get("good").is_some());
    }

    #[test]
    fn test_correlate_nothing_usable() {
        let cfg = AggregationConfig::default();
        let data = normalize::from_value(&json!({"empty": []})).unwrap();
        let result = correlate_sensors(&data, &cfg);
        assert_eq!(
            result["error"],
            json!("No valid timeseries data to correlate.")
        );
    }
}
