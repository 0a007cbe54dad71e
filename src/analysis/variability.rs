//! Variability analyses: recalibration frequency and air-flow
//! stability, both built on the coefficient of variation.

use super::{invalid_entry, message_entry};
use crate::config::VariabilityConfig;
use crate::models::{EntityView, Params, SensorData};
use crate::stats;
use serde_json::{json, Map, Value};

/// Per-series CV classification: a series above the CV threshold is
/// flagged as needing more frequent recalibration.
pub fn recalibration_frequency(data: &SensorData, cfg: &VariabilityConfig) -> Value {
    let mut response = Map::new();

    for (id, slot) in data.flat_view() {
        let Some(series) = slot.series() else {
            response.insert(id.to_string(), invalid_entry());
            continue;
        };
        if series.is_empty() {
            response.insert(id.to_string(), message_entry("No data available"));
            continue;
        }

        let values = series.values();
        let mean = stats::mean(&values).unwrap_or(0.0);
        let std = stats::sample_std(&values);
        let cv = stats::coefficient_of_variation(&values);

        let message = if cv > cfg.cv_threshold {
            format!(
                "Timeseries {} has high variability; recalibration might be required more frequently.",
                id
            )
        } else {
            format!(
                "Timeseries {} performance is stable; no immediate recalibration needed.",
                id
            )
        };

        response.insert(
            id.to_string(),
            json!({
                "mean": stats::round_to(mean, 4),
                "std": stats::round_to(std, 4),
                "coefficient_of_variation": stats::round_to(cv, 4),
                "message": message,
            }),
        );
    }

    if response.is_empty() {
        return message_entry("No timeseries data available.");
    }
    Value::Object(response)
}

/// Per-entity CV of one target sensor, classified stable below the
/// CV threshold.
pub fn air_flow_variation(data: &SensorData, cfg: &VariabilityConfig, params: &Params) -> Value {
    let target = params
        .target_sensor
        .as_deref()
        .unwrap_or(&cfg.air_flow_sensor);
    let mut response = Map::new();

    for (id, entity) in data.nested_view() {
        let entry = match entity {
            EntityView::Invalid => {
                json!({ target: {"error": "Data formatting error"} })
            }
            EntityView::Sensors(sensors) => {
                match sensors.iter().find(|(name, _)| *name == target) {
                    None => json!({
                        target: {"message": format!("No data available for {}.", target)}
                    }),
                    Some((_, slot)) => match slot.series() {
                        None => json!({ target: {"error": "Data formatting error"} }),
                        Some(series) if series.is_empty() => json!({
                            target: {"message": format!("No readings found for {}.", target)}
                        }),
                        Some(series) => {
                            let values = series.values();
                            let mean = stats::mean(&values).unwrap_or(0.0);
                            let std = stats::sample_std(&values);
                            let cv = stats::coefficient_of_variation(&values);
                            let verdict = if cv < cfg.cv_threshold {
                                "Stable airflow."
                            } else {
                                "High variation detected."
                            };
                            json!({
                                target: {
                                    "mean_airflow": stats::round_to(mean, 2),
                                    "std_dev_airflow": stats::round_to(std, 2),
                                    "coefficient_of_variation": stats::round_to(cv, 2),
                                    "message": format!(
                                        "{} coefficient of variation: {:.2}. {}",
                                        target, cv, verdict
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

    Value::Object(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;
    use serde_json::json;

    fn flat_payload() -> SensorData {
        normalize::from_value(&json!({
            "ts-1": [
                {"datetime": "2025-02-10 05:31:59", "reading_value": 27.99},
                {"datetime": "2025-02-10 05:32:11", "reading_value": 28.01},
                {"datetime": "2025-02-10 05:32:43", "reading_value": 27.98}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_recalibration_stable_scenario() {
        let cfg = VariabilityConfig::default();
        let result = recalibration_frequency(&flat_payload(), &cfg);

        let entry = &result["ts-1"];
        let cv = entry["coefficient_of_variation"].as_f64().unwrap();
        assert!(cv < 0.001, "cv was {}", cv);
        assert!(entry["message"]
            .as_str()
            .unwrap()
            .contains("performance is stable"));
    }

    #[test]
    fn test_recalibration_high_variability() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({
            "ts-1": [
                {"datetime": "2025-02-10 05:31:59", "reading_value": 1.0},
                {"datetime": "2025-02-10 05:32:11", "reading_value": 10.0},
                {"datetime": "2025-02-10 05:32:43", "reading_value": 1.0}
            ]
        }))
        .unwrap();

        let result = recalibration_frequency(&data, &cfg);
        assert!(result["ts-1"]["message"]
            .as_str()
            .unwrap()
            .contains("high variability"));
    }

    #[test]
    fn test_recalibration_single_reading_guarded() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({
            "only": [{"datetime": "2025-02-10 05:31:59", "reading_value": 5.0}]
        }))
        .unwrap();

        let result = recalibration_frequency(&data, &cfg);
        assert_eq!(result["only"]["std"], json!(0.0));
        assert_eq!(result["only"]["coefficient_of_variation"], json!(0.0));
    }

    #[test]
    fn test_recalibration_empty_series() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({"idle": []})).unwrap();
        let result = recalibration_frequency(&data, &cfg);
        assert_eq!(result["idle"]["message"], json!("No data available"));
    }

    #[test]
    fn test_recalibration_isolates_bad_key() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({
            "good": [{"datetime": "2025-02-10 05:31:59", "reading_value": 5.0}],
            "bad": [{"datetime": "garbage", "reading_value": 5.0}]
        }))
        .unwrap();

        let result = recalibration_frequency(&data, &cfg);
        assert!(result["good"].get("mean").is_some());
        assert_eq!(result["bad"]["error"], json!("Invalid sensor data format"));
    }

    #[test]
    fn test_air_flow_variation_stable() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({
            "1": {
                "Air_Flow_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:31:59", "reading_value": 27.99},
                        {"datetime": "2025-02-10 05:32:11", "reading_value": 28.02}
                    ]
                }
            }
        }))
        .unwrap();

        let result = air_flow_variation(&data, &cfg, &Params::default());
        let entry = &result["1"]["Air_Flow_Sensor"];
        assert!(entry["message"].as_str().unwrap().contains("Stable airflow."));
    }

    #[test]
    fn test_air_flow_variation_missing_target() {
        let cfg = VariabilityConfig::default();
        let data = normalize::from_value(&json!({
            "1": {"Other_Sensor": {"timeseries_data": []}}
        }))
        .unwrap();

        let result = air_flow_variation(&data, &cfg, &Params::default());
        assert_eq!(
            result["1"]["Air_Flow_Sensor"]["message"],
            json!("No data available for Air_Flow_Sensor.")
        );
    }

    #[test]
    fn test_air_flow_variation_custom_target() {
        let cfg = VariabilityConfig::default();
        let params = Params {
            target_sensor: Some("Duct_Flow_Sensor".to_string()),
            ..Params::default()
        };
        let data = normalize::from_value(&json!({
            "1": {
                "Duct_Flow_Sensor": {
                    "timeseries_data": [
                        {"datetime": "2025-02-10 05:31:59", "reading_value": 1.0},
                        {"datetime": "2025-02-10 05:32:11", "reading_value": 9.0}
                    ]
                }
            }
        }))
        .unwrap();

        let result = air_flow_variation(&data, &cfg, &params);
        assert!(result["1"]["Duct_Flow_Sensor"]["message"]
            .as_str()
            .unwrap()
            .contains("High variation detected."));
    }
}
