//! Environmental analyses over sensor-type keys aggregated across
//! every entity: noise, air quality, formaldehyde, CO2, particulate
//! matter, temperature, humidity, the combined comfort index, the
//! composite air-quality index, the supply/return temperature
//! difference and caller-driven health alerts.

use super::{AnalysisError, Result};
use crate::config::{AqiConfig, ComfortConfig, EnvironmentConfig};
use crate::models::{EntityView, Params, SensorData, TimeSeries};
use crate::stats;
use serde_json::{json, Map, Value};

/// Summary statistics over one aggregated series.
struct MetricSummary {
    mean: f64,
    min: f64,
    max: f64,
    std: f64,
    latest: f64,
}

fn summarize(series: &TimeSeries) -> Option<MetricSummary> {
    let values = series.values();
    let mean = stats::mean(&values)?;
    Some(MetricSummary {
        mean,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std: stats::sample_std(&values),
        latest: series.latest().map(|r| r.value)?,
    })
}

/// Aggregate one sensor key across entities and classify the latest
/// reading against a single upper threshold.
fn threshold_summary(
    data: &SensorData,
    sensor_key: &str,
    threshold: f64,
    high_alert: &str,
    normal_alert: &str,
) -> Value {
    let series = data.collect_sensor(sensor_key);
    match summarize(&series) {
        None => json!({"error": format!("No data found for {}", sensor_key)}),
        Some(s) => {
            let alert = if s.latest > threshold {
                high_alert
            } else {
                normal_alert
            };
            json!({
                "mean": s.mean,
                "min": s.min,
                "max": s.max,
                "std": s.std,
                "latest": s.latest,
                "alert": alert,
            })
        }
    }
}

/// Aggregate one sensor key and classify the latest reading against
/// an acceptable range.
fn range_summary(
    data: &SensorData,
    sensor_key: &str,
    range: (f64, f64),
    out_alert: &str,
    normal_alert: &str,
) -> Value {
    let series = data.collect_sensor(sensor_key);
    match summarize(&series) {
        None => json!({"error": format!("No data found for {}", sensor_key)}),
        Some(s) => {
            let alert = if s.latest < range.0 || s.latest > range.1 {
                out_alert
            } else {
                normal_alert
            };
            json!({
                "mean": s.mean,
                "min": s.min,
                "max": s.max,
                "std": s.std,
                "latest": s.latest,
                "alert": alert,
            })
        }
    }
}

/// Noise summary with a high-level alert.
pub fn noise_levels(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    threshold_summary(
        data,
        &cfg.noise_sensor,
        cfg.noise_threshold,
        "High noise level",
        "Normal noise level",
    )
}

/// Average air quality classified Good/Moderate/Poor.
pub fn air_quality(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    let series = data.collect_sensor(&cfg.air_quality_sensor);
    let values = series.values();
    let Some(avg) = stats::mean(&values) else {
        return json!({"error": format!("No data found for {}", cfg.air_quality_sensor)});
    };

    let (good_below, moderate_below) = cfg.air_quality_thresholds;
    let status = if avg <= good_below {
        "Good"
    } else if avg <= moderate_below {
        "Moderate"
    } else {
        "Poor"
    };

    json!({
        "average_air_quality": avg,
        "status": status,
        "min": values.iter().copied().fold(f64::INFINITY, f64::min),
        "max": values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Formaldehyde summary with a threshold alert.
pub fn formaldehyde_levels(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    threshold_summary(
        data,
        &cfg.formaldehyde_sensor,
        cfg.formaldehyde_threshold,
        "High formaldehyde level",
        "Normal formaldehyde level",
    )
}

/// CO2 summary with a threshold alert.
pub fn co2_levels(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    threshold_summary(
        data,
        &cfg.co2_sensor,
        cfg.co2_threshold,
        "High CO2 level",
        "Normal CO2 level",
    )
}

/// Per-key particulate-matter summaries, one entry per configured
/// PM sensor key.
pub fn pm_levels(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    let mut analysis = Map::new();

    for pm in &cfg.pm_sensors {
        let series = data.collect_sensor(&pm.key);
        let entry = match summarize(&series) {
            None => json!({"error": "No data available"}),
            Some(s) => {
                let alert = if s.latest > pm.threshold {
                    format!("High {} reading", pm.key)
                } else {
                    format!("Normal {} reading", pm.key)
                };
                json!({
                    "mean": s.mean,
                    "min": s.min,
                    "max": s.max,
                    "std": s.std,
                    "latest": s.latest,
                    "alert": alert,
                })
            }
        };
        analysis.insert(pm.key.clone(), entry);
    }

    Value::Object(analysis)
}

/// Temperature summary with a range alert.
pub fn temperatures(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    range_summary(
        data,
        &cfg.temperature_sensor,
        cfg.temperature_range,
        "Temperature out of range",
        "Temperature normal",
    )
}

/// Humidity summary with a range alert.
pub fn humidity(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    range_summary(
        data,
        &cfg.humidity_sensor,
        cfg.humidity_range,
        "Humidity out of range",
        "Humidity normal",
    )
}

/// Combined temperature/humidity comfort assessment.
///
/// The comfort index starts from 100 and subtracts the weighted
/// deviations of the latest readings from the midpoints of the
/// acceptable ranges, clamped to [0, 100]. A failed sub-analysis
/// contributes its midpoint, i.e. zero deviation.
pub fn temperature_humidity(
    data: &SensorData,
    cfg: &EnvironmentConfig,
    comfort: &ComfortConfig,
) -> Value {
    let temp_summary = temperatures(data, cfg);
    let humidity_summary = humidity(data, cfg);

    let temp_mid = (cfg.temperature_range.0 + cfg.temperature_range.1) / 2.0;
    let humidity_mid = (cfg.humidity_range.0 + cfg.humidity_range.1) / 2.0;

    let temp_latest = temp_summary
        .get("latest")
        .and_then(Value::as_f64)
        .unwrap_or(temp_mid);
    let humidity_latest = humidity_summary
        .get("latest")
        .and_then(Value::as_f64)
        .unwrap_or(humidity_mid);

    let temp_diff = (temp_latest - temp_mid).abs();
    let humidity_diff = (humidity_latest - humidity_mid).abs();
    let index = (100.0
        - (temp_diff * comfort.temperature_weight + humidity_diff * comfort.humidity_weight))
        .clamp(0.0, 100.0);

    let assessment = if index > comfort.comfortable_above {
        "Comfortable"
    } else if index > comfort.tolerable_above {
        "Less comfortable"
    } else {
        "Uncomfortable"
    };

    json!({
        "temperature": temp_summary,
        "humidity": humidity_summary,
        "comfort_index": index,
        "comfort_assessment": assessment,
    })
}

/// Supply minus return air temperature across all entities.
pub fn supply_return_difference(data: &SensorData, cfg: &EnvironmentConfig) -> Value {
    let supply = data.collect_sensor(&cfg.supply_sensor);
    let return_side = data.collect_sensor(&cfg.return_sensor);

    if supply.is_empty() {
        return json!({"error": "No supply air temperature data found"});
    }
    if return_side.is_empty() {
        return json!({"error": "No return air temperature data found"});
    }

    let avg_supply = stats::mean(&supply.values()).unwrap_or(0.0);
    let avg_return = stats::mean(&return_side.values()).unwrap_or(0.0);
    let diff = avg_supply - avg_return;

    json!({
        "average_supply_temperature": stats::round_to(avg_supply, 2),
        "average_return_temperature": stats::round_to(avg_return, 2),
        "temperature_difference": stats::round_to(diff, 2),
        "message": format!(
            "Average supply temperature is {:.2}°C, average return temperature is {:.2}°C, with a difference of {:.2}°C.",
            avg_supply, avg_return, diff
        ),
    })
}

/// Composite air-quality index from weighted pollutant components.
///
/// Each component normalizes its latest reading by the configured
/// threshold and scales by its weight; missing pollutants are simply
/// skipped and the index is the sum of the components present.
pub fn air_quality_index(data: &SensorData, cfg: &AqiConfig) -> Value {
    let mut components = Map::new();

    for component in &cfg.components {
        let series = data.collect_sensor(&component.sensor);
        if let Some(latest) = series.latest() {
            let normalized = latest.value / component.threshold;
            components.insert(
                component.sensor.clone(),
                json!(normalized * component.weight),
            );
        }
    }

    if components.is_empty() {
        return json!({"error": "Insufficient data for AQI calculation."});
    }

    let aqi: f64 = components.values().filter_map(Value::as_f64).sum();
    let (good_below, moderate_below, sensitive_below) = cfg.bands;
    let status = if aqi < good_below {
        "Good"
    } else if aqi < moderate_below {
        "Moderate"
    } else if aqi < sensitive_below {
        "Unhealthy for Sensitive Groups"
    } else {
        "Unhealthy"
    };

    json!({
        "AQI": aqi,
        "Status": status,
        "Components": Value::Object(components),
    })
}

/// Alerts for latest readings outside caller-supplied ranges.
///
/// The thresholds mapping is required; only (entity, sensor-type)
/// pairs whose type appears in it produce entries, keyed
/// "entityId_sensorType".
pub fn health_alerts(data: &SensorData, params: &Params) -> Result<Value> {
    let thresholds = params
        .thresholds
        .as_ref()
        .ok_or(AnalysisError::MissingParameter("thresholds"))?;

    let mut alerts = Map::new();

    for (id, entity) in data.nested_view() {
        let EntityView::Sensors(sensors) = entity else {
            alerts.insert(id.to_string(), json!("Data error."));
            continue;
        };

        for (name, slot) in sensors {
            let Some((min_val, max_val)) = thresholds.get(name).copied() else {
                continue;
            };
            let key = format!("{}_{}", id, name);

            let Some(series) = slot.series() else {
                alerts.insert(key, json!("Data error."));
                continue;
            };
            let Some(latest) = series.latest() else {
                alerts.insert(key, json!("No data available."));
                continue;
            };

            let message = if latest.value < min_val || latest.value > max_val {
                format!(
                    "Alert: Latest reading {} out of range [{}, {}].",
                    latest.value, min_val, max_val
                )
            } else {
                format!("OK: Latest reading {} within acceptable range.", latest.value)
            };
            alerts.insert(key, json!(message));
        }
    }

    Ok(Value::Object(alerts))
}
