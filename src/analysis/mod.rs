//! Analysis catalog.
//!
//! The catalog maps every registered analysis kind to its routine.
//! Routines share the same contract: canonical sensor data in,
//! JSON results out, with malformed keys isolated as per-key error
//! entries and empty inputs reported as explicit "no data" messages.
//! A routine only returns `Err` for genuine failures (a missing
//! required parameter, an unusable frequency code); those are turned
//! into structured error responses at the dispatch boundary.

pub mod aggregate;
pub mod anomaly;
pub mod environment;
pub mod status;
pub mod trends;
pub mod variability;

use crate::config::AnalyticsConfig;
use crate::models::{Params, SensorData};
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Failure inside a routine. Everything else a routine can express is
/// an in-band result value.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unsupported aggregation frequency: {0}")]
    UnsupportedFrequency(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Every registered analysis kind.
///
/// The string forms are the request-facing `analysis_type`
/// identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    RecalibrationFrequency,
    FailureTrends,
    DeviceDeviation,
    SensorStatus,
    AirQualityTrends,
    HvacAnomalies,
    SupplyReturnTempDifference,
    AirFlowVariation,
    SensorTrend,
    PressureTrend,
    AggregateSensorData,
    CorrelateSensors,
    AirQualityIndex,
    HealthAlerts,
    DetectAnomalies,
    NoiseLevels,
    AirQuality,
    FormaldehydeLevels,
    Co2Levels,
    PmLevels,
    Temperatures,
    Humidity,
    TemperatureHumidity,
    PotentialFailures,
    DowntimeForecast,
}

impl AnalysisKind {
    /// All kinds, in catalog order.
    pub const ALL: [AnalysisKind; 25] = [
        AnalysisKind::RecalibrationFrequency,
        AnalysisKind::FailureTrends,
        AnalysisKind::DeviceDeviation,
        AnalysisKind::SensorStatus,
        AnalysisKind::AirQualityTrends,
        AnalysisKind::HvacAnomalies,
        AnalysisKind::SupplyReturnTempDifference,
        AnalysisKind::AirFlowVariation,
        AnalysisKind::SensorTrend,
        AnalysisKind::PressureTrend,
        AnalysisKind::AggregateSensorData,
        AnalysisKind::CorrelateSensors,
        AnalysisKind::AirQualityIndex,
        AnalysisKind::HealthAlerts,
        AnalysisKind::DetectAnomalies,
        AnalysisKind::NoiseLevels,
        AnalysisKind::AirQuality,
        AnalysisKind::FormaldehydeLevels,
        AnalysisKind::Co2Levels,
        AnalysisKind::PmLevels,
        AnalysisKind::Temperatures,
        AnalysisKind::Humidity,
        AnalysisKind::TemperatureHumidity,
        AnalysisKind::PotentialFailures,
        AnalysisKind::DowntimeForecast,
    ];

    /// Request-facing identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::RecalibrationFrequency => "analyze_recalibration_frequency",
            AnalysisKind::FailureTrends => "analyze_failure_trends",
            AnalysisKind::DeviceDeviation => "analyze_device_deviation",
            AnalysisKind::SensorStatus => "analyze_sensor_status",
            AnalysisKind::AirQualityTrends => "analyze_air_quality_trends",
            AnalysisKind::HvacAnomalies => "analyze_hvac_anomalies",
            AnalysisKind::SupplyReturnTempDifference => "analyze_supply_return_temp_difference",
            AnalysisKind::AirFlowVariation => "analyze_air_flow_variation",
            AnalysisKind::SensorTrend => "analyze_sensor_trend",
            AnalysisKind::PressureTrend => "analyze_pressure_trend",
            AnalysisKind::AggregateSensorData => "aggregate_sensor_data",
            AnalysisKind::CorrelateSensors => "correlate_sensors",
            AnalysisKind::AirQualityIndex => "compute_air_quality_index",
            AnalysisKind::HealthAlerts => "generate_health_alerts",
            AnalysisKind::DetectAnomalies => "detect_anomalies",
            AnalysisKind::NoiseLevels => "analyze_noise_levels",
            AnalysisKind::AirQuality => "analyze_air_quality",
            AnalysisKind::FormaldehydeLevels => "analyze_formaldehyde_levels",
            AnalysisKind::Co2Levels => "analyze_co2_levels",
            AnalysisKind::PmLevels => "analyze_pm_levels",
            AnalysisKind::Temperatures => "analyze_temperatures",
            AnalysisKind::Humidity => "analyze_humidity",
            AnalysisKind::TemperatureHumidity => "analyze_temperature_humidity",
            AnalysisKind::PotentialFailures => "detect_potential_failures",
            AnalysisKind::DowntimeForecast => "forecast_downtimes",
        }
    }

    /// Look a kind up by its request-facing identifier.
    pub fn from_name(name: &str) -> Option<AnalysisKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The analysis registry: built once from configuration at startup
/// and passed by reference into the dispatcher.
#[derive(Debug, Clone)]
pub struct Catalog {
    config: AnalyticsConfig,
}

impl Catalog {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    /// Run one analysis over normalized data.
    ///
    /// `now` is the evaluation instant for time-relative routines;
    /// callers inject it so results are a pure function of the input.
    pub fn run(
        &self,
        kind: AnalysisKind,
        data: &SensorData,
        params: &Params,
        now: NaiveDateTime,
    ) -> Result<Value> {
        let cfg = &self.config;
        match kind {
            AnalysisKind::RecalibrationFrequency => {
                Ok(variability::recalibration_frequency(data, &cfg.variability))
            }
            AnalysisKind::AirFlowVariation => {
                Ok(variability::air_flow_variation(data, &cfg.variability, params))
            }
            AnalysisKind::FailureTrends => Ok(trends::failure_trends(data, &cfg.trend, now)),
            AnalysisKind::SensorTrend => Ok(trends::sensor_trend(data, &cfg.trend, params)),
            AnalysisKind::AirQualityTrends => {
                Ok(trends::air_quality_trends(data, &cfg.trend, params))
            }
            AnalysisKind::PressureTrend => Ok(trends::pressure_trend(data, &cfg.trend)),
            AnalysisKind::DeviceDeviation => Ok(status::device_deviation(data, &cfg.status)),
            AnalysisKind::SensorStatus => Ok(status::sensor_status(data, &cfg.status, now)),
            AnalysisKind::HvacAnomalies => Ok(anomaly::hvac_anomalies(data, &cfg.anomaly, now)),
            AnalysisKind::DetectAnomalies => {
                Ok(anomaly::detect_anomalies(data, &cfg.anomaly, params))
            }
            AnalysisKind::PotentialFailures => {
                Ok(anomaly::potential_failures(data, &cfg.anomaly, params))
            }
            AnalysisKind::DowntimeForecast => Ok(anomaly::forecast_downtimes(data, &cfg.anomaly)),
            AnalysisKind::SupplyReturnTempDifference => {
                Ok(environment::supply_return_difference(data, &cfg.environment))
            }
            AnalysisKind::AirQualityIndex => Ok(environment::air_quality_index(data, &cfg.aqi)),
            AnalysisKind::HealthAlerts => environment::health_alerts(data, params),
            AnalysisKind::NoiseLevels => Ok(environment::noise_levels(data, &cfg.environment)),
            AnalysisKind::AirQuality => Ok(environment::air_quality(data, &cfg.environment)),
            AnalysisKind::FormaldehydeLevels => {
                Ok(environment::formaldehyde_levels(data, &cfg.environment))
            }
            AnalysisKind::Co2Levels => Ok(environment::co2_levels(data, &cfg.environment)),
            AnalysisKind::PmLevels => Ok(environment::pm_levels(data, &cfg.environment)),
            AnalysisKind::Temperatures => Ok(environment::temperatures(data, &cfg.environment)),
            AnalysisKind::Humidity => Ok(environment::humidity(data, &cfg.environment)),
            AnalysisKind::TemperatureHumidity => Ok(environment::temperature_humidity(
                data,
                &cfg.environment,
                &cfg.comfort,
            )),
            AnalysisKind::AggregateSensorData => {
                aggregate::aggregate_sensor_data(data, &cfg.aggregation, params)
            }
            AnalysisKind::CorrelateSensors => {
                Ok(aggregate::correlate_sensors(data, &cfg.aggregation))
            }
        }
    }
}

/// Per-key error entry for records that failed normalization.
pub(crate) fn invalid_entry() -> Value {
    json!({"error": "Invalid sensor data format"})
}

/// Per-key "no data" message entry.
pub(crate) fn message_entry(message: impl Into<String>) -> Value {
    json!({"message": message.into()})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_timestamp;
    use std::collections::BTreeMap;

    #[test]
    fn test_kind_name_round_trip() {
        for kind in AnalysisKind::ALL {
            assert_eq!(AnalysisKind::from_name(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert_eq!(AnalysisKind::from_name("unknown_x"), None);
        assert_eq!(AnalysisKind::from_name(""), None);
    }

    #[test]
    fn test_catalog_is_complete() {
        assert_eq!(AnalysisKind::ALL.len(), 25);
    }

    #[test]
    fn test_every_kind_handles_empty_data() {
        let catalog = Catalog::new(AnalyticsConfig::default());
        let now = parse_timestamp("2025-02-10 12:00:00").unwrap();
        // Health alerts need their thresholds mapping; everything else
        // runs with no parameters at all.
        let params = Params {
            thresholds: Some(BTreeMap::new()),
            ..Params::default()
        };

        for data in [
            SensorData::Flat(BTreeMap::new()),
            SensorData::Nested(BTreeMap::new()),
        ] {
            for kind in AnalysisKind::ALL {
                let result = catalog.run(kind, &data, &params, now);
                assert!(result.is_ok(), "{} failed on empty {} data", kind, data);
            }
        }
    }
}
