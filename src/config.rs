//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.buildpulse.toml` files. Every fixed threshold, acceptable range,
//! sensor-type key and index weight used by the analysis catalog
//! lives here; routines never hard-code them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis thresholds and sensor keys.
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path; empty means stdout.
    #[serde(default)]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Pretty-print JSON responses by default.
    #[serde(default)]
    pub pretty: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: String::new(),
            verbose: false,
            pretty: false,
        }
    }
}

/// Thresholds, windows and sensor keys for the analysis catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub variability: VariabilityConfig,

    #[serde(default)]
    pub trend: TrendConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub anomaly: AnomalyConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default)]
    pub comfort: ComfortConfig,

    #[serde(default)]
    pub aqi: AqiConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// Coefficient-of-variation classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariabilityConfig {
    /// CV above this flags high variability.
    #[serde(default = "default_cv_threshold")]
    pub cv_threshold: f64,

    /// Default target sensor for the air-flow variation routine.
    #[serde(default = "default_air_flow_sensor")]
    pub air_flow_sensor: String,
}

impl Default for VariabilityConfig {
    fn default() -> Self {
        Self {
            cv_threshold: default_cv_threshold(),
            air_flow_sensor: default_air_flow_sensor(),
        }
    }
}

fn default_cv_threshold() -> f64 {
    0.1
}

fn default_air_flow_sensor() -> String {
    "Air_Flow_Sensor".to_string()
}

/// Trend routines: rolling windows and classification deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Rolling window for the moving-average trend routine.
    #[serde(default = "default_trend_window")]
    pub window: usize,

    /// Moving-average delta below which the trend is stable.
    #[serde(default = "default_stable_delta")]
    pub stable_delta: f64,

    /// Rolling window for the failure-trend routine.
    #[serde(default = "default_failure_window")]
    pub failure_window: usize,

    /// Latest rolling std above this multiple of baseline flags a
    /// failure trend.
    #[serde(default = "default_failure_std_ratio")]
    pub failure_std_ratio: f64,

    /// Failure-trend lookback, in hours before the evaluation instant.
    #[serde(default = "default_failure_lookback_hours")]
    pub failure_lookback_hours: i64,

    /// Default target sensor for the air-quality trend routine.
    #[serde(default = "default_air_quality_sensor")]
    pub air_quality_sensor: String,

    /// Expected static-pressure range for the pressure trend routine.
    #[serde(default = "default_pressure_range")]
    pub pressure_range: (f64, f64),
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: default_trend_window(),
            stable_delta: default_stable_delta(),
            failure_window: default_failure_window(),
            failure_std_ratio: default_failure_std_ratio(),
            failure_lookback_hours: default_failure_lookback_hours(),
            air_quality_sensor: default_air_quality_sensor(),
            pressure_range: default_pressure_range(),
        }
    }
}

fn default_trend_window() -> usize {
    3
}

fn default_stable_delta() -> f64 {
    0.05
}

fn default_failure_window() -> usize {
    5
}

fn default_failure_std_ratio() -> f64 {
    1.5
}

fn default_failure_lookback_hours() -> i64 {
    24
}

fn default_air_quality_sensor() -> String {
    "Air_Quality_Sensor".to_string()
}

fn default_pressure_range() -> (f64, f64) {
    (0.5, 1.5)
}

/// Online/offline status and deviation flagging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// A sensor is offline when its latest report is older than this
    /// many minutes before the evaluation instant.
    #[serde(default = "default_offline_after_minutes")]
    pub offline_after_minutes: i64,

    /// Deviation flag: latest reading outside mean +/- sigma * std.
    #[serde(default = "default_deviation_sigma")]
    pub deviation_sigma: f64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            offline_after_minutes: default_offline_after_minutes(),
            deviation_sigma: default_deviation_sigma(),
        }
    }
}

fn default_offline_after_minutes() -> i64 {
    60
}

fn default_deviation_sigma() -> f64 {
    2.0
}

/// Anomaly-detection routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Default z-score threshold.
    #[serde(default = "default_zscore_threshold")]
    pub zscore_threshold: f64,

    /// Rolling window for potential-failure and downtime routines.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,

    /// HVAC anomaly lookback, in days before the evaluation instant.
    #[serde(default = "default_hvac_lookback_days")]
    pub hvac_lookback_days: i64,

    /// Default trailing window, in hours, for potential failures.
    #[serde(default = "default_failure_time_window_hours")]
    pub failure_time_window_hours: i64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: default_zscore_threshold(),
            rolling_window: default_rolling_window(),
            hvac_lookback_days: default_hvac_lookback_days(),
            failure_time_window_hours: default_failure_time_window_hours(),
        }
    }
}

fn default_zscore_threshold() -> f64 {
    3.0
}

fn default_rolling_window() -> usize {
    5
}

fn default_hvac_lookback_days() -> i64 {
    7
}

fn default_failure_time_window_hours() -> i64 {
    24
}

/// One particulate-matter sensor key with its alert threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmSensor {
    pub key: String,
    pub threshold: f64,
}

/// Sensor keys, thresholds and acceptable ranges for the aggregated
/// single-metric routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_noise_sensor")]
    pub noise_sensor: String,

    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,

    #[serde(default = "default_air_quality_sensor")]
    pub air_quality_sensor: String,

    /// (good_below, moderate_below) average air-quality bands.
    #[serde(default = "default_air_quality_thresholds")]
    pub air_quality_thresholds: (f64, f64),

    #[serde(default = "default_formaldehyde_sensor")]
    pub formaldehyde_sensor: String,

    #[serde(default = "default_formaldehyde_threshold")]
    pub formaldehyde_threshold: f64,

    #[serde(default = "default_co2_sensor")]
    pub co2_sensor: String,

    #[serde(default = "default_co2_threshold")]
    pub co2_threshold: f64,

    #[serde(default = "default_temperature_sensor")]
    pub temperature_sensor: String,

    #[serde(default = "default_temperature_range")]
    pub temperature_range: (f64, f64),

    #[serde(default = "default_humidity_sensor")]
    pub humidity_sensor: String,

    #[serde(default = "default_humidity_range")]
    pub humidity_range: (f64, f64),

    #[serde(default = "default_supply_sensor")]
    pub supply_sensor: String,

    #[serde(default = "default_return_sensor")]
    pub return_sensor: String,

    // Array-of-tables field kept last so the generated TOML stays
    // valid (values may not follow tables within a table).
    #[serde(default = "default_pm_sensors")]
    pub pm_sensors: Vec<PmSensor>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            noise_sensor: default_noise_sensor(),
            noise_threshold: default_noise_threshold(),
            air_quality_sensor: default_air_quality_sensor(),
            air_quality_thresholds: default_air_quality_thresholds(),
            formaldehyde_sensor: default_formaldehyde_sensor(),
            formaldehyde_threshold: default_formaldehyde_threshold(),
            co2_sensor: default_co2_sensor(),
            co2_threshold: default_co2_threshold(),
            pm_sensors: default_pm_sensors(),
            temperature_sensor: default_temperature_sensor(),
            temperature_range: default_temperature_range(),
            humidity_sensor: default_humidity_sensor(),
            humidity_range: default_humidity_range(),
            supply_sensor: default_supply_sensor(),
            return_sensor: default_return_sensor(),
        }
    }
}

fn default_noise_sensor() -> String {
    "Sound_Noise_Sensor_MEMS".to_string()
}

fn default_noise_threshold() -> f64 {
    90.0
}

fn default_air_quality_thresholds() -> (f64, f64) {
    (50.0, 100.0)
}

fn default_formaldehyde_sensor() -> String {
    "Formaldehyde_Level_Sensor".to_string()
}

fn default_formaldehyde_threshold() -> f64 {
    0.1
}

fn default_co2_sensor() -> String {
    "CO2_Level_Sensor".to_string()
}

fn default_co2_threshold() -> f64 {
    1000.0
}

fn default_pm_sensors() -> Vec<PmSensor> {
    vec![
        PmSensor {
            key: "PM1_Level_Sensor_Standard".to_string(),
            threshold: 50.0,
        },
        PmSensor {
            key: "PM2_5_Level_Sensor_Standard".to_string(),
            threshold: 30.0,
        },
        PmSensor {
            key: "PM10_Level_Sensor_Standard".to_string(),
            threshold: 50.0,
        },
    ]
}

fn default_temperature_sensor() -> String {
    "Air_Temperature_Sensor".to_string()
}

fn default_temperature_range() -> (f64, f64) {
    (18.0, 27.0)
}

fn default_humidity_sensor() -> String {
    "Zone_Air_Humidity_Sensor".to_string()
}

fn default_humidity_range() -> (f64, f64) {
    (30.0, 60.0)
}

fn default_supply_sensor() -> String {
    "Supply_Air_Temperature_Sensor".to_string()
}

fn default_return_sensor() -> String {
    "Return_Air_Temperature_Sensor".to_string()
}

/// Comfort-index weighting and bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComfortConfig {
    /// Weight applied to the temperature deviation from mid-range.
    #[serde(default = "default_temperature_weight")]
    pub temperature_weight: f64,

    /// Weight applied to the humidity deviation from mid-range.
    #[serde(default = "default_humidity_weight")]
    pub humidity_weight: f64,

    /// Index above this is "Comfortable".
    #[serde(default = "default_comfortable_above")]
    pub comfortable_above: f64,

    /// Index above this (but not comfortable) is "Less comfortable".
    #[serde(default = "default_tolerable_above")]
    pub tolerable_above: f64,
}

impl Default for ComfortConfig {
    fn default() -> Self {
        Self {
            temperature_weight: default_temperature_weight(),
            humidity_weight: default_humidity_weight(),
            comfortable_above: default_comfortable_above(),
            tolerable_above: default_tolerable_above(),
        }
    }
}

fn default_temperature_weight() -> f64 {
    2.0
}

fn default_humidity_weight() -> f64 {
    1.5
}

fn default_comfortable_above() -> f64 {
    70.0
}

fn default_tolerable_above() -> f64 {
    40.0
}

/// One pollutant component of the composite air-quality index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiComponent {
    pub sensor: String,
    pub threshold: f64,
    pub weight: f64,
}

/// Composite AQI: weighted latest/threshold components and bands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiConfig {
    /// Band boundaries: (good_below, moderate_below, sensitive_below).
    #[serde(default = "default_aqi_bands")]
    pub bands: (f64, f64, f64),

    /// Pollutant components; weights sum to 1.0.
    #[serde(default = "default_aqi_components")]
    pub components: Vec<AqiComponent>,
}

impl Default for AqiConfig {
    fn default() -> Self {
        Self {
            bands: default_aqi_bands(),
            components: default_aqi_components(),
        }
    }
}

fn default_aqi_components() -> Vec<AqiComponent> {
    vec![
        AqiComponent {
            sensor: "PM2.5_Level_Sensor_Standard".to_string(),
            threshold: 35.0,
            weight: 0.3,
        },
        AqiComponent {
            sensor: "PM10_Level_Sensor_Standard".to_string(),
            threshold: 50.0,
            weight: 0.2,
        },
        AqiComponent {
            sensor: "NO2_Level_Sensor".to_string(),
            threshold: 40.0,
            weight: 0.2,
        },
        AqiComponent {
            sensor: "CO_Level_Sensor".to_string(),
            threshold: 9.0,
            weight: 0.15,
        },
        AqiComponent {
            sensor: "CO2_Level_Sensor".to_string(),
            threshold: 1000.0,
            weight: 0.15,
        },
    ]
}

fn default_aqi_bands() -> (f64, f64, f64) {
    (0.5, 1.0, 1.5)
}

/// Resampling and correlation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Default bucket frequency code for aggregation.
    #[serde(default = "default_frequency")]
    pub default_frequency: String,

    /// Nearest-timestamp alignment tolerance for correlation.
    #[serde(default = "default_correlation_tolerance_secs")]
    pub correlation_tolerance_secs: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            default_frequency: default_frequency(),
            correlation_tolerance_secs: default_correlation_tolerance_secs(),
        }
    }
}

fn default_frequency() -> String {
    "H".to_string()
}

fn default_correlation_tolerance_secs() -> i64 {
    60
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".buildpulse.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.pretty {
            self.general.pretty = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.analytics.variability.cv_threshold, 0.1);
        assert_eq!(config.analytics.anomaly.zscore_threshold, 3.0);
        assert_eq!(config.analytics.environment.co2_threshold, 1000.0);
        assert_eq!(config.analytics.aggregation.default_frequency, "H");
    }

    #[test]
    fn test_aqi_weights_sum_to_one() {
        let config = AqiConfig::default();
        let total: f64 = config.components.iter().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true

[analytics.variability]
cv_threshold = 0.2

[analytics.environment]
co2_threshold = 800.0
temperature_range = [20.0, 25.0]
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.analytics.variability.cv_threshold, 0.2);
        assert_eq!(config.analytics.environment.co2_threshold, 800.0);
        assert_eq!(config.analytics.environment.temperature_range, (20.0, 25.0));
        // Untouched sections keep their defaults.
        assert_eq!(config.analytics.anomaly.rolling_window, 5);
    }

    #[test]
    fn test_default_toml_round_trip() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            reparsed.analytics.environment.pm_sensors.len(),
            Config::default().analytics.environment.pm_sensors.len()
        );
    }
}
