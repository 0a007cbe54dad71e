//! Request dispatch.
//!
//! A request is a JSON object carrying a required `analysis_type`
//! field, an optional `params` object with routine parameters, and
//! the sensor payload in every remaining top-level field. Validation
//! runs in a fixed order and short-circuits with a distinct message
//! per cause; a routine failure is intercepted here and converted
//! into a structured error instead of propagating.

use crate::analysis::{AnalysisError, AnalysisKind, Catalog};
use crate::models::{format_timestamp, Params};
use crate::normalize::{self, NormalizeError};
use chrono::NaiveDateTime;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{error, info};

/// Reserved request field naming the analysis to run.
const FIELD_ANALYSIS_TYPE: &str = "analysis_type";

/// Reserved request field carrying optional routine parameters.
const FIELD_PARAMS: &str = "params";

#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    /// The request body was not valid JSON.
    #[error("Invalid JSON")]
    InvalidBody,

    /// The request carried no `analysis_type` field.
    #[error("Missing required parameter: analysis_type")]
    MissingAnalysisType,

    /// The `params` object did not deserialize.
    #[error("Invalid params object: {0}")]
    InvalidParams(String),

    /// The request carried no sensor payload beside the reserved
    /// fields.
    #[error("No sensor data provided")]
    EmptyPayload,

    /// The `analysis_type` is not in the catalog.
    #[error("Unknown analysis type: {0}")]
    UnknownAnalysisType(String),

    /// The payload matched neither accepted sensor-data shape.
    #[error("Invalid sensor data format")]
    UnrecognizedShape,

    /// A routine failed; contained here, never a crash.
    #[error("Error running analysis {kind}: {source}")]
    Routine {
        kind: AnalysisKind,
        source: AnalysisError,
    },
}

impl DispatchError {
    /// True for request-level rejections (the 4xx class); false for
    /// routine failures (the 5xx class).
    pub fn is_validation(&self) -> bool {
        !matches!(self, DispatchError::Routine { .. })
    }

    /// Render the structured error body.
    pub fn to_body(&self) -> Value {
        json!({"error": self.to_string()})
    }
}

/// Parse raw request text and dispatch it.
pub fn handle_request(
    catalog: &Catalog,
    body: &str,
    now: NaiveDateTime,
) -> Result<Value, DispatchError> {
    let request: Value = serde_json::from_str(body).map_err(|e| {
        error!(error = %e, "Request body is not valid JSON");
        DispatchError::InvalidBody
    })?;
    dispatch(catalog, &request, now)
}

/// Validate a parsed request and run the selected analysis.
///
/// On success the routine output is wrapped as
/// `{analysis_type, timestamp, results}`, with the injected instant
/// serving as the call timestamp.
pub fn dispatch(
    catalog: &Catalog,
    request: &Value,
    now: NaiveDateTime,
) -> Result<Value, DispatchError> {
    let fields = request.as_object();

    let name = fields
        .and_then(|map| map.get(FIELD_ANALYSIS_TYPE))
        .and_then(Value::as_str)
        .ok_or(DispatchError::MissingAnalysisType)?;

    let params = match fields.and_then(|map| map.get(FIELD_PARAMS)) {
        Some(raw) => serde_json::from_value::<Params>(raw.clone())
            .map_err(|e| DispatchError::InvalidParams(e.to_string()))?,
        None => Params::default(),
    };

    let payload: Map<String, Value> = fields
        .map(|map| {
            map.iter()
                .filter(|(key, _)| key.as_str() != FIELD_ANALYSIS_TYPE && key.as_str() != FIELD_PARAMS)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    if payload.is_empty() {
        return Err(DispatchError::EmptyPayload);
    }

    let kind = AnalysisKind::from_name(name)
        .ok_or_else(|| DispatchError::UnknownAnalysisType(name.to_string()))?;

    let data = normalize::from_value(&Value::Object(payload)).map_err(|e| match e {
        NormalizeError::InvalidJson => DispatchError::InvalidBody,
        NormalizeError::UnrecognizedShape => DispatchError::UnrecognizedShape,
    })?;

    info!(analysis = %kind, payload = %data, "Running analysis");

    let results = catalog.run(kind, &data, &params, now).map_err(|source| {
        error!(analysis = %kind, error = %source, "Analysis routine failed");
        DispatchError::Routine { kind, source }
    })?;

    Ok(json!({
        "analysis_type": kind.as_str(),
        "timestamp": format_timestamp(now),
        "results": results,
    }))
}
