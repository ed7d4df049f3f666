use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::{Pipeline, PropertyJob};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use maps::Coordinates;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "AI Property Visualizer";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/process-property", post(process_property))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(Arc::new(state))
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
}

/// Body of `POST /process-property`.
///
/// Fields are kept loosely typed so a wrongly typed coordinate still
/// reports the property id it came with.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub lat: Option<Value>,
    #[serde(default)]
    pub lng: Option<Value>,
    #[serde(default)]
    pub address: Option<Value>,
}

fn property_id_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

enum Coordinate {
    Missing,
    Invalid,
    Value(f64),
}

fn coordinate(value: Option<Value>) -> Coordinate {
    match value {
        None | Some(Value::Null) => Coordinate::Missing,
        Some(Value::Number(n)) => n.as_f64().map_or(Coordinate::Invalid, Coordinate::Value),
        Some(Value::String(s)) => s.trim().parse().map_or(Coordinate::Invalid, Coordinate::Value),
        Some(_) => Coordinate::Invalid,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Property ID is required")]
    MissingId,

    #[error("Latitude and longitude are required")]
    MissingCoordinates(String),

    #[error("Invalid coordinates")]
    InvalidCoordinates(String),
}

impl RequestError {
    pub fn property_id(&self) -> Option<&str> {
        match self {
            RequestError::MissingId => None,
            RequestError::MissingCoordinates(id) | RequestError::InvalidCoordinates(id) => Some(id),
        }
    }
}

impl ProcessRequest {
    pub fn into_job(self) -> Result<PropertyJob, RequestError> {
        let property_id = property_id_text(self.id);
        if property_id.is_empty() {
            return Err(RequestError::MissingId);
        }

        let center = match (coordinate(self.lat), coordinate(self.lng)) {
            (Coordinate::Value(lat), Coordinate::Value(lng)) => Coordinates::new(lat, lng),
            (Coordinate::Missing, _) | (_, Coordinate::Missing) => {
                return Err(RequestError::MissingCoordinates(property_id));
            }
            _ => return Err(RequestError::InvalidCoordinates(property_id)),
        };
        if !center.is_valid() {
            return Err(RequestError::InvalidCoordinates(property_id));
        }

        Ok(PropertyJob {
            property_id,
            center,
            address: self.address.and_then(|a| a.as_str().map(str::to_string)),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
}

/// Response envelope of `POST /process-property`
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProcessResult {
    pub fn ok(property_id: String, enhanced_image_url: String) -> Self {
        Self {
            status: ResultStatus::Ok,
            property_id: Some(property_id),
            enhanced_image_url: Some(enhanced_image_url),
            message: None,
        }
    }

    pub fn error(property_id: Option<String>, message: String) -> Self {
        Self {
            status: ResultStatus::Error,
            property_id,
            enhanced_image_url: None,
            message: Some(message),
        }
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn process_property(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<ProcessResult>) {
    // An empty body is treated like `{}`
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(ProcessRequest::default())
    } else {
        serde_json::from_slice::<ProcessRequest>(&body)
    };

    let request = match request {
        Ok(request) => request,
        Err(e) => {
            state.metrics.record_rejected();
            return (
                StatusCode::BAD_REQUEST,
                Json(ProcessResult::error(None, format!("Invalid request body: {}", e))),
            );
        }
    };

    let job = match request.into_job() {
        Ok(job) => job,
        Err(rejection) => {
            state.metrics.record_rejected();
            info!(reason = %rejection, "Rejected process request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ProcessResult::error(
                    rejection.property_id().map(str::to_string),
                    rejection.to_string(),
                )),
            );
        }
    };

    let span = info_span!(
        "process_property",
        request_id = %Uuid::new_v4(),
        property_id = %job.property_id,
    );

    let outcome = state.pipeline.process(&job).instrument(span.clone()).await;
    state.metrics.record_request(outcome.is_ok());

    match outcome {
        Ok(enhanced_image_url) => {
            span.in_scope(|| info!(%enhanced_image_url, "Property image replaced"));
            (
                StatusCode::OK,
                Json(ProcessResult::ok(job.property_id, enhanced_image_url)),
            )
        }
        Err(e) => {
            span.in_scope(|| error!(stage = ?e.stage(), error = %e, "Property processing failed"));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ProcessResult::error(Some(job.property_id), e.to_string())),
            )
        }
    }
}

async fn get_stats(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
