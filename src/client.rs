//! # EarthOS Engine Client
//!
//! This module handles all network operations against the EarthOS engine.
//!
//! ## Endpoints
//!
//! | method | path | returns |
//! |---|---|---|
//! | GET | `version/` | engine build info (JSON) |
//! | GET | `variables/` | variable sets, flattened into a metadata cache |
//! | GET | `point/` | one sample ([`PointResponse`]) |
//! | POST | `points/` | batch of samples (JSON) |
//! | GET | `map/{x}/{y}/{z}/` | slippy tile as pfpng |
//! | GET | `map/` | arbitrary bounding box as pfpng |
//!
//! Every request carries `Authorization: Bearer <api key>`.
//!
//! ## Error Handling
//!
//! Anything but `200 OK` becomes an [`ApiError`] carrying the status, a human
//! message and the raw body. Nothing is retried: errors surface to the caller
//! as-is through [`ClientError`].
//!
//! ## Variable Metadata
//!
//! `variables/` is fetched once and cached on the client. The cache belongs to
//! this `EarthOs` value only; [`EarthOs::invalidate_variables`] drops it and
//! [`EarthOs::refresh_variables`] refetches.

use crate::config::EngineConfig;
use crate::formula::{FormulaError, Var, VariableInfo};
use crate::raster::{DecodeError, Raster};
use crate::tile::{tile_to_region, TileError};
use crate::timestamp::{Timestamp, TimestampError};
use crate::Region;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Category of a failed engine response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    NoData,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    ServerError,
    Unknown,
}

impl ApiErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            204 => ApiErrorKind::NoData,
            400 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            500 => ApiErrorKind::ServerError,
            _ => ApiErrorKind::Unknown,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ApiErrorKind::NoData => "No data available for this region and time.",
            ApiErrorKind::BadRequest => "Bad request",
            ApiErrorKind::Unauthorized => "Unauthorized. Is your API key correct?",
            ApiErrorKind::Forbidden => "Forbidden. Are you allowed to access this resource?",
            ApiErrorKind::NotFound => "Not found.",
            ApiErrorKind::ServerError => "Internal server error.",
            ApiErrorKind::Unknown => "Unknown error.",
        }
    }
}

/// Non-200 engine response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} ({status}): {body}", .kind.message())]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: u16,
    pub body: String,
}

impl ApiError {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::from_status(status),
            status,
            body: body.into(),
        }
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }
}

/// Errors that can occur while talking to the engine.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API key is required: set it in the config or the EARTHOS_APIKEY environment variable")]
    MissingApiKey,

    #[error("engine host is required: set it in the config or the EARTHOS_ENGINE_HOST environment variable")]
    MissingHost,

    /// Transport failure (connect, TLS, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Timestamp(#[from] TimestampError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Formula(#[from] FormulaError),
}

/// Where and when the engine actually sampled a point.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Spacetime {
    pub time: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// Per-point evaluation status reported inside a 200 response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointStatus {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

impl PointStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self.kind.as_deref(), None | Some("NoError"))
    }
}

/// Response of `point/`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointResponse {
    pub result: Option<f64>,
    #[serde(default)]
    pub spacetime: Spacetime,
    #[serde(default)]
    pub error: PointStatus,
    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Values shared by every point of a batch unless a point overrides them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointDefaults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// One point of a `points/` batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointQuery {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

/// Body of a `points/` request.
///
/// # Example
/// ```
/// use earthos::client::PointsQuery;
///
/// let query = PointsQuery::default()
///     .formula("gfs.air_temperature")
///     .timestamp(1679933282)
///     .unwrap()
///     .altitude(2.0)
///     .point("1", 66.0, 23.0)
///     .point("2", 67.0, 22.0);
///
/// assert_eq!(query.points.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointsQuery {
    pub defaults: PointDefaults,
    pub points: Vec<PointQuery>,
}

impl PointsQuery {
    pub fn formula(mut self, formula: impl fmt::Display) -> Self {
        self.defaults.formula = Some(formula.to_string());
        self
    }

    pub fn timestamp(mut self, timestamp: impl Into<Timestamp>) -> Result<Self, TimestampError> {
        self.defaults.timestamp = Some(timestamp.into().normalize()?);
        Ok(self)
    }

    pub fn altitude(mut self, altitude: f64) -> Self {
        self.defaults.altitude = Some(altitude);
        self
    }

    /// Add a point that inherits everything but its position from the defaults.
    pub fn point(mut self, id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        self.points.push(PointQuery {
            id: id.into(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..PointQuery::default()
        });
        self
    }

    pub fn push(&mut self, point: PointQuery) {
        self.points.push(point);
    }
}

#[derive(Deserialize)]
struct VariableSet {
    #[serde(default)]
    variables: Vec<VariableInfo>,
}

/// Authenticated handle on one engine.
pub struct EarthOs {
    http: reqwest::Client,
    host: String,
    api_key: String,
    variables: Option<HashMap<String, VariableInfo>>,
}

impl EarthOs {
    /// Build a client with a default HTTP stack and the configured timeout.
    pub fn new(config: EngineConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_http_client(config, http)
    }

    /// Build a client on a caller-provided `reqwest::Client` (proxies, TLS roots...).
    pub fn with_http_client(config: EngineConfig, http: reqwest::Client) -> Result<Self, ClientError> {
        let api_key = config
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ClientError::MissingApiKey)?;
        let host = config.host.trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(ClientError::MissingHost);
        }

        Ok(Self {
            http,
            host,
            api_key,
            variables: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.host, path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query)
            .send()
            .await?;
        check_status(response).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, ClientError> {
        tracing::debug!(path, "POST");
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    /// Engine build/version information.
    pub async fn engine_version(&self) -> Result<serde_json::Value, ClientError> {
        Ok(self.get("version/", &[]).await?.json().await?)
    }

    /// All variables keyed by `namespace.name`, fetched on first use.
    pub async fn variables(&mut self) -> Result<&HashMap<String, VariableInfo>, ClientError> {
        if self.variables.is_none() {
            let sets: Vec<VariableSet> = self.get("variables/", &[]).await?.json().await?;
            let cache: HashMap<String, VariableInfo> = sets
                .into_iter()
                .flat_map(|set| set.variables)
                .map(|var| (format!("{}.{}", var.namespace, var.name), var))
                .collect();
            tracing::info!(count = cache.len(), "cached variable metadata");
            self.variables = Some(cache);
        }
        Ok(self.variables.get_or_insert_with(HashMap::new))
    }

    /// Drop cached variable metadata; the next lookup refetches.
    pub fn invalidate_variables(&mut self) {
        self.variables = None;
    }

    /// Refetch variable metadata now.
    pub async fn refresh_variables(&mut self) -> Result<&HashMap<String, VariableInfo>, ClientError> {
        self.invalidate_variables();
        self.variables().await
    }

    /// Reference to `namespace.name` carrying its metadata when the engine knows it.
    pub async fn variable(&mut self, qualified: &str) -> Result<Var, ClientError> {
        let var = Var::parse(qualified)?;
        let info = self.variables().await?.get(qualified).cloned();
        if info.is_none() {
            tracing::warn!(variable = qualified, "variable not listed by the engine");
        }
        Ok(var.with_info(info))
    }

    /// Evaluate `formula` at one point.
    pub async fn point(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        time: impl Into<Timestamp>,
        formula: impl fmt::Display,
    ) -> Result<PointResponse, ClientError> {
        let query = [
            ("time", time.into().normalize()?.to_string()),
            ("formula", formula.to_string()),
            ("format", "json".to_string()),
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            ("altitude", altitude.to_string()),
        ];
        Ok(self.get("point/", &query).await?.json().await?)
    }

    /// Evaluate a batch of points in one request.
    pub async fn points(&self, query: &PointsQuery) -> Result<serde_json::Value, ClientError> {
        Ok(self.post("points/", query).await?.json().await?)
    }

    /// Fetch and decode slippy tile `(x, y, z)`.
    pub async fn tile(
        &self,
        x: u32,
        y: u32,
        z: u8,
        timestamp: impl Into<Timestamp>,
        formula: impl fmt::Display,
    ) -> Result<Raster, ClientError> {
        let region = tile_to_region(x, y, z)?;
        let query = [
            ("timestamp", timestamp.into().normalize()?.to_string()),
            ("formula", formula.to_string()),
            ("format", "pfpng".to_string()),
        ];

        let path = format!("map/{}/{}/{}/", x, y, z);
        let bytes = self.get(&path, &query).await?.bytes().await?;
        Ok(Raster::from_pfpng(&bytes, region)?)
    }

    /// Fetch and decode an arbitrary bounding box at `width × height` pixels.
    pub async fn region(
        &self,
        region: Region,
        timestamp: impl Into<Timestamp>,
        formula: impl fmt::Display,
        width: u32,
        height: u32,
    ) -> Result<Raster, ClientError> {
        let mut query = vec![
            ("timestamp", timestamp.into().normalize()?.to_string()),
            ("formula", formula.to_string()),
            ("format", "pfpng".to_string()),
            ("width", width.to_string()),
            ("height", height.to_string()),
        ];
        query.extend(region.query_pairs());

        let bytes = self.get("map/", &query).await?.bytes().await?;
        Ok(Raster::from_pfpng(&bytes, region)?)
    }
}

/// Turn any non-200 response into an [`ApiError`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let error = ApiError::new(status.as_u16(), body);
    tracing::warn!(status = error.status, "{}", error.message());
    Err(error.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (204, ApiErrorKind::NoData),
            (400, ApiErrorKind::BadRequest),
            (401, ApiErrorKind::Unauthorized),
            (403, ApiErrorKind::Forbidden),
            (404, ApiErrorKind::NotFound),
            (500, ApiErrorKind::ServerError),
            (418, ApiErrorKind::Unknown),
            (503, ApiErrorKind::Unknown),
        ];
        for (status, kind) in cases {
            assert_eq!(ApiErrorKind::from_status(status), kind, "status {status}");
        }
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(401, "token expired");
        assert_eq!(
            err.to_string(),
            "Unauthorized. Is your API key correct? (401): token expired"
        );
        assert_eq!(err.message(), "Unauthorized. Is your API key correct?");
    }

    #[test]
    fn test_missing_api_key() {
        let config = EngineConfig::default();
        assert!(matches!(EarthOs::new(config), Err(ClientError::MissingApiKey)));

        let config = EngineConfig {
            api_key: Some(" ".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(EarthOs::new(config), Err(ClientError::MissingApiKey)));
    }

    #[test]
    fn test_missing_host() {
        let config = EngineConfig {
            host: "/".to_string(),
            api_key: Some("key".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(EarthOs::new(config), Err(ClientError::MissingHost)));
    }

    #[test]
    fn test_point_response_parsing() {
        let json = r#"{
            "result": 84.7,
            "spacetime": {"time": 1719246600, "latitude": 64.149141, "longitude": -21.940747},
            "error": {"type": "NoError"},
            "unit": "%"
        }"#;
        let point: PointResponse = serde_json::from_str(json).unwrap();
        assert_eq!(point.result, Some(84.7));
        assert_eq!(point.spacetime.time, Some(1719246600.0));
        assert!(point.error.is_ok());
        assert_eq!(point.extra["unit"], "%");
    }

    #[test]
    fn test_points_query_serialization() {
        let query = PointsQuery::default()
            .formula("gfs.air_temperature")
            .timestamp(1679933282)
            .unwrap()
            .altitude(2.0)
            .point("1", 66.0, 23.0);

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "defaults": {"formula": "gfs.air_temperature", "timestamp": 1679933282, "altitude": 2.0},
                "points": [{"id": "1", "latitude": 66.0, "longitude": 23.0}]
            })
        );
    }
}
