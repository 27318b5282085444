use std::error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use model::{ModelError, Profile, Route, WaypointPair};

pub mod client;
pub mod response;

/// Something that can compute routes between two coordinates.
///
/// Implementations return every candidate route the service offers, best
/// first. An empty list is a valid answer and means the service found nothing.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    async fn fetch_routes(
        &self,
        waypoints: WaypointPair,
        profile: Profile,
    ) -> Result<Vec<Route>, ApiError>;
}

#[derive(Debug, Clone)]
pub enum ApiError {
    RequestError(Arc<reqwest::Error>),
    JsonError(Arc<serde_json::Error>),
    InvalidResponse {
        status_code: reqwest::StatusCode,
        url: String,
        response: Option<String>,
    },
    NoRoute {
        code: String,
        message: Option<String>,
    },
    MalformedGeometry(ModelError),
    Other(String),
}

impl error::Error for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::RequestError(e) => write!(f, "HTTP request error: {}", e),
            ApiError::JsonError(e) => write!(f, "JSON parse error: {}", e),
            ApiError::InvalidResponse {
                status_code,
                url,
                response,
            } => match response {
                Some(text) => {
                    write!(f, "Invalid Response ({}) {}: {}", status_code, text, url)
                }
                None => write!(f, "Invalid Response({}) {}", status_code, url),
            },
            ApiError::NoRoute { code, message } => match message {
                Some(message) => write!(f, "No route ({}): {}", code, message),
                None => write!(f, "No route ({})", code),
            },
            ApiError::MalformedGeometry(e) => write!(f, "Malformed route geometry: {}", e),
            ApiError::Other(e) => write!(f, "{e}"),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::RequestError(Arc::new(e))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::JsonError(Arc::new(e))
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError::MalformedGeometry(e)
    }
}
