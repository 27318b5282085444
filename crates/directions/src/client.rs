use std::env;

use async_trait::async_trait;
use model::{Profile, Route, WaypointPair};
use serde::{Deserialize, Serialize};

use crate::{response::DirectionsResponse, ApiError, DirectionsService};

pub const MAPBOX_API_URL: &str = "https://api.mapbox.com";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionsCredentials {
    pub access_token: String,
    /// Defaults to [`MAPBOX_API_URL`].
    pub base_url: Option<String>,
    /// Route all requests through this proxy. Without one, requests go out
    /// directly and proxy environment variables are ignored.
    pub proxy: Option<String>,
}

impl DirectionsCredentials {
    pub fn new<S: Into<String>>(access_token: S) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: None,
            proxy: None,
        }
    }

    pub fn from_env() -> Option<Self> {
        let access_token = env::var("MAPBOX_ACCESS_TOKEN").ok()?;
        Some(Self {
            access_token,
            base_url: env::var("MAPBOX_DIRECTIONS_URL").ok(),
            proxy: env::var("DIRECTIONS_PROXY").ok(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(MAPBOX_API_URL)
            .trim_end_matches('/')
    }
}

/// Client for the Mapbox Directions API (v5).
pub struct MapboxDirectionsClient {
    pub credentials: DirectionsCredentials,
    http: reqwest::Client,
}

impl MapboxDirectionsClient {
    pub fn new(credentials: &DirectionsCredentials) -> Result<Self, ApiError> {
        /* build the http client with optional proxy */
        let builder = match &credentials.proxy {
            Some(proxy_url) => reqwest::Client::builder().proxy(reqwest::Proxy::all(proxy_url)?),
            None => reqwest::Client::builder().no_proxy(),
        };
        Ok(Self {
            credentials: credentials.clone(),
            http: builder.build()?,
        })
    }

    /// Request url without query parameters, so it is safe to log.
    pub fn endpoint(&self, waypoints: &WaypointPair, profile: Profile) -> String {
        format!(
            "{}/directions/v5/mapbox/{}/{};{}",
            self.credentials.base_url(),
            profile,
            waypoints.origin,
            waypoints.destination
        )
    }

    pub async fn get_directions(
        &self,
        waypoints: &WaypointPair,
        profile: Profile,
    ) -> Result<DirectionsResponse, ApiError> {
        let url = self.endpoint(waypoints, profile);
        match &self.credentials.proxy {
            Some(proxy_url) => log::debug!("Requesting '{url}' using proxy '{proxy_url}'."),
            None => log::debug!("Requesting '{url}'."),
        }

        /* perform get-request */
        let response = self
            .http
            .get(&url)
            .query(&[
                ("geometries", "geojson"),
                ("overview", "full"),
                ("access_token", self.credentials.access_token.as_str()),
            ])
            .send()
            .await?;

        /* parse response */
        match response.status() {
            reqwest::StatusCode::OK => Ok(serde_json::from_str(&response.text().await?)?),
            other => match response.text().await {
                Ok(val) => Err(ApiError::InvalidResponse {
                    status_code: other,
                    url,
                    response: Some(val),
                }),
                Err(_) => Err(ApiError::InvalidResponse {
                    status_code: other,
                    url,
                    response: None,
                }),
            },
        }
    }
}

#[async_trait]
impl DirectionsService for MapboxDirectionsClient {
    async fn fetch_routes(
        &self,
        waypoints: WaypointPair,
        profile: Profile,
    ) -> Result<Vec<Route>, ApiError> {
        self.get_directions(&waypoints, profile)
            .await?
            .into_routes()
    }
}
