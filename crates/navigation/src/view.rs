use std::sync::Arc;

use model::{Coordinate, Route};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{progress::RouteProgress, state::SessionState, Generation};

/// Snapshot of a session after its most recent transition, everything the
/// presentation layer needs to draw the map.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub state: SessionState,
    pub generation: Generation,
    /// Present exactly when `state` is active.
    pub route: Option<Arc<Route>>,
    pub position: Option<Coordinate>,
    /// Start marker, present while a session is running.
    pub origin: Option<Coordinate>,
    pub destination: Coordinate,
    pub progress: Option<RouteProgress>,
}

impl SessionView {
    pub fn is_navigating(&self) -> bool {
        self.state != SessionState::Idle
    }

    /// Where to center the camera: the user if known, the start otherwise.
    pub fn camera_center(&self) -> Coordinate {
        self.position.or(self.origin).unwrap_or(self.destination)
    }
}
