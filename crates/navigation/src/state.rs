use std::sync::Arc;

use model::{Coordinate, Route, WaypointPair};
use schemars::JsonSchema;
use serde::Serialize;

use crate::{
    config::MissingLocationPolicy, progress::RouteProgress, view::SessionView, Generation,
    NavigationError, RouteUnavailableReason,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Idle,
    RequestingRoute,
    Active,
}

/// A route request that has to be sent on behalf of `generation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub generation: Generation,
    pub waypoints: WaypointPair,
}

#[derive(Debug)]
pub enum StartOutcome<R = RouteRequest> {
    /// A new session began and its route has to be requested.
    Requested(R),
    /// A new session began, the request waits for the first position.
    Deferred { generation: Generation },
    /// Already requesting or navigating. Nothing happened.
    AlreadyNavigating,
    /// Nothing happened, the user should be told why.
    Rejected(NavigationError),
}

impl<R> StartOutcome<R> {
    pub fn map<T, F: FnOnce(R) -> T>(self, f: F) -> StartOutcome<T> {
        match self {
            Self::Requested(request) => StartOutcome::Requested(f(request)),
            Self::Deferred { generation } => StartOutcome::Deferred { generation },
            Self::AlreadyNavigating => StartOutcome::AlreadyNavigating,
            Self::Rejected(error) => StartOutcome::Rejected(error),
        }
    }
}

/// What became of a finished route request.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The route was stored and the session is active.
    Applied,
    /// The session went back to idle.
    Failed(NavigationError),
    /// The request belonged to an earlier session. Nothing changed.
    Stale(NavigationError),
}

/// The session state machine. Performs no I/O; every method is one atomic
/// transition when called under the session lock.
#[derive(Debug, Clone)]
pub struct SessionCore {
    state: SessionState,
    generation: Generation,
    route: Option<Arc<Route>>,
    position: Option<Coordinate>,
    origin: Option<Coordinate>,
    destination: Coordinate,
}

impl SessionCore {
    pub fn new(destination: Coordinate) -> Self {
        Self {
            state: SessionState::Idle,
            generation: 0,
            route: None,
            position: None,
            origin: None,
            destination,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn position(&self) -> Option<Coordinate> {
        self.position
    }

    pub fn start(&mut self, missing_location: MissingLocationPolicy) -> StartOutcome {
        if self.state != SessionState::Idle {
            return StartOutcome::AlreadyNavigating;
        }

        let origin = match (self.position, missing_location) {
            (Some(position), _) => Some(position),
            (None, MissingLocationPolicy::Fallback(origin)) => Some(origin),
            (None, MissingLocationPolicy::Defer) => None,
            (None, MissingLocationPolicy::Reject) => {
                return StartOutcome::Rejected(NavigationError::LocationUnavailable)
            }
        };

        self.generation += 1;
        self.state = SessionState::RequestingRoute;
        self.origin = origin;

        match origin {
            Some(origin) => StartOutcome::Requested(self.request_from(origin)),
            None => StartOutcome::Deferred {
                generation: self.generation,
            },
        }
    }

    /// Returns whether anything changed.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }
        self.generation += 1;
        self.reset();
        true
    }

    /// Records the latest position. Hands back the request of a deferred
    /// start, which this position is the origin of.
    pub fn update_position(&mut self, position: Coordinate) -> Option<RouteRequest> {
        self.position = Some(position);

        if self.state == SessionState::RequestingRoute && self.origin.is_none() {
            self.origin = Some(position);
            return Some(self.request_from(position));
        }
        None
    }

    /// Applies the outcome of the request sent for `generation`. The first
    /// candidate route wins.
    pub fn resolve(
        &mut self,
        generation: Generation,
        result: Result<Vec<Route>, RouteUnavailableReason>,
    ) -> Resolution {
        if generation != self.generation || self.state != SessionState::RequestingRoute {
            return Resolution::Stale(NavigationError::StaleResult {
                issued: generation,
                current: self.generation,
            });
        }

        let route = result.and_then(|routes| {
            routes
                .into_iter()
                .next()
                .ok_or(RouteUnavailableReason::EmptyRouteList)
        });
        match route {
            Ok(route) => {
                self.route = Some(Arc::new(route));
                self.state = SessionState::Active;
                Resolution::Applied
            }
            Err(reason) => {
                self.reset();
                Resolution::Failed(NavigationError::RouteUnavailable(reason))
            }
        }
    }

    pub fn view(&self) -> SessionView {
        let progress = match (&self.route, self.position) {
            (Some(route), Some(position)) => RouteProgress::locate(route, position),
            _ => None,
        };
        SessionView {
            state: self.state,
            generation: self.generation,
            route: self.route.clone(),
            position: self.position,
            origin: self.origin,
            destination: self.destination,
            progress,
        }
    }

    fn request_from(&self, origin: Coordinate) -> RouteRequest {
        RouteRequest {
            generation: self.generation,
            waypoints: WaypointPair::new(origin, self.destination),
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.route = None;
        self.origin = None;
    }
}
