use std::error;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use directions::ApiError;

pub mod config;
pub mod progress;
pub mod session;
pub mod state;
pub mod view;

pub use config::{MissingLocationPolicy, NavigationConfig};
pub use session::NavigationSession;
pub use state::{Resolution, RouteRequest, SessionCore, SessionState, StartOutcome};
pub use view::SessionView;

/// Session generation. Bumped whenever a session starts or stops, so results
/// of older route requests can be recognised.
pub type Generation = u64;

#[derive(Debug, Clone)]
pub enum RouteUnavailableReason {
    EmptyRouteList,
    Service(ApiError),
    TimedOut(Duration),
    /// The request task was dropped before it finished, e.g. because its
    /// runtime shut down.
    Cancelled,
}

impl fmt::Display for RouteUnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EmptyRouteList => write!(f, "the directions service returned no route"),
            Self::Service(e) => write!(f, "{e}"),
            Self::TimedOut(limit) => {
                write!(f, "no answer from the directions service within {:?}", limit)
            }
            Self::Cancelled => write!(f, "the route request was cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NavigationError {
    RouteUnavailable(RouteUnavailableReason),
    StaleResult {
        issued: Generation,
        current: Generation,
    },
    LocationUnavailable,
}

impl NavigationError {
    /// Whether the presentation layer should tell the user about it.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResult { .. })
    }
}

impl error::Error for NavigationError {}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RouteUnavailable(reason) => write!(f, "Route unavailable: {reason}"),
            Self::StaleResult { issued, current } => write!(
                f,
                "Stale route result (issued in generation {issued}, now {current})"
            ),
            Self::LocationUnavailable => write!(f, "Current location is not known yet"),
        }
    }
}

impl From<ApiError> for NavigationError {
    fn from(e: ApiError) -> Self {
        Self::RouteUnavailable(RouteUnavailableReason::Service(e))
    }
}

/// A user-visible failure, as handed to the presentation layer.
#[derive(Debug, Clone)]
pub struct Notice {
    pub generation: Generation,
    pub error: NavigationError,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn new(generation: Generation, error: NavigationError) -> Self {
        Self {
            generation,
            error,
            at: Local::now(),
        }
    }
}
