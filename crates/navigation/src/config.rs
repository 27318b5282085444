use std::{env, str::FromStr, time::Duration};

use model::{Coordinate, ModelError, Profile};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

/// Default walking destination, `[longitude, latitude]`.
pub const DEFAULT_DESTINATION: [f64; 2] = [4.33624, 6.57901];

/// What `start()` does when no location update has arrived yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingLocationPolicy {
    /// Stay idle and tell the user.
    #[default]
    Reject,
    /// Enter the requesting state and send the request with the first
    /// position that arrives.
    Defer,
    /// Use a fixed start position instead.
    Fallback(Coordinate),
}

/// Parses `reject`, `defer` or `fallback:<lon>,<lat>`.
impl FromStr for MissingLocationPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "reject" => return Ok(Self::Reject),
            "defer" => return Ok(Self::Defer),
            _ => {}
        }
        match s.split_once(':') {
            Some((policy, origin)) if policy.eq_ignore_ascii_case("fallback") => {
                Ok(Self::Fallback(origin.parse()?))
            }
            _ => Err(ModelError::Parse(format!(
                "unknown missing location policy '{s}'"
            ))),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationConfig {
    pub destination: Coordinate,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub missing_location: MissingLocationPolicy,
    /// Route requests taking longer than this fail. Unbounded when absent.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub fetch_timeout: Option<Duration>,
}

impl NavigationConfig {
    pub fn new(destination: Coordinate) -> Self {
        Self {
            destination,
            profile: Profile::Walking,
            missing_location: MissingLocationPolicy::Reject,
            fetch_timeout: None,
        }
    }

    /// Reads `NAV_DESTINATION`, `NAV_PROFILE`, `NAV_MISSING_LOCATION` and
    /// `NAV_FETCH_TIMEOUT_SECS`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ModelError> {
        let destination = match env::var("NAV_DESTINATION") {
            Ok(value) => value.parse()?,
            Err(_) => Coordinate::try_from(DEFAULT_DESTINATION)?,
        };
        let mut config = Self::new(destination);
        if let Ok(value) = env::var("NAV_PROFILE") {
            config.profile = value.parse()?;
        }
        if let Ok(value) = env::var("NAV_MISSING_LOCATION") {
            config.missing_location = value.parse()?;
        }
        if let Ok(value) = env::var("NAV_FETCH_TIMEOUT_SECS") {
            let seconds: u64 = value
                .trim()
                .parse()
                .map_err(|_| ModelError::Parse(format!("invalid timeout '{value}'")))?;
            config.fetch_timeout = Some(Duration::from_secs(seconds));
        }
        Ok(config)
    }
}
