use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Travel mode a route is computed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    #[default]
    Walking,
    Cycling,
    Driving,
    DrivingTraffic,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walking => "walking",
            Self::Cycling => "cycling",
            Self::Driving => "driving",
            Self::DrivingTraffic => "driving-traffic",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "walking" => Ok(Self::Walking),
            "cycling" => Ok(Self::Cycling),
            "driving" => Ok(Self::Driving),
            "driving-traffic" => Ok(Self::DrivingTraffic),
            other => Err(ModelError::Parse(format!("unknown profile '{other}'"))),
        }
    }
}
