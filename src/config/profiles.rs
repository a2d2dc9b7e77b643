use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Training presets selectable from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingProfile {
    /// Few epochs; enough to check the pipeline end to end
    Quick,

    /// Long run for a corpus collected over several days
    Full,

    /// Epoch count taken from the config file as-is
    #[default]
    Custom,
}

impl TrainingProfile {
    pub fn name(&self) -> &str {
        match self {
            Self::Quick => "Quick",
            Self::Full => "Full",
            Self::Custom => "Custom",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Quick => "5 epochs, batch size up to 10. Smoke-test training.",
            Self::Full => "200 epochs, batch size up to 10. Use once the corpus has a few hundred rows.",
            Self::Custom => "User-defined epoch count.",
        }
    }

    /// Preset epoch count, `None` for `Custom`
    pub fn epochs(&self) -> Option<usize> {
        match self {
            Self::Quick => Some(5),
            Self::Full => Some(200),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for TrainingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TrainingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Self::Quick),
            "full" => Ok(Self::Full),
            "custom" => Ok(Self::Custom),
            other => Err(format!("Unknown training profile: {} (quick, full, custom)", other)),
        }
    }
}
