//! Account tiers for user submissions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    /// Queue priority for submissions from this tier. Higher is claimed first.
    #[must_use]
    pub fn priority(self) -> i32 {
        match self {
            Tier::Free => 0,
            Tier::Pro => 5,
            Tier::Enterprise => 10,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            _ => Err(CoreError::InvalidTier(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_tiers_get_higher_priority() {
        assert!(Tier::Enterprise.priority() > Tier::Pro.priority());
        assert!(Tier::Pro.priority() > Tier::Free.priority());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("PRO".parse::<Tier>().unwrap(), Tier::Pro);
        assert_eq!(" enterprise ".parse::<Tier>().unwrap(), Tier::Enterprise);
        assert!("platinum".parse::<Tier>().is_err());
    }
}
