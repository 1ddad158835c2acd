use std::{convert::TryFrom, str::FromStr, time::Duration};

use parse_display::Display;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyParseError {
    #[error("expected \"DISABLED\" or \"<N> <unit>\", got {0:?}")]
    InvalidFormat(String),
    #[error("invalid idle threshold {0:?}")]
    InvalidThreshold(String),
    #[error("unknown time unit {0:?}")]
    UnknownUnit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TimeUnit {
    #[display("seconds")]
    Seconds,
    #[display("minutes")]
    Minutes,
    #[display("hours")]
    Hours,
}

impl TimeUnit {
    fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 3600,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Seconds),
            "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            _ => Err(PolicyParseError::UnknownUnit(s.to_owned())),
        }
    }
}

/// Power-saving policy, written as `"DISABLED"` or `"<N> <unit>"`
///
/// The threshold is the time the screen content must stay static before the
/// strip is considered idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PowerSavingPolicy {
    #[display("DISABLED")]
    Disabled,
    #[display("{0} {1}")]
    After(u32, TimeUnit),
}

impl PowerSavingPolicy {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub fn threshold(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::After(count, unit) => Some(Duration::from_secs(
                u64::from(*count) * unit.seconds(),
            )),
        }
    }
}

impl Default for PowerSavingPolicy {
    fn default() -> Self {
        Self::Disabled
    }
}

impl FromStr for PowerSavingPolicy {
    type Err = PolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("disabled") {
            return Ok(Self::Disabled);
        }

        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(count), Some(unit), None) => {
                let count: u32 = count
                    .parse()
                    .map_err(|_| PolicyParseError::InvalidThreshold(count.to_owned()))?;

                if count == 0 {
                    return Err(PolicyParseError::InvalidThreshold(s.to_owned()));
                }

                Ok(Self::After(count, unit.parse()?))
            }
            _ => Err(PolicyParseError::InvalidFormat(s.to_owned())),
        }
    }
}

impl TryFrom<String> for PowerSavingPolicy {
    type Error = PolicyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PowerSavingPolicy> for String {
    fn from(policy: PowerSavingPolicy) -> Self {
        policy.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_policies() {
        assert_eq!(
            "DISABLED".parse::<PowerSavingPolicy>(),
            Ok(PowerSavingPolicy::Disabled)
        );
        assert_eq!(
            "5 minutes".parse::<PowerSavingPolicy>(),
            Ok(PowerSavingPolicy::After(5, TimeUnit::Minutes))
        );
        assert_eq!(
            "1 hour".parse::<PowerSavingPolicy>(),
            Ok(PowerSavingPolicy::After(1, TimeUnit::Hours))
        );
        assert_eq!(
            "30 Seconds"
                .parse::<PowerSavingPolicy>()
                .unwrap()
                .threshold(),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn reject_malformed_policies() {
        for input in &["", "5", "five minutes", "0 minutes", "5 fortnights", "5 minutes ago"] {
            assert!(
                input.parse::<PowerSavingPolicy>().is_err(),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn display_round_trips() {
        let policy = PowerSavingPolicy::After(15, TimeUnit::Minutes);
        assert_eq!(policy.to_string(), "15 minutes");
        assert_eq!(policy.to_string().parse::<PowerSavingPolicy>(), Ok(policy));
        assert_eq!(PowerSavingPolicy::Disabled.threshold(), None);
    }
}
