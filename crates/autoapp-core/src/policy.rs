use std::fmt;
use std::time::Duration;

use crate::AppError;

/// How often an application is re-checked for new versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdatePolicy {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl UpdatePolicy {
    pub const ALL: [UpdatePolicy; 4] = [Self::Hourly, Self::Daily, Self::Weekly, Self::Monthly];

    pub const DEFAULT: UpdatePolicy = Self::Hourly;

    pub fn seconds(self) -> u64 {
        match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
            Self::Weekly => 604_800,
            Self::Monthly => 2_592_000,
        }
    }

    pub fn interval(self) -> Duration {
        Duration::from_secs(self.seconds())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }

    /// Cron cadence. `?` stands for a minute picked when the entry is added.
    pub fn cadence(self) -> &'static str {
        match self {
            Self::Hourly => "? * * * *",
            Self::Daily => "? 3 * * *",
            Self::Weekly => "? 3 * * 0",
            Self::Monthly => "? 3 1 * *",
        }
    }

    pub fn parse(name: &str) -> Result<Self, AppError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(AppError::InvalidSpec {
                spec: other.to_string(),
                reason: "update frequency must be one of hourly, daily, weekly, monthly"
                    .to_string(),
            }),
        }
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
