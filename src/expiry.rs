use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;

use crate::error::DropError;

/// longest expiry a client can ask for, in days
pub const MAX_EXPIRY_DAYS: u32 = 36_500;

/// deferred expiry instruction carried by an upload until it becomes a share
///
/// `Default` is resolved against the server's default expiry at the moment the
/// share is created, not when the upload started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    #[default]
    Default,
    Never,
    Days(u32),
}

impl ExpiryPolicy {
    /// parse the optional `expires_in` value sent by clients
    pub fn parse_opt(value: Option<&str>) -> Result<Self, DropError> {
        match value {
            Some(v) => v.parse(),
            None => Ok(ExpiryPolicy::Default),
        }
    }

    /// turn the policy into a concrete timestamp (None = permanent)
    ///
    /// Day counts are capped at [`MAX_EXPIRY_DAYS`]; a timestamp chrono can't
    /// represent resolves to None.
    pub fn resolve(&self, now: DateTime<Utc>, default: Option<Duration>) -> Option<DateTime<Utc>> {
        match self {
            ExpiryPolicy::Default => default.and_then(|d| now.checked_add_signed(d)),
            ExpiryPolicy::Never => None,
            ExpiryPolicy::Days(days) => Duration::try_days(i64::from((*days).min(MAX_EXPIRY_DAYS)))
                .and_then(|d| now.checked_add_signed(d)),
        }
    }
}

impl FromStr for ExpiryPolicy {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" | "default" => Ok(ExpiryPolicy::Default),
            "never" => Ok(ExpiryPolicy::Never),
            other => other
                .strip_suffix('d')
                .unwrap_or(other)
                .parse::<u32>()
                .ok()
                .filter(|days| (1..=MAX_EXPIRY_DAYS).contains(days))
                .map(ExpiryPolicy::Days)
                .ok_or_else(|| DropError::Validation(format!("invalid expires_in: {other}"))),
        }
    }
}

impl fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryPolicy::Default => write!(f, "default"),
            ExpiryPolicy::Never => write!(f, "never"),
            ExpiryPolicy::Days(days) => write!(f, "{days}d"),
        }
    }
}
