//! Deciding whether the local parcels are stale.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Zone both timestamps are expressed in before comparing.
pub const CIVIL_TIME_ZONE: Tz = chrono_tz::America::Los_Angeles;

/// Remote and local "last modified" times, in [`CIVIL_TIME_ZONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateDecision {
    pub remote: DateTime<Tz>,
    /// `None` when the destination has no timestamped rows.
    pub local: Option<DateTime<Tz>>,
}

impl UpdateDecision {
    #[must_use]
    pub fn new(remote: DateTime<Utc>, local: Option<DateTime<Utc>>) -> Self {
        Self {
            remote: remote.with_timezone(&CIVIL_TIME_ZONE),
            local: local.map(|t| t.with_timezone(&CIVIL_TIME_ZONE)),
        }
    }

    /// Any difference means a full reload, including local being ahead.
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.local != Some(self.remote)
    }
}

impl fmt::Display for UpdateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote newest {}, local newest ", self.remote)?;
        match &self.local {
            Some(local) => write!(f, "{local}"),
            None => f.write_str("none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn equal_times_need_no_update() {
        let t = utc("2024-06-15T17:45:30Z");
        assert!(!UpdateDecision::new(t, Some(t)).needs_update());
    }

    #[test]
    fn remote_ahead_needs_update() {
        let decision = UpdateDecision::new(
            utc("2024-06-16T00:00:00Z"),
            Some(utc("2024-06-15T17:45:30Z")),
        );
        assert!(decision.needs_update());
    }

    #[test]
    fn local_ahead_also_needs_update() {
        let decision = UpdateDecision::new(
            utc("2024-06-15T17:45:30Z"),
            Some(utc("2024-06-16T00:00:00Z")),
        );
        assert!(decision.needs_update());
    }

    #[test]
    fn missing_local_needs_update() {
        assert!(UpdateDecision::new(utc("2024-06-15T17:45:30Z"), None).needs_update());
    }

    #[test]
    fn converted_to_pacific_time() {
        let decision = UpdateDecision::new(utc("2024-01-15T20:00:00Z"), None);
        assert_eq!(
            decision.remote,
            CIVIL_TIME_ZONE
                .with_ymd_and_hms(2024, 1, 15, 12, 0, 0)
                .unwrap()
        );
        assert_eq!(decision.remote.to_rfc3339(), "2024-01-15T12:00:00-08:00");
    }

    #[test]
    fn display_mentions_both_sides() {
        let decision = UpdateDecision::new(utc("2024-07-01T19:00:00Z"), None);
        assert_eq!(
            decision.to_string(),
            "remote newest 2024-07-01 12:00:00 PDT, local newest none"
        );
    }
}
