use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Half-open extract window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from >= to {
            return Err(PipelineError::Config(format!(
                "Extract window start {} must be before its end {}",
                from.to_rfc3339_opts(SecondsFormat::Secs, true),
                to.to_rfc3339_opts(SecondsFormat::Secs, true),
            )));
        }
        Ok(Self { from, to })
    }

    /// Window covering whole days `[from, to)`, both at midnight UTC.
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        Self::new(midnight(from), midnight(to))
    }

    /// The `days` whole days that end at midnight before `end`.
    pub fn ending_at(end: DateTime<Utc>, days: u32) -> Result<Self> {
        let to = midnight(end.date_naive());
        Self::new(to - Duration::days(i64::from(days)), to)
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Query parameter pairs for the reporting API.
    pub fn query_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("from", self.from.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("to", self.to.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "From {} To {}",
            self.from.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.to.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_empty_or_inverted_window() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(DateWindow::new(t, t).is_err());
        assert!(DateWindow::new(t, t - Duration::days(1)).is_err());
    }

    #[test]
    fn ending_at_truncates_to_midnight() {
        let end = Utc.with_ymd_and_hms(2024, 3, 8, 2, 30, 0).unwrap();
        let window = DateWindow::ending_at(end, 7).unwrap();
        assert_eq!(window.to(), Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap());
        assert_eq!(window.from(), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn query_pairs_are_rfc3339() {
        let window = DateWindow::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        )
        .unwrap();
        let [from, to] = window.query_pairs();
        assert_eq!(from, ("from", "2024-01-01T00:00:00Z".to_string()));
        assert_eq!(to, ("to", "2024-01-08T00:00:00Z".to_string()));
    }

    #[test]
    fn display_names_both_bounds() {
        let window = DateWindow::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        )
        .unwrap();
        assert_eq!(
            window.to_string(),
            "From 2024-01-01T00:00:00Z To 2024-01-08T00:00:00Z"
        );
    }
}
