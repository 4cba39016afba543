//! Time handling for SMOS product time ranges.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// First day with SMOS L2 data, used when a time range has no start.
pub const MISSION_START: &str = "2010-01-01";

/// Format of the compact times found in product filenames.
pub const COMPACT_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// A closed UTC time range used for product queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Normalize an open-ended `[from, to]` pair.
    ///
    /// A missing start becomes the mission start, a missing end becomes now.
    /// A date-only end covers the whole day.
    pub fn normalize(start: Option<&str>, end: Option<&str>) -> Result<Self, TimeParseError> {
        let start = match start {
            Some(s) => parse_datetime(s)?,
            None => parse_datetime(MISSION_START)?,
        };
        let end = match end {
            Some(s) if is_date_only(s) => {
                parse_datetime(s)? + Duration::days(1) - Duration::seconds(1)
            }
            Some(s) => parse_datetime(s)?,
            None => Utc::now(),
        };
        if start > end {
            return Err(TimeParseError::Inverted(format!("{} > {}", start, end)));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }

    /// True if `[start, stop]` shares at least one instant with this range.
    pub fn overlaps(&self, start: &DateTime<Utc>, stop: &DateTime<Utc>) -> bool {
        stop >= &self.start && start <= &self.end
    }

    /// All calendar days touched by this range, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let last = self.end.date_naive();
        let mut day = self.start.date_naive();
        while day <= last {
            days.push(day);
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        days
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Compact `YYYYMMDDhhmmss` times as they appear in product filenames.
pub struct CompactTime;

impl CompactTime {
    pub fn parse(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
        if s.len() != 14 {
            return Err(TimeParseError::InvalidCompact(s.to_string()));
        }
        let ndt = NaiveDateTime::parse_from_str(s, COMPACT_TIME_FORMAT)
            .map_err(|_| TimeParseError::InvalidCompact(s.to_string()))?;
        Ok(Utc.from_utc_datetime(&ndt))
    }

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.format(COMPACT_TIME_FORMAT).to_string()
    }

    /// Convert `20230401150613` into `2023-04-01T15:06:13`.
    pub fn to_iso(s: &str) -> Result<String, TimeParseError> {
        let dt = Self::parse(s)?;
        Ok(dt.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

/// Parse a time value from an L2 header attribute, e.g. `UTC=2023-04-01T15:06:13.000000`.
pub fn parse_header_time(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let raw = s.strip_prefix("UTC=").unwrap_or(s);
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }
    parse_datetime(raw)
}

/// Parse an ISO 8601 time, with or without zone, or a plain date.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();

    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    // Try date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

fn is_date_only(s: &str) -> bool {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok()
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Invalid compact time: {0}")]
    InvalidCompact(String),

    #[error("Time range start after end: {0}")]
    Inverted(String),
}

impl From<TimeParseError> for crate::SmosError {
    fn from(err: TimeParseError) -> Self {
        crate::SmosError::InvalidTime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_iso8601() {
        let dt = parse_datetime("2023-04-01T12:00:00Z").unwrap();
        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.month(), 4);
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_date_only_end_covers_day() {
        let range = TimeRange::normalize(Some("2021-05-01"), Some("2021-05-01")).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2021, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2021, 5, 1, 23, 59, 59).unwrap());
        assert_eq!(range.days().len(), 1);
    }

    #[test]
    fn test_open_start_uses_mission_start() {
        let range = TimeRange::normalize(None, Some("2010-01-03")).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(range.days().len(), 3);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(TimeRange::normalize(Some("2021-05-03"), Some("2021-05-01")).is_err());
    }

    #[test]
    fn test_compact_time() {
        assert_eq!(
            CompactTime::to_iso("20230401150613").unwrap(),
            "2023-04-01T15:06:13"
        );
        assert!(CompactTime::parse("2023040115061").is_err());
        let dt = CompactTime::parse("20230401150613").unwrap();
        assert_eq!(CompactTime::format(&dt), "20230401150613");
    }

    #[test]
    fn test_header_time() {
        let dt = parse_header_time("UTC=2023-04-01T15:06:13.000000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 4, 1, 15, 6, 13).unwrap());
    }

    #[test]
    fn test_overlaps() {
        let range = TimeRange::normalize(Some("2023-04-01T12:00:00"), Some("2023-04-01T13:00:00"))
            .unwrap();
        let a = Utc.with_ymd_and_hms(2023, 4, 1, 11, 30, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2023, 4, 1, 12, 10, 0).unwrap();
        let c = Utc.with_ymd_and_hms(2023, 4, 1, 13, 10, 0).unwrap();
        assert!(range.overlaps(&a, &b));
        assert!(!range.overlaps(&c, &(c + Duration::hours(1))));
    }
}
