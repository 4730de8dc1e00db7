//! Shared types used across the Gleaner workspace.
//!
//! This module defines common newtypes that provide type safety
//! and clear domain modeling.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one harvest run (a job start or a replay).
///
/// A worker captures the run id it was started with; once the persisted
/// state carries a different id, that worker no longer owns the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Create a `RunId` from an existing string.
    ///
    /// # Errors
    /// Returns error if the ID is not a valid UUID v4.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        match uuid::Uuid::parse_str(&id) {
            Ok(parsed) if parsed.get_version_num() == 4 => Ok(Self(id)),
            _ => Err(CoreError::Validation(format!(
                "invalid run ID: must be a valid UUID v4, got '{id}'"
            ))),
        }
    }

    /// Create a new random `RunId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of listing pages, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    /// First page to process (>= 1)
    pub start: u32,
    /// Last page to process (>= start)
    pub end: u32,
}

impl PageRange {
    /// Default first page offered by the control surface.
    pub const DEFAULT_START: u32 = 1;
    /// Default last page offered by the control surface.
    pub const DEFAULT_END: u32 = 20;

    /// Create a validated page range.
    ///
    /// # Errors
    /// Returns error if `start` is zero or `end` precedes `start`.
    pub fn new(start: u32, end: u32) -> Result<Self, CoreError> {
        if start < 1 {
            return Err(CoreError::Validation(
                "Start page must be at least 1".to_string(),
            ));
        }
        if end < start {
            return Err(CoreError::Validation(
                "End page must be greater than or equal to start page".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Number of pages covered by the range.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// A validated range is never empty; provided for clippy symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `page` lies inside the range.
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

impl Default for PageRange {
    fn default() -> Self {
        Self {
            start: Self::DEFAULT_START,
            end: Self::DEFAULT_END,
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Timestamp wrapper with RFC3339 serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp for the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse from RFC3339 string.
    ///
    /// # Errors
    /// Returns error if the string is not valid RFC3339.
    pub fn from_rfc3339(s: &str) -> Result<Self, CoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| CoreError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_valid() {
        let id = "550e8400-e29b-41d4-a716-446655440000";
        let run_id = RunId::new(id).expect("valid run ID");
        assert_eq!(run_id.as_str(), id);
    }

    #[test]
    fn test_run_id_invalid() {
        let invalid_ids = vec![
            "not-a-uuid",
            "550e8400-e29b-51d4-a716-446655440000", // Wrong version
            "",
        ];

        for id in invalid_ids {
            assert!(RunId::new(id).is_err());
        }
    }

    #[test]
    fn test_run_id_generate() {
        let id1 = RunId::generate();
        let id2 = RunId::generate();
        assert_ne!(id1, id2);
        assert!(RunId::new(id1.as_str()).is_ok());
    }

    #[test]
    fn test_page_range_validation() {
        assert!(PageRange::new(1, 1).is_ok());
        assert!(PageRange::new(3, 7).is_ok());

        let err = PageRange::new(0, 5).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let err = PageRange::new(5, 4).unwrap_err();
        assert!(err.to_string().contains("greater than or equal"));
    }

    #[test]
    fn test_page_range_contains() {
        let range = PageRange::new(2, 4).expect("valid range");
        assert_eq!(range.len(), 3);
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn test_page_range_default() {
        let range = PageRange::default();
        assert_eq!(range.start, 1);
        assert_eq!(range.end, 20);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let ts = Timestamp::now();
        let s = ts.to_rfc3339();
        let parsed = Timestamp::from_rfc3339(&s).expect("parse RFC3339 timestamp");
        assert_eq!(ts.timestamp_millis(), parsed.timestamp_millis());
    }

    #[test]
    fn test_timestamp_ordering() {
        let ts1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let ts2 = Timestamp::now();
        assert!(ts1 < ts2);
    }
}
