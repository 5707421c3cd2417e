//! Data model for the export pipeline
//!
//! - `TagFilter`: tag assignments pinned by a query (exact values or wildcards)
//! - `SeriesResult`: one series returned by `/api/query`
//! - `DataValue`: a datapoint value kept in its exact textual form
//! - `Window` / `TimeRange`: half-open time intervals in whole seconds
//! - `Datapoint`: a single emitted (metric, timestamp, value, tags) tuple

use crate::error::{ExportError, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Unix epoch timestamp in seconds
pub type Timestamp = i64;

/// Query tag value requesting grouping without filtering
pub const WILDCARD: &str = "*";

/// Value side of a tag filter entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagValue {
    /// Filter to exactly this value
    Exact(String),
    /// Group by the key without filtering (`*`)
    Wildcard,
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Exact(v) => f.write_str(v),
            TagValue::Wildcard => f.write_str(WILDCARD),
        }
    }
}

/// Tag assignments a query pins
///
/// Keys are kept sorted so the rendered query expression is deterministic.
/// Filters are cloned, never shared, when a drill branches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagFilter {
    tags: BTreeMap<String, TagValue>,
}

impl TagFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `key` to an exact value
    pub fn with_exact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), TagValue::Exact(value.into()));
        self
    }

    /// Pin `key` to the wildcard
    pub fn with_wildcard(mut self, key: impl Into<String>) -> Self {
        self.tags.insert(key.into(), TagValue::Wildcard);
        self
    }

    /// Copy of this filter with every key in `keys` set to the wildcard
    pub fn pin_wildcards<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut child = self.clone();
        for key in keys {
            child
                .tags
                .insert(key.as_ref().to_string(), TagValue::Wildcard);
        }
        child
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn is_wildcard(&self, key: &str) -> bool {
        matches!(self.tags.get(key), Some(TagValue::Wildcard))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// True when every assignment in `other` is also present here
    pub fn is_superset_of(&self, other: &TagFilter) -> bool {
        other
            .tags
            .iter()
            .all(|(k, v)| self.tags.get(k) == Some(v))
    }

    /// Render the inner part of a `{...}` tag block: `k1=v1,k2=*`
    pub fn to_query_tags(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.to_query_tags())
    }
}

/// A datapoint value preserved exactly as the server rendered it
///
/// Counters often exceed the precision of an `f64`, so the numeral is never
/// round-tripped through floating point. JSON numbers and JSON strings that
/// hold a valid numeral are both accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataValue(String);

impl DataValue {
    /// Parse a numeral, rejecting anything that is not a JSON number literal
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() || text.trim() != text {
            return Err(ExportError::Protocol(format!(
                "invalid datapoint value {:?}",
                text
            )));
        }
        let number: serde_json::Number = serde_json::from_str(text).map_err(|_| {
            ExportError::Protocol(format!("invalid datapoint value {:?}", text))
        })?;
        Ok(Self(number.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lossy numeric view, for callers that want to compare values
    pub fn as_f64(&self) -> Option<f64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => Ok(DataValue(n.to_string())),
            serde_json::Value::String(s) => DataValue::parse(&s).map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected a number or numeric string, got {}",
                other
            ))),
        }
    }
}

/// One series matched by a query
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeriesResult {
    pub metric: String,
    /// Tag values resolved on this series
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Tag keys the server aggregated away
    #[serde(default, rename = "aggregateTags")]
    pub aggregate_tags: Vec<String>,
    #[serde(default)]
    pub dps: BTreeMap<Timestamp, DataValue>,
}

impl SeriesResult {
    /// A series is resolved when no tag keys are still aggregated
    pub fn is_resolved(&self) -> bool {
        self.aggregate_tags.is_empty()
    }

    /// Space separated `k=v` pairs, sorted by key
    pub fn tag_string(&self) -> String {
        self.tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Half-open query window `[start, end)` in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    /// Create a window, requiring `start < end`
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start >= end {
            return Err(ExportError::Validation(format!(
                "window start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn span(&self) -> u64 {
        self.end.abs_diff(self.start)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Requested export range `[start, end)`; may be empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self> {
        if start > end {
            return Err(ExportError::Validation(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A datapoint handed to a sink
#[derive(Debug, Clone, Copy)]
pub struct Datapoint<'a> {
    pub metric: &'a str,
    pub timestamp: Timestamp,
    pub value: &'a DataValue,
    pub tags: &'a BTreeMap<String, String>,
}
