use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Absolute window a query covers. `from <= to` is enforced on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.to - self.from
    }
}

/// Comparison carried by an adhoc filter. The serialized tokens are fixed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEquals,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEquals,
}

/// Adhoc filter, e.g. `{ "key": "City", "operator": "=", "value": "Berlin" }`.
/// Handed to the data source untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    pub operator: FilterOperator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    #[serde(rename = "timeserie")]
    Timeserie,
    #[serde(rename = "table")]
    Table,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Timeserie => "timeserie",
            TargetType::Table => "table",
        }
    }
}

/// One metric requested within a query, e.g.
/// `{ "target": "upper_50", "refId": "A", "type": "timeserie" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "target")]
    pub name: String,
    #[serde(rename = "refId", default)]
    pub ref_id: String,
    #[serde(rename = "type")]
    pub kind: TargetType,
}

/// Body of `POST /query`.
///
/// ```json
/// {
///   "panelId": 1,
///   "range": { "from": "2016-10-31T06:33:44.866Z", "to": "2016-10-31T12:33:44.866Z" },
///   "intervalMs": 30000,
///   "targets": [
///     { "target": "upper_50", "refId": "A", "type": "timeserie" },
///     { "target": "upper_75", "refId": "B", "type": "timeserie" }
///   ],
///   "adhocFilters": [{ "key": "City", "operator": "=", "value": "Berlin" }],
///   "maxDataPoints": 550
/// }
/// ```
///
/// `interval`, `rangeRaw`, `range.raw` and `format` are sent by the dashboard but ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub panel_id: i64,
    pub range: TimeRange,
    #[serde(default)]
    pub interval_ms: u64,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub adhoc_filters: Vec<Filter>,
    #[serde(default)]
    pub max_data_points: Option<u32>,
}

impl QueryRequest {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Body of `POST /search`: `{ "target": "upper_50" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub datasource: Option<String>,
    #[serde(default)]
    pub enable: Option<bool>,
    #[serde(default)]
    pub icon_color: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

/// Body of `POST /annotations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRequest {
    pub range: TimeRange,
    pub annotation: Annotation,
}

/// Body of `POST /tag-values`: `{ "key": "City" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValuesRequest {
    pub key: String,
}

/// A single sample produced by a data source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSeriesPoint {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl TimeSeriesPoint {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

/// One entry of the `/query` response. Points are `[value, epoch_millis]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesResponse {
    pub target: String,
    pub data_points: Vec<(f64, i64)>,
}

/// A searchable metric. `value` is optional; see `shaper::shape_search` for how its
/// presence on the first element picks the response encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMetric {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl SearchMetric {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: None,
        }
    }

    pub fn with_value(text: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            text: text.into(),
            value: Some(value.into()),
        }
    }

    /// An explicit JSON `null` counts as absent.
    pub fn has_value(&self) -> bool {
        matches!(&self.value, Some(v) if !v.is_null())
    }
}
