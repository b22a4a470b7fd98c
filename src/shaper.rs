use serde::Serialize;

use crate::models::{SearchMetric, TimeSeriesPoint, TimeSeriesResponse};

/// The two legal encodings of a `/search` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
    /// `["upper_25", "upper_50"]`
    Array(Vec<String>),
    /// `[{ "text": "upper_25", "value": 1 }, { "text": "upper_50", "value": 2 }]`
    Map(Vec<SearchMetric>),
}

impl SearchResponse {
    pub fn len(&self) -> usize {
        match self {
            SearchResponse::Array(texts) => texts.len(),
            SearchResponse::Map(metrics) => metrics.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns backend points into `[value, epoch_millis]` pairs, keeping the backend's order.
pub fn shape_series(target: &str, points: Vec<TimeSeriesPoint>) -> TimeSeriesResponse {
    TimeSeriesResponse {
        target: target.to_string(),
        data_points: points
            .into_iter()
            .map(|point| (point.value, point.timestamp.timestamp_millis()))
            .collect(),
    }
}

/// Picks the search encoding from the first metric only. If it carries no value the
/// whole response collapses to the texts; otherwise the metrics go out unchanged.
/// Mixed lists are not reshaped per element.
pub fn shape_search(metrics: Vec<SearchMetric>) -> SearchResponse {
    match metrics.first() {
        Some(first) if !first.has_value() => {
            SearchResponse::Array(metrics.into_iter().map(|metric| metric.text).collect())
        }
        _ => SearchResponse::Map(metrics),
    }
}
