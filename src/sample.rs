use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    datasource::DataSource,
    models::{Filter, SearchMetric, TimeRange, TimeSeriesPoint},
    Result, SimpleJsonError,
};

const CATALOGUE: [&str; 5] = ["upper_25", "upper_50", "upper_75", "upper_90", "upper_95"];

/// Largest series generated for one target.
const MAX_POINTS: i64 = 100_000;

/// Demo backend: every metric is a counter ticking once per interval across the range.
#[derive(Debug, Clone, Default)]
pub struct SampleDataSource;

impl SampleDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for SampleDataSource {
    async fn fetch_series(
        &self,
        metric: &str,
        interval: Duration,
        range: &TimeRange,
        max_data_points: Option<u32>,
        adhoc_filters: &[Filter],
    ) -> Result<Option<Vec<TimeSeriesPoint>>> {
        debug!(metric, ?interval, filters = adhoc_filters.len(), "Generating sample series");

        let step_ms = i64::try_from(interval.as_millis()).map_err(SimpleJsonError::backend)?;
        if step_ms == 0 {
            return Ok(Some(Vec::new()));
        }

        let span_ms = range.duration().num_milliseconds().max(0);
        let mut count = span_ms / step_ms;
        if let Some(max) = max_data_points.filter(|max| *max > 0) {
            count = count.min(i64::from(max));
        }
        if count > MAX_POINTS {
            return Err(SimpleJsonError::backend(format!(
                "{count} points requested for {metric}, at most {MAX_POINTS} are generated"
            )));
        }

        let points = (0..count)
            .map(|i| {
                let offset = chrono::Duration::milliseconds(i * step_ms);
                TimeSeriesPoint::new(i as f64, range.from + offset)
            })
            .collect();
        Ok(Some(points))
    }

    async fn search_metrics(&self, target: Option<&str>) -> Result<Option<Vec<SearchMetric>>> {
        let filter = target.unwrap_or_default();
        Ok(Some(
            CATALOGUE
                .iter()
                .filter(|name| name.contains(filter))
                .map(|name| SearchMetric::text(*name))
                .collect(),
        ))
    }
}
