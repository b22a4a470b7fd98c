use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    models::{Filter, SearchMetric, TimeRange, TimeSeriesPoint},
    Result,
};

/// The capability a concrete backend implements to feed the dashboard.
///
/// The dispatcher only ever talks to this trait. Returning `None` models a backend that
/// produced nothing at all, and the two data methods treat it differently:
/// `fetch_series` may return `None` (read as no points), while `search_metrics` must not,
/// and doing so fails the `/search` request.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Called once per `timeserie` target of a query, e.g. once for `upper_50` and once
    /// for `upper_75` when both are requested. `max_data_points` of `None` or `0` means
    /// no limit.
    async fn fetch_series(
        &self,
        metric: &str,
        interval: Duration,
        range: &TimeRange,
        max_data_points: Option<u32>,
        adhoc_filters: &[Filter],
    ) -> Result<Option<Vec<TimeSeriesPoint>>>;

    /// Backs `/search`. `target` of `None` asks for everything that can be filtered on,
    /// otherwise the values for that metric.
    async fn search_metrics(&self, target: Option<&str>) -> Result<Option<Vec<SearchMetric>>> {
        debug!(
            filter = ?target,
            "Default search_metrics implementation invoked, returning no metrics"
        );
        Ok(Some(Vec::new()))
    }

    /// Called by the dashboard's connection test. Return false on anything that should
    /// fail it.
    async fn check_health(&self) -> bool {
        debug!("Default check_health implementation invoked, returning true");
        true
    }

    /// Whether `/tag-keys` and `/tag-values` exist for this backend.
    fn supports_tags(&self) -> bool {
        false
    }
}
