use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use tracing::{debug, error, info};

use crate::{
    datasource::DataSource,
    metrics,
    models::{
        AnnotationRequest, QueryRequest, SearchRequest, TagValuesRequest, Target, TargetType,
        TimeSeriesResponse,
    },
    shaper::{self, SearchResponse},
    Result, SimpleJsonError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Run the per-target fetches of one query concurrently. Off by default because a
    /// backend may share a single connection or session across targets.
    pub parallel_targets: bool,
}

/// Per-endpoint request pipeline sitting between the HTTP layer and a [`DataSource`].
///
/// Holds no request state, so one instance serves every request. Each operation is a
/// plain future: dropping it stops the remaining targets and drops the in-flight backend
/// call with it.
#[derive(Clone)]
pub struct Dispatcher {
    source: Arc<dyn DataSource>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(source: Arc<dyn DataSource>, config: DispatcherConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    pub async fn check(&self) -> Result<()> {
        info!("Checking data source");
        if !self.source.check_health().await {
            error!("Data source check failed");
            return Err(SimpleJsonError::Unavailable);
        }
        info!("Data source check succeeded");
        Ok(())
    }

    pub async fn query(&self, request: Option<QueryRequest>) -> Result<Vec<TimeSeriesResponse>> {
        let request = request
            .ok_or_else(|| SimpleJsonError::MissingBody("A query must be supplied.".to_string()))?;

        info!(
            panel_id = request.panel_id,
            targets = request.targets.len(),
            parallel = self.config.parallel_targets,
            "Processing query"
        );

        if self.config.parallel_targets {
            self.query_parallel(&request).await
        } else {
            self.query_sequential(&request).await
        }
    }

    async fn query_sequential(&self, request: &QueryRequest) -> Result<Vec<TimeSeriesResponse>> {
        let mut responses = Vec::with_capacity(request.targets.len());
        for target in &request.targets {
            responses.push(self.route(target, request)?.await?);
        }
        Ok(responses)
    }

    async fn query_parallel(&self, request: &QueryRequest) -> Result<Vec<TimeSeriesResponse>> {
        // Route everything up front so a bad target fails before any fetch starts.
        let pending = request
            .targets
            .iter()
            .map(|target| self.route(target, request))
            .collect::<Result<Vec<_>>>()?;
        try_join_all(pending).await
    }

    fn route<'a>(
        &'a self,
        target: &'a Target,
        request: &'a QueryRequest,
    ) -> Result<BoxFuture<'a, Result<TimeSeriesResponse>>> {
        debug!(
            metric = %target.name,
            kind = target.kind.as_str(),
            ref_id = %target.ref_id,
            "Processing target"
        );
        metrics::record_target(target.kind);

        match target.kind {
            TargetType::Table => Err(SimpleJsonError::NotImplemented(
                "Table targets are not implemented yet.".to_string(),
            )),
            TargetType::Timeserie => Ok(Box::pin(self.process_time_series(target, request))),
        }
    }

    async fn process_time_series(
        &self,
        target: &Target,
        request: &QueryRequest,
    ) -> Result<TimeSeriesResponse> {
        let points = self
            .source
            .fetch_series(
                &target.name,
                request.interval(),
                &request.range,
                request.max_data_points,
                &request.adhoc_filters,
            )
            .await?
            .unwrap_or_default();

        Ok(shaper::shape_series(&target.name, points))
    }

    pub async fn annotations(&self, _request: AnnotationRequest) -> Result<()> {
        Err(SimpleJsonError::NotImplemented(
            "Annotations are not implemented yet.".to_string(),
        ))
    }

    pub async fn search(&self, request: Option<SearchRequest>) -> Result<SearchResponse> {
        let target = request.and_then(|request| request.target);
        info!(search_target = ?target, "Searching metrics");

        let metrics = self
            .source
            .search_metrics(target.as_deref())
            .await?
            .ok_or_else(|| {
                error!("Data source returned no metric list from search_metrics");
                SimpleJsonError::ContractViolation(
                    "search_metrics must return a list, never None".to_string(),
                )
            })?;

        Ok(shaper::shape_search(metrics))
    }

    pub async fn tag_keys(&self) -> Result<()> {
        if !self.source.supports_tags() {
            return Err(SimpleJsonError::NotFound);
        }
        Err(SimpleJsonError::NotImplemented(
            "Tag key enumeration is not implemented yet.".to_string(),
        ))
    }

    /// The tag gate is checked before the body is looked at, so callers pass the raw
    /// decoder in.
    pub async fn tag_values<F>(&self, decode: F) -> Result<()>
    where
        F: FnOnce() -> Result<Option<TagValuesRequest>>,
    {
        if !self.source.supports_tags() {
            return Err(SimpleJsonError::NotFound);
        }
        let _request = decode()?.ok_or_else(|| {
            SimpleJsonError::MissingBody("A tag values request must be supplied.".to_string())
        })?;
        Err(SimpleJsonError::NotImplemented(
            "Tag value enumeration is not implemented yet.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Filter, FilterOperator, SearchMetric, TimeRange, TimeSeriesPoint};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Duration, Option<u32>, Vec<Filter>)>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
        null_series: bool,
        metrics: Option<Vec<SearchMetric>>,
        healthy: bool,
        tags: bool,
    }

    impl Recorder {
        fn healthy() -> Self {
            Self {
                healthy: true,
                metrics: Some(Vec::new()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(name, ..)| name.clone())
                .collect()
        }
    }

    #[async_trait]
    impl DataSource for Recorder {
        async fn fetch_series(
            &self,
            metric: &str,
            interval: Duration,
            range: &TimeRange,
            max_data_points: Option<u32>,
            adhoc_filters: &[Filter],
        ) -> Result<Option<Vec<TimeSeriesPoint>>> {
            self.calls.lock().unwrap().push((
                metric.to_string(),
                interval,
                max_data_points,
                adhoc_filters.to_vec(),
            ));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if metric == "broken" {
                return Err(SimpleJsonError::backend("connection reset"));
            }
            if self.null_series {
                return Ok(None);
            }
            Ok(Some(vec![
                TimeSeriesPoint::new(1.0, range.to),
                TimeSeriesPoint::new(0.0, range.from),
            ]))
        }

        async fn search_metrics(
            &self,
            _target: Option<&str>,
        ) -> Result<Option<Vec<SearchMetric>>> {
            Ok(self.metrics.clone())
        }

        async fn check_health(&self) -> bool {
            self.healthy
        }

        fn supports_tags(&self) -> bool {
            self.tags
        }
    }

    fn t0() -> DateTime<Utc> {
        "2016-10-31T06:33:44.866Z".parse().unwrap()
    }

    fn target(name: &str, kind: TargetType) -> Target {
        Target {
            name: name.to_string(),
            ref_id: "A".to_string(),
            kind,
        }
    }

    fn request(targets: Vec<Target>) -> QueryRequest {
        QueryRequest {
            panel_id: 1,
            range: TimeRange::new(t0(), t0() + ChronoDuration::seconds(60)),
            interval_ms: 30_000,
            targets,
            adhoc_filters: vec![Filter {
                key: "City".into(),
                operator: FilterOperator::Equals,
                value: "Berlin".into(),
            }],
            max_data_points: Some(550),
        }
    }

    fn dispatcher(source: &Arc<Recorder>, parallel_targets: bool) -> Dispatcher {
        Dispatcher::new(source.clone(), DispatcherConfig { parallel_targets })
    }

    #[test]
    fn test_sequential_is_the_default() {
        assert!(!DispatcherConfig::default().parallel_targets);
    }

    #[tokio::test]
    async fn test_query_echoes_targets_in_order() {
        let source = Arc::new(Recorder::healthy());
        let names = ["upper_50", "upper_75", "upper_90"];
        let targets = names.iter().map(|n| target(n, TargetType::Timeserie)).collect();

        let responses = dispatcher(&source, false)
            .query(Some(request(targets)))
            .await
            .unwrap();

        let echoed: Vec<_> = responses.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(echoed, names);
        assert_eq!(source.calls(), names);

        // Backend order is kept, not sorted by timestamp.
        assert_eq!(
            responses[0].data_points,
            vec![
                (1.0, t0().timestamp_millis() + 60_000),
                (0.0, t0().timestamp_millis())
            ]
        );
    }

    #[tokio::test]
    async fn test_query_passes_request_through() {
        let source = Arc::new(Recorder::healthy());
        dispatcher(&source, false)
            .query(Some(request(vec![target("upper_50", TargetType::Timeserie)])))
            .await
            .unwrap();

        let calls = source.calls.lock().unwrap();
        let (name, interval, max_data_points, filters) = &calls[0];
        assert_eq!(name, "upper_50");
        assert_eq!(*interval, Duration::from_secs(30));
        assert_eq!(*max_data_points, Some(550));
        assert_eq!(filters[0].key, "City");
    }

    #[tokio::test]
    async fn test_missing_query_body() {
        let source = Arc::new(Recorder::healthy());
        let err = dispatcher(&source, false).query(None).await.unwrap_err();
        assert!(matches!(err, SimpleJsonError::MissingBody(_)));
    }

    #[tokio::test]
    async fn test_null_series_is_empty() {
        let source = Arc::new(Recorder {
            null_series: true,
            ..Recorder::healthy()
        });
        let responses = dispatcher(&source, false)
            .query(Some(request(vec![target("upper_50", TargetType::Timeserie)])))
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].data_points.is_empty());
    }

    #[tokio::test]
    async fn test_table_target_aborts_remaining_targets() {
        let source = Arc::new(Recorder::healthy());
        let err = dispatcher(&source, false)
            .query(Some(request(vec![
                target("upper_50", TargetType::Timeserie),
                target("upper_75", TargetType::Table),
                target("upper_90", TargetType::Timeserie),
            ])))
            .await
            .unwrap_err();

        assert!(matches!(err, SimpleJsonError::NotImplemented(_)));
        assert_eq!(source.calls(), vec!["upper_50"]);
    }

    #[tokio::test]
    async fn test_backend_error_aborts_remaining_targets() {
        let source = Arc::new(Recorder::healthy());
        let err = dispatcher(&source, false)
            .query(Some(request(vec![
                target("broken", TargetType::Timeserie),
                target("upper_75", TargetType::Timeserie),
            ])))
            .await
            .unwrap_err();

        assert!(matches!(err, SimpleJsonError::Backend(_)));
        assert_eq!(source.calls(), vec!["broken"]);
    }

    #[tokio::test]
    async fn test_sequential_fetches_never_overlap() {
        let source = Arc::new(Recorder {
            delay: Duration::from_millis(5),
            ..Recorder::healthy()
        });
        let targets = (0..4)
            .map(|i| target(&format!("upper_{}", i), TargetType::Timeserie))
            .collect();
        dispatcher(&source, false)
            .query(Some(request(targets)))
            .await
            .unwrap();
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_parallel_fetches_overlap_and_keep_order() {
        let source = Arc::new(Recorder {
            delay: Duration::from_millis(5),
            ..Recorder::healthy()
        });
        let names: Vec<String> = (0..4).map(|i| format!("upper_{}", i)).collect();
        let targets = names.iter().map(|n| target(n, TargetType::Timeserie)).collect();

        let responses = dispatcher(&source, true)
            .query(Some(request(targets)))
            .await
            .unwrap();

        assert_eq!(source.peak.load(Ordering::SeqCst), 4);
        let echoed: Vec<_> = responses.iter().map(|r| r.target.clone()).collect();
        assert_eq!(echoed, names);
    }

    #[tokio::test]
    async fn test_parallel_backend_error_fails_whole_query() {
        let source = Arc::new(Recorder {
            delay: Duration::from_millis(5),
            ..Recorder::healthy()
        });
        let result = dispatcher(&source, true)
            .query(Some(request(vec![
                target("upper_50", TargetType::Timeserie),
                target("broken", TargetType::Timeserie),
                target("upper_75", TargetType::Timeserie),
            ])))
            .await;

        // All three were in flight together, yet nothing partial comes back.
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(SimpleJsonError::Backend(ref m)) if m == "connection reset"));
    }

    #[tokio::test]
    async fn test_parallel_table_target_fails_before_fetching() {
        let source = Arc::new(Recorder::healthy());
        let err = dispatcher(&source, true)
            .query(Some(request(vec![
                target("upper_50", TargetType::Timeserie),
                target("upper_75", TargetType::Table),
            ])))
            .await
            .unwrap_err();
        assert!(matches!(err, SimpleJsonError::NotImplemented(_)));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_query_stops_remaining_targets() {
        let source = Arc::new(Recorder {
            delay: Duration::from_millis(50),
            ..Recorder::healthy()
        });
        let dispatcher = dispatcher(&source, false);
        let query = dispatcher.query(Some(request(vec![
            target("upper_50", TargetType::Timeserie),
            target("upper_75", TargetType::Timeserie),
        ])));

        assert_err!(tokio::time::timeout(Duration::from_millis(10), query).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls(), vec!["upper_50"]);
    }

    #[tokio::test]
    async fn test_check_health() {
        let healthy = Arc::new(Recorder::healthy());
        assert_ok!(dispatcher(&healthy, false).check().await);

        let down = Arc::new(Recorder::default());
        let err = dispatcher(&down, false).check().await.unwrap_err();
        assert!(matches!(err, SimpleJsonError::Unavailable));
    }

    #[tokio::test]
    async fn test_search_shapes_backend_metrics() {
        let source = Arc::new(Recorder {
            metrics: Some(vec![SearchMetric::text("a"), SearchMetric::text("b")]),
            ..Recorder::healthy()
        });
        let shaped = dispatcher(&source, false).search(None).await.unwrap();
        assert_eq!(shaped, SearchResponse::Array(vec!["a".into(), "b".into()]));
    }

    #[tokio::test]
    async fn test_search_without_list_is_a_contract_violation() {
        let source = Arc::new(Recorder {
            metrics: None,
            ..Recorder::healthy()
        });
        let err = dispatcher(&source, false)
            .search(Some(SearchRequest::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, SimpleJsonError::ContractViolation(_)));
    }

    #[tokio::test]
    async fn test_annotations_are_not_implemented() {
        let source = Arc::new(Recorder::healthy());
        let request = AnnotationRequest {
            range: TimeRange::new(t0(), t0()),
            annotation: crate::models::Annotation {
                name: "deploys".into(),
                datasource: None,
                enable: Some(true),
                icon_color: None,
                query: None,
            },
        };
        let err = dispatcher(&source, false).annotations(request).await.unwrap_err();
        assert!(matches!(err, SimpleJsonError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn test_tag_endpoints_gate_on_support() {
        let without = Arc::new(Recorder::healthy());
        let d = dispatcher(&without, false);
        assert!(matches!(d.tag_keys().await, Err(SimpleJsonError::NotFound)));
        // The body is never decoded when tags are unsupported.
        let result = d
            .tag_values(|| panic!("body decoded for a backend without tags"))
            .await;
        assert!(matches!(result, Err(SimpleJsonError::NotFound)));

        let with = Arc::new(Recorder {
            tags: true,
            ..Recorder::healthy()
        });
        let d = dispatcher(&with, false);
        assert!(matches!(d.tag_keys().await, Err(SimpleJsonError::NotImplemented(_))));
        let result = d
            .tag_values(|| Ok(Some(TagValuesRequest { key: "City".into() })))
            .await;
        assert!(matches!(result, Err(SimpleJsonError::NotImplemented(_))));
    }
}
