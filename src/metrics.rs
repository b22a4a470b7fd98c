use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Instant;

use crate::{models::TargetType, Result, SimpleJsonError};

lazy_static! {
    // Request metrics
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simplejson_requests_total",
        "Total number of requests handled, by endpoint and status code",
        &["endpoint", "status"]
    ).unwrap();

    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "simplejson_request_duration_seconds",
        "Request duration in seconds",
        &["endpoint"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]
    ).unwrap();

    // Query metrics
    pub static ref TARGETS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simplejson_targets_total",
        "Total number of query targets routed, by target type",
        &["type"]
    ).unwrap();
}

/// Observes the duration of one request on drop and counts it under the final status.
pub struct RequestTimer {
    endpoint: &'static str,
    status: u16,
    start: Instant,
}

impl RequestTimer {
    pub fn new(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            status: 200,
            start: Instant::now(),
        }
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        REQUEST_DURATION
            .with_label_values(&[self.endpoint])
            .observe(duration);
        let status = self.status.to_string();
        REQUESTS_TOTAL
            .with_label_values(&[self.endpoint, status.as_str()])
            .inc();
    }
}

pub fn record_target(kind: TargetType) {
    TARGETS_TOTAL.with_label_values(&[kind.as_str()]).inc();
}

/// Renders the default registry in the text exposition format.
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| SimpleJsonError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| SimpleJsonError::Internal(format!("Metrics are not UTF-8: {}", e)))
}
