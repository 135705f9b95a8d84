//! Prometheus instrumentation.
//!
//! Every [`AppState`](crate::state::AppState) owns its own recorder rather than
//! installing a global one, so tests can build as many routers as they like.
//!
//! Exposed series:
//! - `userhub_http_requests_total` (counter): by method, path and status
//! - `userhub_http_request_duration_seconds` (histogram): by method, path and status
//! - `userhub_http_requests_in_flight` (gauge)
//! - `userhub_build_info` (gauge): always 1, labelled with the crate version

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

const REQUESTS_TOTAL: &str = "userhub_http_requests_total";
const REQUEST_DURATION: &str = "userhub_http_request_duration_seconds";
const IN_FLIGHT: &str = "userhub_http_requests_in_flight";
const BUILD_INFO: &str = "userhub_build_info";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Clone)]
pub struct Metrics {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), LATENCY_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();
        let metrics = Self {
            recorder: Arc::new(recorder),
            handle,
        };
        metrics.record(|| {
            metrics::gauge!(BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
            metrics::gauge!(IN_FLIGHT).set(0.0);
        });
        Ok(metrics)
    }

    fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&*self.recorder, f)
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Drains histogram buckets. Call periodically.
    pub fn run_upkeep(&self) {
        self.handle.run_upkeep();
    }
}

pub async fn track(State(metrics): State<Metrics>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    metrics.record(|| metrics::gauge!(IN_FLIGHT).increment(1.0));
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();
    metrics.record(|| {
        metrics::gauge!(IN_FLIGHT).decrement(1.0);
        let labels = [("method", method), ("path", path), ("status", status)];
        metrics::counter!(REQUESTS_TOTAL, &labels).increment(1);
        metrics::histogram!(REQUEST_DURATION, &labels).record(elapsed);
    });

    response
}
