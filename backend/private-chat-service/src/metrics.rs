use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder,
};

fn register<C: prometheus::core::Collector + Clone + 'static>(collector: C) -> C {
    // Re-registration only happens when several test servers share a binary.
    let _ = prometheus::default_registry().register(Box::new(collector.clone()));
    collector
}

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "private_chat_http_requests_total",
                "Total HTTP requests handled by private-chat-service",
            ),
            &["method", "path", "status"],
        )
        .expect("valid private_chat_http_requests_total definition"),
    )
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register(
        HistogramVec::new(
            HistogramOpts::new(
                "private_chat_http_request_duration_seconds",
                "HTTP request latencies for private-chat-service",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path", "status"],
        )
        .expect("valid private_chat_http_request_duration_seconds definition"),
    )
});

pub static WS_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register(
        IntGauge::new(
            "private_chat_ws_connections",
            "Currently open socket connections",
        )
        .expect("valid private_chat_ws_connections definition"),
    )
});

pub static MESSAGES_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "private_chat_messages_delivered_total",
            "Messages broadcast to a room",
        )
        .expect("valid private_chat_messages_delivered_total definition"),
    )
});

pub static AUTO_JOINS: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "private_chat_auto_joins_total",
            "Recipient connections joined to a room at delivery time",
        )
        .expect("valid private_chat_auto_joins_total definition"),
    )
});

pub static PERSISTENCE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register(
        IntCounter::new(
            "private_chat_persistence_failures_total",
            "Messages the writer gave up on",
        )
        .expect("valid private_chat_persistence_failures_total definition"),
    )
});

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path, &status])
        .observe(start.elapsed().as_secs_f64());

    response
}

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
