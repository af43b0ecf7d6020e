use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::Router;
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::state::AppState;

/// One span per request, named after the matched route so room ids and
/// user ids in paths do not fan out into separate log keys.
pub fn add_tracing(router: Router<AppState>) -> Router<AppState> {
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &Request<_>| {
                let route = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_owned())
                    .unwrap_or_else(|| req.uri().path().to_owned());
                tracing::info_span!("http", method = %req.method(), %route)
            })
            .on_response(|res: &Response<_>, latency: Duration, _span: &Span| {
                tracing::info!(
                    status = res.status().as_u16(),
                    elapsed_ms = latency.as_millis() as u64,
                    "response"
                );
            })
            .on_failure(
                |class: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                    tracing::warn!(
                        %class,
                        elapsed_ms = latency.as_millis() as u64,
                        "request failed"
                    );
                },
            ),
    )
}
