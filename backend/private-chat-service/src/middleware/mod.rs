pub mod auth;
pub mod error_handling;
pub mod logging;

use axum::Router;
use crate::state::AppState;

/// Apply default middleware layers (logging, metrics)
pub fn with_defaults(router: Router<AppState>) -> Router<AppState> {
    logging::add_tracing(router.layer(axum::middleware::from_fn(
        crate::metrics::track_http_metrics,
    )))
}
