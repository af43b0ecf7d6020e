pub mod contacts;
pub mod messages;
pub mod unread;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::metrics::metrics_handler;
use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use crate::websocket::ws_handler;

use contacts::{list_contacts, user_online};
use messages::{append_message, mark_messages_read, room_history};
use unread::{mark_sender_read, unread_count, unread_messages};

pub fn build_router(state: &AppState) -> Router<AppState> {
    // Service introspection endpoints
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics_handler));

    // Persistence façade; every route needs a bearer token
    let api = Router::new()
        .route("/messages", post(append_message))
        .route("/messages/room/:room_id", get(room_history))
        .route("/messages/mark-read", put(mark_messages_read))
        .route("/unread-messages", get(unread_messages))
        .route("/unread-count", get(unread_count))
        .route("/mark-sender-read/:user_id", put(mark_sender_read))
        .route("/contacts", get(list_contacts))
        .route("/users/:user_id/online", get(user_online))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // The socket authenticates itself before upgrading
    let realtime = Router::new().route("/ws", get(ws_handler));

    let router = introspection.merge(api).merge(realtime);
    crate::middleware::with_defaults(router).layer(CorsLayer::permissive())
}
