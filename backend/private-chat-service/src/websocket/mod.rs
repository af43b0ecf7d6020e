pub mod handlers;
pub mod message_types;
pub mod pubsub;

pub use handlers::ws_handler;
pub use message_types::{ClientEvent, ServerEvent};
