pub mod contact;
pub mod message;
pub mod user;

pub use contact::{ContactSummary, UnreadGroup};
pub use message::Message;
pub use user::{MessageId, UserId};
