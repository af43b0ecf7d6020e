//! State a connected client keeps between server events: the merged
//! per-room message view, unread badges and typing debounce. Nothing here
//! does I/O; the app feeds events in and sends what comes back out.

pub mod reconciler;
pub mod typing;
pub mod unread;

pub use reconciler::ConversationStore;
pub use typing::{TypingDebouncer, TypingSignal, TYPING_IDLE};
pub use unread::{MarkSenderRead, UnreadBadges};
