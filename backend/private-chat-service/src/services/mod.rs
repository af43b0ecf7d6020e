pub mod delivery_service;
pub mod message_service;
pub mod persistence_writer;
pub mod session_service;

pub use delivery_service::DeliveryService;
pub use message_service::MessageService;
pub use persistence_writer::PersistenceWriter;
pub use session_service::SessionService;
