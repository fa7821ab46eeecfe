pub mod handler;
pub mod msg_load_handler;
pub mod msg_ping_handler;
pub mod msg_update_handler;

pub use handler::{websocket_document_handler, websocket_handler};
