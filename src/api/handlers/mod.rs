//! HTTP request handlers.

pub mod chat_handler;
pub mod memory_handler;
pub mod session_handler;

pub use chat_handler::*;
pub use memory_handler::*;
pub use session_handler::*;
