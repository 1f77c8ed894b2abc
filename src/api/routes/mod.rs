//! API route definitions.

pub mod chat_routes;
pub mod memory_routes;
pub mod session_routes;
