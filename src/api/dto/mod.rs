//! Data transfer objects for API requests and responses.

pub mod chat_dto;
pub mod memory_dto;
pub mod session_dto;

pub use chat_dto::*;
pub use memory_dto::*;
pub use session_dto::*;
