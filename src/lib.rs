//! Medcodex - session-aware medical coding assistant.
//!
//! Lets an analyst look up ICD-10 billing codes and their SNOMED mappings
//! through a conversational interface: each turn is classified as a fresh
//! search, a modification of the session's working data set, or a
//! context-grounded chat reply, and prompt context is assembled from
//! tiered memory within a token budget.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod models;
pub mod search;
pub mod session;
