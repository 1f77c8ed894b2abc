//! Core data models.
//!
//! Session working data (`DataItem`, `SessionContext`), long-term memory
//! entries (`Fact`, `Episode`) and the working-memory message window.

pub mod data_item;
pub mod episode;
pub mod fact;
pub mod message;
pub mod session;

pub use data_item::{DataItem, ItemMetadata, ItemType, RelKind, RelationshipEdge, SourceRecord, VocabularyMapping};
pub use episode::{Episode, EpisodeMetadata, ScoredEpisode};
pub use fact::{Confidence, Fact, FactType};
pub use message::{ChatMessage, ConversationHistory, HistoryStats, Role};
pub use session::{ModificationAction, ModificationRecord, SessionContext, SessionStats};
