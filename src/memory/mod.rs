//! Multi-tier memory: semantic facts, episodic recall, working-memory
//! budgeting, and the context assembly pipeline that feeds the LLM.

pub mod context;
pub mod embeddings;
pub mod episodic;
pub mod manager;
pub mod semantic;
pub mod tokens;

pub use context::{ContextBuilder, ContextRequest, ContextStage, StageSection};
pub use embeddings::{
    EmbeddingService, HashEmbedding, HttpEmbeddingService, cosine_similarity,
    create_embedding_service,
};
pub use episodic::{EpisodicMemory, EpisodicStats};
pub use manager::{MemoryManager, MemoryStats};
pub use semantic::{SemanticMemory, SemanticStats};
pub use tokens::{TRUNCATION_MARKER, TokenCounter};
