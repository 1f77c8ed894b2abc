//! Memory orchestration across all tiers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::context::{ContextBuilder, ContextRequest};
use super::episodic::{EpisodicMemory, EpisodicStats};
use super::semantic::{SemanticMemory, SemanticStats};
use crate::error::Result;
use crate::llm::{ChatCompletionService, PromptMessage};
use crate::models::{Confidence, Episode, EpisodeMetadata, Fact, FactType, ScoredEpisode};

/// Combined statistics across memory tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Episode store stats
    pub episodic: EpisodicStats,
    /// Fact store stats
    pub semantic: SemanticStats,
    /// Turns processed since startup
    pub turns_processed: u64,
}

/// Fact as emitted by the extraction prompt
#[derive(Debug, Deserialize)]
struct ExtractedFact {
    fact_type: FactType,
    content: String,
    confidence: Confidence,
    #[serde(default)]
    entities: Vec<String>,
}

/// Coordinates episodic storage, fact extraction, and context assembly
pub struct MemoryManager {
    semantic: Arc<SemanticMemory>,
    episodic: Arc<EpisodicMemory>,
    builder: ContextBuilder,
    llm: Arc<dyn ChatCompletionService>,
    fact_extraction_interval: u64,
    turn_counter: AtomicU64,
}

impl MemoryManager {
    /// Wire the tiers together
    pub fn new(
        semantic: Arc<SemanticMemory>,
        episodic: Arc<EpisodicMemory>,
        builder: ContextBuilder,
        llm: Arc<dyn ChatCompletionService>,
        fact_extraction_interval: u64,
    ) -> Self {
        Self {
            semantic,
            episodic,
            builder,
            llm,
            fact_extraction_interval,
            turn_counter: AtomicU64::new(0),
        }
    }

    /// Record one completed user/assistant exchange: store the episode
    /// and periodically extract facts from it.
    pub async fn process_turn(
        &self,
        session_id: &str,
        user_query: &str,
        assistant_response: &str,
    ) -> Result<()> {
        let turn_number = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let turn_id = format!("{session_id}_{}", uuid::Uuid::new_v4().simple());

        let metadata = EpisodeMetadata {
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now(),
            turn_number,
        };
        self.episodic
            .add_turn(&turn_id, user_query, assistant_response, metadata)
            .await?;

        if self.fact_extraction_interval > 0 && turn_number % self.fact_extraction_interval == 0 {
            let conversation = Episode::format_turn(user_query, assistant_response);
            let extracted = self.extract_facts(&conversation).await;
            if extracted > 0 {
                info!(extracted, turn_number, "stored facts from conversation");
            }
        }
        Ok(())
    }

    /// Extract facts from conversation text through the LLM. Unparseable
    /// model output counts as zero facts, never an error.
    pub async fn extract_facts(&self, conversation_text: &str) -> usize {
        let prompt = format!(
            "Extract key facts, preferences, and domain knowledge from this \
             medical coding conversation.\n\nConversation:\n{conversation_text}\n\n\
             Extract facts in JSON format with these fields:\n\
             - fact_type: \"user_preference\" | \"domain_knowledge\" | \"context\" | \"reference\"\n\
             - content: The actual fact (concise, one sentence)\n\
             - confidence: \"high\" | \"medium\" | \"low\"\n\
             - entities: List of relevant entities (ICD codes, conditions, etc.)\n\n\
             Return ONLY a valid JSON array, no other text."
        );

        let response = match self.llm.complete(&[PromptMessage::user(prompt)]).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "fact extraction call failed");
                return 0;
            }
        };

        let mut stored = 0;
        for extracted in parse_extracted_facts(&response) {
            let fact = Fact::new(
                extracted.fact_type,
                &extracted.content,
                extracted.confidence,
                extracted.entities,
            );
            match self.semantic.add_fact(fact) {
                Ok(_) => stored += 1,
                Err(e) => warn!(error = %e, "failed to store extracted fact"),
            }
        }
        stored
    }

    /// Assemble relevant context for a query
    pub async fn relevant_context(&self, req: ContextRequest) -> Result<String> {
        self.builder.build(req).await
    }

    /// Search past conversations by similarity
    pub async fn search_past(&self, query: &str, n_results: usize) -> Result<Vec<ScoredEpisode>> {
        self.episodic.search_similar(query, n_results).await
    }

    /// Medium-or-better facts relevant to a query
    pub fn facts_for_query(&self, query: &str, entities: &[String]) -> Vec<Fact> {
        if entities.is_empty() {
            self.semantic
                .search_facts(Some(query), &[], Some(Confidence::Medium))
        } else {
            self.semantic
                .search_facts(None, entities, Some(Confidence::Medium))
        }
    }

    /// Statistics across all tiers
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            episodic: self.episodic.stats(),
            semantic: self.semantic.stats(),
            turns_processed: self.turn_counter.load(Ordering::SeqCst),
        }
    }

    /// Wipe both persistent tiers; requires explicit confirmation
    pub fn clear_all(&self, confirm: bool) -> Result<bool> {
        if !confirm {
            warn!("clear all memory called without confirmation");
            return Ok(false);
        }
        self.episodic.clear_all()?;
        self.semantic.clear()?;
        warn!("all memory cleared");
        Ok(true)
    }
}

/// Pull a JSON array of facts out of model output, tolerating fences
/// and prose around it. Entries that do not parse are skipped.
fn parse_extracted_facts(response: &str) -> Vec<ExtractedFact> {
    let start = response.find('[');
    let end = response.rfind(']');
    let (Some(start), Some(end)) = (start, end) else {
        debug!("fact extraction output had no JSON array");
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let raw = &response[start..=end];
    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(error = %e, "fact extraction output was not a JSON array");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect()
}
