//! Token-budgeted context assembly.
//!
//! An explicit pipeline of stages, composed in fixed priority order:
//! facts, session data, working memory, past episodes. Each stage sees
//! the remaining budget and either fits its section or stands down;
//! working memory is the one stage that truncates instead of dropping,
//! always with a visible marker.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::episodic::EpisodicMemory;
use super::semantic::SemanticMemory;
use super::tokens::TokenCounter;
use crate::error::Result;
use crate::intent::extract_entities;
use crate::models::Confidence;

const MAX_FACTS: usize = 5;
const EPISODE_MIN_REMAINING: usize = 200;
const EPISODE_RESULTS: usize = 3;
const EPISODE_SIMILARITY_FLOOR: f32 = 0.7;
const EPISODE_PREVIEW_CHARS: usize = 300;

/// Inputs for one context assembly
#[derive(Debug, Clone, Default)]
pub struct ContextRequest {
    /// The user's current query
    pub query: String,
    /// Entities to match facts against; extracted from the query when empty
    pub entities: Vec<String>,
    /// Recent conversation transcript
    pub working_memory: String,
    /// Rendered session data (codes, mappings)
    pub session_context: String,
    /// Whether to include semantic facts
    pub include_semantic: bool,
    /// Whether to include past episodes
    pub include_episodic: bool,
}

impl ContextRequest {
    /// Request with both memory tiers enabled
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            include_semantic: true,
            include_episodic: true,
            ..Default::default()
        }
    }
}

/// One labeled contribution to the assembled context
pub struct StageSection {
    /// Provenance header
    pub label: &'static str,
    /// Section body
    pub text: String,
    /// Tokens consumed from the budget
    pub tokens: usize,
}

/// One step of the assembly pipeline
#[async_trait]
pub trait ContextStage: Send + Sync {
    /// Produce a section that fits `remaining` tokens, or `None`
    async fn contribute(&self, req: &ContextRequest, remaining: usize) -> Result<Option<StageSection>>;
}

/// Semantic facts, highest priority
pub struct FactsStage {
    semantic: Arc<SemanticMemory>,
    counter: Arc<TokenCounter>,
}

#[async_trait]
impl ContextStage for FactsStage {
    async fn contribute(&self, req: &ContextRequest, remaining: usize) -> Result<Option<StageSection>> {
        if !req.include_semantic {
            return Ok(None);
        }

        let facts = if req.entities.is_empty() {
            self.semantic
                .search_facts(Some(&req.query), &[], Some(Confidence::Medium))
        } else {
            self.semantic
                .search_facts(None, &req.entities, Some(Confidence::Medium))
        };
        if facts.is_empty() {
            return Ok(None);
        }

        let text = facts
            .iter()
            .take(MAX_FACTS)
            .map(|fact| {
                format!(
                    "[{}] {} (confidence: {})",
                    fact.fact_type, fact.content, fact.confidence
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let tokens = self.counter.count(&text);
        if tokens >= remaining {
            return Ok(None);
        }
        debug!(facts = facts.len().min(MAX_FACTS), tokens, "added facts to context");
        Ok(Some(StageSection {
            label: "RELEVANT FACTS",
            text,
            tokens,
        }))
    }
}

/// Current session data; reserved to half the remaining budget
pub struct SessionStage {
    counter: Arc<TokenCounter>,
}

#[async_trait]
impl ContextStage for SessionStage {
    async fn contribute(&self, req: &ContextRequest, remaining: usize) -> Result<Option<StageSection>> {
        if req.session_context.is_empty() {
            return Ok(None);
        }
        let tokens = self.counter.count(&req.session_context);
        if tokens * 2 >= remaining {
            return Ok(None);
        }
        Ok(Some(StageSection {
            label: "CURRENT SESSION DATA",
            text: req.session_context.clone(),
            tokens,
        }))
    }
}

/// Recent conversation; truncated rather than dropped
pub struct WorkingMemoryStage {
    counter: Arc<TokenCounter>,
}

#[async_trait]
impl ContextStage for WorkingMemoryStage {
    async fn contribute(&self, req: &ContextRequest, remaining: usize) -> Result<Option<StageSection>> {
        if req.working_memory.is_empty() || remaining == 0 {
            return Ok(None);
        }
        let tokens = self.counter.count(&req.working_memory);
        if tokens < remaining {
            return Ok(Some(StageSection {
                label: "RECENT CONVERSATION",
                text: req.working_memory.clone(),
                tokens,
            }));
        }
        let truncated = self.counter.truncate(&req.working_memory, remaining);
        Ok(Some(StageSection {
            label: "RECENT CONVERSATION",
            text: truncated,
            tokens: remaining,
        }))
    }
}

/// Similar past episodes, lowest priority
pub struct EpisodesStage {
    episodic: Arc<EpisodicMemory>,
    counter: Arc<TokenCounter>,
}

#[async_trait]
impl ContextStage for EpisodesStage {
    async fn contribute(&self, req: &ContextRequest, remaining: usize) -> Result<Option<StageSection>> {
        if !req.include_episodic || remaining <= EPISODE_MIN_REMAINING {
            return Ok(None);
        }

        let episodes = match self.episodic.search_similar(&req.query, EPISODE_RESULTS).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(error = %e, "episode retrieval failed, skipping stage");
                return Ok(None);
            }
        };

        let mut lines = Vec::new();
        let mut used = 0usize;
        for scored in episodes
            .iter()
            .filter(|scored| scored.similarity > EPISODE_SIMILARITY_FLOOR)
        {
            let mut text = scored.episode.text.clone();
            if text.chars().count() > EPISODE_PREVIEW_CHARS {
                text = text.chars().take(EPISODE_PREVIEW_CHARS).collect::<String>() + "...";
            }
            let line = format!("[Similarity: {:.2}] {}", scored.similarity, text);
            let line_tokens = self.counter.count(&line);
            if used + line_tokens > remaining {
                break;
            }
            lines.push(line);
            used += line_tokens;
        }

        if lines.is_empty() {
            return Ok(None);
        }
        debug!(episodes = lines.len(), tokens = used, "added past episodes to context");
        Ok(Some(StageSection {
            label: "SIMILAR PAST CONVERSATIONS",
            text: lines.join("\n"),
            tokens: used,
        }))
    }
}

/// Fixed-order stage pipeline with a token budget
pub struct ContextBuilder {
    stages: Vec<Box<dyn ContextStage>>,
    counter: Arc<TokenCounter>,
    max_tokens: usize,
}

impl ContextBuilder {
    /// Compose the standard pipeline: facts, session, working memory,
    /// episodes.
    pub fn new(
        semantic: Arc<SemanticMemory>,
        episodic: Arc<EpisodicMemory>,
        counter: Arc<TokenCounter>,
        max_tokens: usize,
    ) -> Self {
        let stages: Vec<Box<dyn ContextStage>> = vec![
            Box::new(FactsStage {
                semantic,
                counter: Arc::clone(&counter),
            }),
            Box::new(SessionStage {
                counter: Arc::clone(&counter),
            }),
            Box::new(WorkingMemoryStage {
                counter: Arc::clone(&counter),
            }),
            Box::new(EpisodesStage {
                episodic,
                counter: Arc::clone(&counter),
            }),
        ];
        Self {
            stages,
            counter,
            max_tokens,
        }
    }

    /// Assemble the labeled context string within the token budget
    pub async fn build(&self, mut req: ContextRequest) -> Result<String> {
        if req.entities.is_empty() {
            req.entities = extract_entities(&req.query);
        }

        let mut remaining = self.max_tokens;
        let mut sections = Vec::new();
        for stage in &self.stages {
            if let Some(section) = stage.contribute(&req, remaining).await? {
                remaining = remaining.saturating_sub(section.tokens);
                sections.push(section);
            }
        }

        let assembled = sections
            .iter()
            .filter(|section| !section.text.trim().is_empty())
            .map(|section| format!("\n### {}\n{}\n", section.label, section.text.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        info!(
            tokens = self.counter.count(&assembled),
            budget = self.max_tokens,
            sections = sections.len(),
            "built context"
        );
        Ok(assembled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embeddings::HashEmbedding;
    use crate::models::{EpisodeMetadata, Fact, FactType};
    use chrono::Utc;
    use tempfile::TempDir;

    fn builder(max_tokens: usize) -> (ContextBuilder, Arc<SemanticMemory>, Arc<EpisodicMemory>, TempDir) {
        let dir = TempDir::new().unwrap();
        let semantic = Arc::new(SemanticMemory::new(dir.path().join("facts.json")));
        let episodic = Arc::new(EpisodicMemory::new(
            dir.path().join("episodes.json"),
            Arc::new(HashEmbedding::new(128)),
        ));
        let counter = Arc::new(TokenCounter::approximate());
        let built = ContextBuilder::new(
            Arc::clone(&semantic),
            Arc::clone(&episodic),
            counter,
            max_tokens,
        );
        (built, semantic, episodic, dir)
    }

    #[tokio::test]
    async fn test_sections_get_provenance_headers() {
        let (builder, semantic, _episodic, _dir) = builder(2000);
        semantic
            .add_fact(Fact::new(
                FactType::DomainKnowledge,
                "Hypertension is coded as I10 in ICD-10",
                crate::models::Confidence::High,
                vec!["hypertension".into()],
            ))
            .unwrap();

        let mut req = ContextRequest::new("tell me about hypertension");
        req.session_context = "[I10] Essential hypertension".to_string();
        req.working_memory = "[10:00] User: hello".to_string();

        let context = builder.build(req).await.unwrap();
        assert!(context.contains("### RELEVANT FACTS"));
        assert!(context.contains("### CURRENT SESSION DATA"));
        assert!(context.contains("### RECENT CONVERSATION"));
    }

    #[tokio::test]
    async fn test_oversized_working_memory_truncated_with_marker() {
        let (builder, _semantic, _episodic, _dir) = builder(50);
        let mut req = ContextRequest::new("query");
        req.working_memory = "word ".repeat(400);

        let context = builder.build(req).await.unwrap();
        assert!(context.contains("...[truncated]"));

        // total stays near budget, allowing header overhead
        let counter = TokenCounter::approximate();
        assert!(counter.count(&context) <= 50 + 20);
    }

    #[tokio::test]
    async fn test_session_context_needs_half_the_budget() {
        let (builder, _semantic, _episodic, _dir) = builder(40);
        let mut req = ContextRequest::new("query");
        // 30 tokens, more than half of 40
        req.session_context = "x".repeat(120);

        let context = builder.build(req).await.unwrap();
        assert!(!context.contains("CURRENT SESSION DATA"));
    }

    #[tokio::test]
    async fn test_low_similarity_episodes_excluded() {
        let (builder, _semantic, episodic, _dir) = builder(2000);
        episodic
            .add_turn(
                "t1",
                "completely unrelated gardening topic",
                "water the plants",
                EpisodeMetadata {
                    session_id: "s1".into(),
                    timestamp: Utc::now(),
                    turn_number: 1,
                },
            )
            .await
            .unwrap();

        let context = builder
            .build(ContextRequest::new("icd codes for hypertension"))
            .await
            .unwrap();
        assert!(!context.contains("SIMILAR PAST CONVERSATIONS"));
    }

    #[tokio::test]
    async fn test_empty_inputs_produce_empty_context() {
        let (builder, _semantic, _episodic, _dir) = builder(2000);
        let context = builder.build(ContextRequest::new("query")).await.unwrap();
        assert!(context.is_empty());
    }
}
