//! Semantic memory fact model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a stored fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    /// How the user likes things presented
    UserPreference,
    /// Medical coding knowledge
    DomainKnowledge,
    /// Conversation-specific context
    Context,
    /// Pointer to an external resource
    Reference,
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            FactType::UserPreference => "user_preference",
            FactType::DomainKnowledge => "domain_knowledge",
            FactType::Context => "context",
            FactType::Reference => "reference",
        };
        write!(f, "{tag}")
    }
}

/// Confidence level, ordered Low < Medium < High
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        };
        write!(f, "{tag}")
    }
}

/// One semantic memory entry.
///
/// Immutable once created except for access bookkeeping; deleted only
/// explicitly by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Generated identifier
    pub id: String,
    /// Category
    pub fact_type: FactType,
    /// One-sentence claim
    pub content: String,
    /// Confidence in the claim
    pub confidence: Confidence,
    /// Entities used for filtering (codes, condition names)
    pub entities: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Times this fact was returned by a search
    pub access_count: u64,
    /// Last time this fact was returned
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Fact {
    /// Create a new fact with a generated id
    pub fn new(fact_type: FactType, content: &str, confidence: Confidence, entities: Vec<String>) -> Self {
        Self {
            id: format!("fact_{}", uuid::Uuid::new_v4().simple()),
            fact_type,
            content: content.to_string(),
            confidence,
            entities,
            created_at: Utc::now(),
            access_count: 0,
            last_accessed: None,
        }
    }

    /// Record one retrieval of this fact
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Some(Utc::now());
    }
}
