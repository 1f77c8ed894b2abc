//! Session data item model.
//!
//! A `DataItem` is one retrieved or derived fact held in a session: an ICD
//! code, a SNOMED mapping, a description. Items carry their full source
//! record so nested vocabulary data stays available to later follow-ups
//! without re-querying the search backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of data held by an item.
///
/// The set is open: tags outside the known vocabulary round-trip through
/// `Other`. The tag is informational only and never affects key uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    IcdCode,
    SnomedCode,
    Description,
    Mapping,
    Relationship,
    ParentCode,
    ChildCode,
    Other(String),
}

impl ItemType {
    /// Canonical snake_case tag
    pub fn tag(&self) -> &str {
        match self {
            ItemType::IcdCode => "icd_code",
            ItemType::SnomedCode => "snomed_code",
            ItemType::Description => "description",
            ItemType::Mapping => "mapping",
            ItemType::Relationship => "relationship",
            ItemType::ParentCode => "parent_code",
            ItemType::ChildCode => "child_code",
            ItemType::Other(tag) => tag,
        }
    }

    /// Parse a canonical tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "icd_code" => ItemType::IcdCode,
            "snomed_code" => ItemType::SnomedCode,
            "description" => ItemType::Description,
            "mapping" => ItemType::Mapping,
            "relationship" => ItemType::Relationship,
            "parent_code" => ItemType::ParentCode,
            "child_code" => ItemType::ChildCode,
            other => ItemType::Other(other.to_string()),
        }
    }

    /// Pluralized title-case group header used by the summary view,
    /// e.g. "Icd Codes" for `icd_code`.
    pub fn heading(&self) -> String {
        let mut words = Vec::new();
        for word in self.tag().split('_') {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    words.push(format!("{}{}", first.to_uppercase(), chars.as_str()));
                }
                None => continue,
            }
        }
        format!("{}s", words.join(" "))
    }

    /// Title-case singular form, e.g. "Icd Code"
    pub fn display_name(&self) -> String {
        let heading = self.heading();
        heading[..heading.len() - 1].to_string()
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl From<String> for ItemType {
    fn from(tag: String) -> Self {
        ItemType::from_tag(&tag)
    }
}

impl From<ItemType> for String {
    fn from(item_type: ItemType) -> Self {
        item_type.tag().to_string()
    }
}

/// Cross-vocabulary mapping parsed from a source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyMapping {
    /// Target vocabulary id, e.g. "SNOMED"
    pub vocabulary: String,
    /// Concept code in the target vocabulary
    pub concept_code: String,
    /// Concept display name
    pub concept_name: String,
    /// Relationship id, e.g. "Maps to"
    pub relationship: String,
    /// Domain of the target concept
    pub domain: Option<String>,
    /// Concept class of the target concept
    pub concept_class: Option<String>,
}

/// Relationship kind carried by a REL-segment edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelKind {
    /// Parent code
    #[serde(rename = "PAR")]
    Parent,
    /// Child code
    #[serde(rename = "CHD")]
    Child,
    /// Related code
    #[serde(rename = "RO")]
    Related,
    /// Synonym
    #[serde(rename = "SY")]
    Synonym,
    /// Required/associated code
    #[serde(rename = "RQ")]
    Required,
    #[serde(other)]
    Unknown,
}

impl RelKind {
    /// Group header for human-readable relationship display
    pub fn display_name(&self) -> &'static str {
        match self {
            RelKind::Parent => "Parent Codes",
            RelKind::Child => "Child Codes",
            RelKind::Related => "Related Codes",
            RelKind::Synonym => "Synonyms",
            RelKind::Required => "Required/Associated Codes",
            RelKind::Unknown => "Other Relationships",
        }
    }
}

/// One hierarchy or cross-vocabulary edge attached to a source record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Edge kind
    pub rel: RelKind,
    /// Relationship attribute, e.g. "isa"
    pub rela: Option<String>,
    /// Source vocabulary abbreviation, e.g. "SNOMEDCT_US"
    pub sab: String,
    /// Target code
    pub code: String,
    /// Target display string
    pub label: String,
}

/// A full document returned by the search backend, with the known fields
/// parsed out and the remainder preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceRecord {
    /// Unique code field
    pub code: String,
    /// Human-readable label
    pub label: String,
    /// Parsed cross-vocabulary mappings
    pub mappings: Vec<VocabularyMapping>,
    /// Parsed hierarchy/relationship edges
    pub relationships: Vec<RelationshipEdge>,
    /// Source vocabulary abbreviation
    pub source_abbrev: Option<String>,
    /// Remaining non-empty document fields
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Provenance carried by a data item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemMetadata {
    /// Originating search relevance score
    pub score: Option<f32>,
    /// Full source record, when the item came from a search hit
    pub record: Option<SourceRecord>,
    /// Relationship id, when the item came from a relationship lookup
    pub relationship: Option<String>,
    /// Code this item was derived from (e.g. the ICD code a SNOMED
    /// mapping was looked up for)
    pub linked_code: Option<String>,
}

/// One retrieved or derived fact held in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    /// Data kind tag
    pub item_type: ItemType,
    /// Unique identifier within the session; re-adding overwrites
    pub key: String,
    /// Short display string
    pub value: String,
    /// Provenance
    pub metadata: ItemMetadata,
    /// Creation timestamp
    pub added_at: DateTime<Utc>,
    /// The user text that produced this item
    pub source_query: String,
}

impl DataItem {
    /// Create a new item
    pub fn new(item_type: ItemType, key: &str, value: &str, source_query: &str) -> Self {
        Self {
            item_type,
            key: key.to_string(),
            value: value.to_string(),
            metadata: ItemMetadata::default(),
            added_at: Utc::now(),
            source_query: source_query.to_string(),
        }
    }

    /// Attach the originating search score
    pub fn with_score(mut self, score: f32) -> Self {
        self.metadata.score = Some(score);
        self
    }

    /// Attach the full source record
    pub fn with_record(mut self, record: SourceRecord) -> Self {
        self.metadata.record = Some(record);
        self
    }

    /// Attach relationship provenance
    pub fn with_relationship(mut self, relationship: &str, linked_code: &str) -> Self {
        self.metadata.relationship = Some(relationship.to_string());
        self.metadata.linked_code = Some(linked_code.to_string());
        self
    }
}
