//! Relationship and hierarchy lookups over the code search backend.
//!
//! SNOMED mappings come from two places in a retrieved document: the
//! cross-vocabulary mapping field (vocabulary "SNOMED") and REL-segment
//! edges whose source abbreviation is "SNOMEDCT_US". Both are surfaced
//! so neither representation gets lost.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::CodeSearchService;
use crate::error::Result;
use crate::models::{RelKind, RelationshipEdge};

const MAPPING_SEARCH_TOP: usize = 5;
const HIERARCHY_SEARCH_TOP: usize = 10;
const SNOMED_VOCABULARY: &str = "SNOMED";
const SNOMED_SAB: &str = "SNOMEDCT_US";

/// One ICD-to-SNOMED mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnomedMapping {
    /// The ICD code the mapping was found on
    pub icd_code: String,
    /// ICD display string
    pub icd_name: String,
    /// SNOMED concept code
    pub snomed_code: String,
    /// SNOMED display string
    pub snomed_name: String,
    /// Relationship id or kind, e.g. "Maps to"
    pub relationship: String,
    /// Where the mapping came from: "vocabulary_map" or "rel_segment"
    pub source: String,
}

/// Parent/child entry resolved from REL edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyEntry {
    /// Related code
    pub code: String,
    /// Related display string
    pub label: String,
    /// Source vocabulary abbreviation
    pub source: String,
    /// The matched code this entry hangs off
    pub of_code: String,
    /// Display string of the matched code
    pub of_label: String,
}

/// Parent and child codes for one query code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    /// The code that was looked up
    pub query_code: String,
    /// Broader codes
    pub parents: Vec<HierarchyEntry>,
    /// Narrower codes
    pub children: Vec<HierarchyEntry>,
}

/// Relationship lookups layered over a code search service
pub struct RelationshipSearch {
    search: Arc<dyn CodeSearchService>,
}

impl RelationshipSearch {
    /// Wrap a search service
    pub fn new(search: Arc<dyn CodeSearchService>) -> Self {
        Self { search }
    }

    /// SNOMED mappings for an ICD code. Only documents whose code matches
    /// the query code (exact or sub-code) contribute.
    pub async fn snomed_mappings(&self, icd_code: &str) -> Result<Vec<SnomedMapping>> {
        let code_upper = icd_code.to_uppercase();
        let hits = self.search.search(icd_code, MAPPING_SEARCH_TOP).await?;

        let mut mappings = Vec::new();
        for hit in &hits {
            let record = &hit.record;
            if !record.code.to_uppercase().contains(&code_upper) {
                continue;
            }

            for mapping in &record.mappings {
                if mapping.vocabulary != SNOMED_VOCABULARY || mapping.concept_code.is_empty() {
                    continue;
                }
                mappings.push(SnomedMapping {
                    icd_code: record.code.clone(),
                    icd_name: record.label.clone(),
                    snomed_code: mapping.concept_code.clone(),
                    snomed_name: mapping.concept_name.clone(),
                    relationship: mapping.relationship.clone(),
                    source: "vocabulary_map".to_string(),
                });
            }

            for edge in &record.relationships {
                if edge.sab != SNOMED_SAB {
                    continue;
                }
                mappings.push(SnomedMapping {
                    icd_code: record.code.clone(),
                    icd_name: record.label.clone(),
                    snomed_code: edge.code.clone(),
                    snomed_name: edge.label.clone(),
                    relationship: edge
                        .rela
                        .clone()
                        .unwrap_or_else(|| edge.rel.display_name().to_string()),
                    source: "rel_segment".to_string(),
                });
            }
        }

        debug!(icd_code, count = mappings.len(), "resolved snomed mappings");
        Ok(mappings)
    }

    /// Parent and child codes for a code, from Par/Chd REL edges
    pub async fn hierarchy(&self, code: &str) -> Result<Hierarchy> {
        let code_upper = code.to_uppercase();
        let hits = self.search.search(code, HIERARCHY_SEARCH_TOP).await?;

        let mut parents = Vec::new();
        let mut children = Vec::new();
        for hit in &hits {
            let record = &hit.record;
            if !record.code.to_uppercase().contains(&code_upper) {
                continue;
            }
            for edge in &record.relationships {
                let entry = HierarchyEntry {
                    code: edge.code.clone(),
                    label: edge.label.clone(),
                    source: edge.sab.clone(),
                    of_code: record.code.clone(),
                    of_label: record.label.clone(),
                };
                match edge.rel {
                    RelKind::Parent => parents.push(entry),
                    RelKind::Child => children.push(entry),
                    _ => {}
                }
            }
        }

        Ok(Hierarchy {
            query_code: code.to_string(),
            parents,
            children,
        })
    }
}

/// Human-readable display of relationship edges, grouped by kind
pub fn format_relationships(edges: &[RelationshipEdge]) -> String {
    if edges.is_empty() {
        return "No relationships found.".to_string();
    }

    let mut by_kind: BTreeMap<&'static str, Vec<&RelationshipEdge>> = BTreeMap::new();
    let mut kind_order = Vec::new();
    for edge in edges {
        let name = edge.rel.display_name();
        if !by_kind.contains_key(name) {
            kind_order.push(name);
        }
        by_kind.entry(name).or_default().push(edge);
    }

    let mut lines = Vec::new();
    for name in kind_order {
        lines.push(format!("\n**{name}:**"));
        for edge in &by_kind[name] {
            let mut line = format!("- {}: {}", edge.code, edge.label);
            if let Some(rela) = &edge.rela {
                line.push_str(&format!(" ({rela})"));
            }
            line.push_str(&format!(" [{}]", edge.sab));
            lines.push(line);
        }
    }
    lines.join("\n")
}
