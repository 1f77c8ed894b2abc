//! Intent classification for interactive turns.
//!
//! Cheap, deterministic keyword and regex heuristics that decide whether
//! free text modifies the session's working data set, and if so how. The
//! keyword families and their priority are data, not control flow: the
//! ordered rule table below resolves ties.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::models::ItemType;

/// Kind of modification requested by a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Add,
    Remove,
    Format,
    Filter,
    /// Fallback when a modifier is present but no family matches
    Modify,
}

const ADD_KEYWORDS: &[&str] = &[
    "add", "include", "also show", "also include", "plus", "with", "and also", "append", "insert",
];

const REMOVE_KEYWORDS: &[&str] = &[
    "remove", "exclude", "delete", "without", "drop", "hide", "omit", "take out", "get rid of",
];

const FORMAT_KEYWORDS: &[&str] = &[
    "format as", "show as", "display as", "convert to", "in format", "as json", "as table",
    "as list",
];

const FILTER_KEYWORDS: &[&str] = &["filter", "only show", "just", "limit to"];

const DATA_KEYWORDS: &[&str] = &[
    "snomed", "icd", "description", "code", "mapping", "concept", "relationship", "hierarchy",
];

const CONTEXT_REFS: &[&str] = &["this", "these", "current", "existing", "shown"];

/// Surface keyword to canonical type tag
const TYPE_MAP: &[(&str, &str)] = &[
    ("snomed", "snomed_code"),
    ("icd", "icd_code"),
    ("description", "description"),
    ("name", "name"),
    ("code", "code"),
    ("mapping", "mapping"),
    ("relationship", "relationship"),
    ("hierarchy", "hierarchy"),
    ("parent", "parent_code"),
    ("child", "child_code"),
];

/// Conditions recognizable without a prior search
const CONDITION_TERMS: &[&str] = &[
    "diabetes",
    "hypertension",
    "heart failure",
    "myocardial infarction",
    "copd",
    "asthma",
    "cancer",
    "stroke",
    "pneumonia",
    "sepsis",
    "kidney disease",
    "liver disease",
    "depression",
    "anxiety",
];

/// Terms that mark a fresh query as a relationship/hierarchy question
const RELATIONSHIP_TERMS: &[&str] = &[
    "parent",
    "child",
    "hierarchy",
    "relationship",
    "related to",
    "parent code",
    "child code",
    "parent of",
    "child of",
    "snomed mapping",
    "snomed code",
    "maps to",
    "mapped to",
    "is a",
    "part of",
    "belongs to",
    "subcategory",
    "classification",
];

/// Medical terms treated as entities for memory retrieval
const MEDICAL_ENTITY_TERMS: &[&str] =
    &["hypertension", "diabetes", "icd", "snomed", "code", "diagnosis"];

/// Ordered modification rule table; first matching family wins.
/// Priority is this order, never position in the text.
const MODIFICATION_RULES: &[(ModificationKind, &[&str])] = &[
    (ModificationKind::Add, ADD_KEYWORDS),
    (ModificationKind::Remove, REMOVE_KEYWORDS),
    (ModificationKind::Format, FORMAT_KEYWORDS),
    (ModificationKind::Filter, FILTER_KEYWORDS),
];

/// Families whose keywords classify a turn as a modification. Filter
/// keywords rank in the table above but never classify on their own:
/// "just icd codes" is a fresh search, not a filter request.
const MODIFIER_FAMILIES: &[&[&str]] = &[ADD_KEYWORDS, REMOVE_KEYWORDS, FORMAT_KEYWORDS];

/// ICD-shaped code: a letter, two digits, optional decimal part
static ICD_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]\d{2}(?:\.\d+)?\b").expect("valid icd regex"));

/// SNOMED-shaped code: 6 to 10 digits
static SNOMED_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{6,10}\b").expect("valid snomed regex"));

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// True when the text asks to modify the current working set: it must
/// carry an add/remove/format keyword AND either a data-type keyword or
/// a deictic reference to the shown data. A data-type keyword alone
/// never classifies as a modification, and neither does a filter
/// keyword.
pub fn is_modification_request(text: &str) -> bool {
    let lower = text.to_lowercase();

    let has_modifier = MODIFIER_FAMILIES
        .iter()
        .any(|keywords| contains_any(&lower, keywords));
    let has_data_reference = contains_any(&lower, DATA_KEYWORDS);
    let has_context_ref = contains_any(&lower, CONTEXT_REFS);

    has_modifier && (has_data_reference || has_context_ref)
}

/// Resolve the modification kind via the ordered rule table
pub fn detect_modification_type(text: &str) -> ModificationKind {
    let lower = text.to_lowercase();
    for (kind, keywords) in MODIFICATION_RULES {
        if contains_any(&lower, keywords) {
            return *kind;
        }
    }
    ModificationKind::Modify
}

/// Canonical data types referenced by the text, duplicates collapsed
pub fn extract_data_types(text: &str) -> BTreeSet<ItemType> {
    let lower = text.to_lowercase();
    TYPE_MAP
        .iter()
        .filter(|(keyword, _)| lower.contains(keyword))
        .map(|(_, tag)| ItemType::from_tag(tag))
        .collect()
}

/// Explicit code-like tokens: ICD-shaped matches first, then
/// SNOMED-shaped ones
pub fn extract_codes(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let mut codes: Vec<String> = ICD_CODE_RE
        .find_iter(&upper)
        .map(|m| m.as_str().to_string())
        .collect();
    codes.extend(SNOMED_CODE_RE.find_iter(text).map(|m| m.as_str().to_string()));
    codes
}

/// First known medical condition named in the text
pub fn detect_condition(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    CONDITION_TERMS.iter().find(|c| lower.contains(*c)).copied()
}

/// Whether a fresh query is asking about hierarchy or cross-vocabulary
/// relationships rather than plain code lookup
pub fn is_relationship_query(text: &str) -> bool {
    let lower = text.to_lowercase();
    contains_any(&lower, RELATIONSHIP_TERMS)
}

/// Candidate entities for memory retrieval: ICD-shaped matches plus the
/// fixed medical-term list, deduplicated
pub fn extract_entities(text: &str) -> Vec<String> {
    let upper = text.to_uppercase();
    let lower = text.to_lowercase();

    let mut entities: Vec<String> = ICD_CODE_RE
        .find_iter(&upper)
        .map(|m| m.as_str().to_string())
        .collect();

    for term in MEDICAL_ENTITY_TERMS {
        if lower.contains(term) {
            entities.push((*term).to_string());
        }
    }

    entities.dedup();
    entities
}
