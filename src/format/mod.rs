//! Textual projections of session data.
//!
//! Pure functions over a `SessionContext` snapshot. Every view walks
//! items in insertion order so repeated renders are stable. Unknown
//! sessions render an explicit error line instead of failing, matching
//! the session API's never-throw contract.

use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::models::SessionContext;

/// Fixed four-column markdown table, one row per item
pub fn as_table(context: Option<&SessionContext>) -> String {
    let Some(context) = context else {
        return "| Error | Session not found |".to_string();
    };
    if context.is_empty() {
        return "| Info | No data in session |".to_string();
    }

    let mut lines = vec![
        "| Type | Key | Value | Added At |".to_string(),
        "|------|-----|-------|----------|".to_string(),
    ];
    for item in context.items() {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            item.item_type,
            item.key,
            item.value,
            item.added_at.format("%H:%M:%S")
        ));
    }
    lines.join("\n")
}

/// Lossless JSON export envelope
pub fn as_json(context: Option<&SessionContext>) -> Result<String> {
    let Some(context) = context else {
        return Ok(json!({"error": "Session not found"}).to_string());
    };

    let mut data = Map::new();
    for item in context.items() {
        data.insert(
            item.key.clone(),
            json!({
                "type": item.item_type.tag(),
                "value": item.value,
                "metadata": serde_json::to_value(&item.metadata)?,
                "added_at": item.added_at.to_rfc3339(),
                "source_query": item.source_query,
            }),
        );
    }

    let envelope = json!({
        "session_id": context.session_id,
        "created_at": context.created_at.to_rfc3339(),
        "data_count": context.len(),
        "data": Value::Object(data),
    });
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Prose summary grouped by item type
pub fn as_summary(context: Option<&SessionContext>) -> String {
    let Some(context) = context else {
        return "No active session found.".to_string();
    };
    if context.is_empty() {
        return "No data currently loaded in this session.".to_string();
    }

    let mut lines = vec!["**Current Data in Session:**".to_string()];

    // Group by type, groups ordered by first appearance
    let mut group_order = Vec::new();
    for item in context.items() {
        if !group_order.contains(&item.item_type) {
            group_order.push(item.item_type.clone());
        }
    }
    for item_type in &group_order {
        lines.push(format!("\n**{}:**", item_type.heading()));
        for item in context.items_of_type(item_type) {
            lines.push(format!("- {}: {}", item.key, item.value));
        }
    }

    lines.push(format!("\nTotal items: {}", context.len()));
    lines.join("\n")
}

/// Grounding string for chat answers.
///
/// Each item renders as `[key] value` followed by indented sub-lines
/// surfacing the stored source record: cross-vocabulary mappings, the
/// source abbreviation, then any other non-empty document fields. This
/// keeps SNOMED data nested in a stored ICD record visible to later
/// follow-ups without another backend query.
pub fn as_rag_context(context: Option<&SessionContext>) -> String {
    let Some(context) = context else {
        return String::new();
    };

    let mut lines = Vec::new();
    for item in context.items() {
        lines.push(format!("[{}] {}", item.key, item.value));

        if let Some(relationship) = &item.metadata.relationship {
            let linked = item.metadata.linked_code.as_deref().unwrap_or("");
            lines.push(format!("  relationship: {relationship} (from {linked})"));
        }

        let Some(record) = &item.metadata.record else {
            continue;
        };
        for mapping in &record.mappings {
            lines.push(format!(
                "  {} mapping: {} - {} ({})",
                mapping.vocabulary, mapping.concept_code, mapping.concept_name, mapping.relationship
            ));
        }
        if let Some(sab) = &record.source_abbrev {
            lines.push(format!("  source: {sab}"));
        }
        for (field, value) in &record.extra {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !rendered.is_empty() {
                lines.push(format!("  {field}: {rendered}"));
            }
        }
    }
    lines.join("\n")
}
