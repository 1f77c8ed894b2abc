//! Code search collaborators.
//!
//! `CodeSearchService` fronts a hosted hybrid (keyword + semantic) index
//! of ICD-10 documents. The production impl posts over HTTP and parses
//! each returned document into a typed `SourceRecord`; malformed
//! sub-fields are logged at debug and skipped so one bad document never
//! fails a whole result set.

pub mod relationship;
pub mod retry;

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::{RelKind, RelationshipEdge, SourceRecord, VocabularyMapping};
pub use relationship::RelationshipSearch;
pub use retry::with_retry;

/// One scored result from the search backend
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Relevance score
    pub score: f32,
    /// Parsed document
    pub record: SourceRecord,
}

/// Code search abstraction
#[async_trait]
pub trait CodeSearchService: Send + Sync {
    /// Run a query, returning at most `top` scored records
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>>;
}

/// HTTP client for the hosted search index
pub struct HttpCodeSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    index: String,
    semantic_config: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl HttpCodeSearch {
    /// Build a client from the search section of the app config
    pub fn new(config: &AppConfig) -> Result<Self> {
        let search = &config.search;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(search.request_timeout))
            .build()
            .map_err(|e| AppError::Config(format!("search http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: search.endpoint.trim_end_matches('/').to_string(),
            api_key: search.api_key.clone(),
            index: search.index.clone(),
            semantic_config: search.semantic_config.clone(),
            max_retries: search.max_retries,
            retry_backoff_ms: search.retry_backoff_ms,
        })
    }

    fn request_body(&self, query: &str, top: usize) -> Value {
        let mut body = json!({
            "query": query,
            "top": top,
        });
        if !self.semantic_config.is_empty() {
            body["queryType"] = json!("semantic");
            body["semantic"] = json!({ "configuration": self.semantic_config });
        }
        body
    }
}

#[async_trait]
impl CodeSearchService for HttpCodeSearch {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>> {
        let url = format!("{}/indexes/{}/docs/search", self.endpoint, self.index);
        let body = self.request_body(query, top);

        let response = with_retry(self.max_retries, self.retry_backoff_ms, || async {
            let resp = self
                .client
                .post(&url)
                .header("api-key", &self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if status.is_server_error() {
                return Err(AppError::Connection(format!("search returned {status}")));
            }
            if !status.is_success() {
                return Err(AppError::Search(format!("search returned {status}")));
            }
            let parsed: Value = resp.json().await?;
            Ok(parsed)
        })
        .await?;

        let hits = parse_hits(&response);
        info!(query, hits = hits.len(), "code search completed");
        Ok(hits)
    }
}

/// Parse the backend's `{"results": [{"score", "document"}]}` envelope
fn parse_hits(response: &Value) -> Vec<SearchHit> {
    let Some(results) = response.get("results").and_then(Value::as_array) else {
        debug!("search response missing results array");
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|result| {
            let document = result.get("document")?;
            let score = result
                .get("score")
                .and_then(Value::as_f64)
                .unwrap_or_default() as f32;
            let record = parse_document(document);
            if record.code.is_empty() {
                return None;
            }
            Some(SearchHit { score, record })
        })
        .collect()
}

/// Parse one backend document into a typed record.
///
/// The document carries `CODE`, `STR`, `SAB`, an `OHDSI` field holding a
/// JSON string with a `maps` array, and a `REL` field holding a list of
/// JSON strings. Anything else lands in `extra`.
pub fn parse_document(document: &Value) -> SourceRecord {
    let field = |name: &str| {
        document
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let code = field("CODE");
    let label = field("STR");
    let sab = field("SAB");

    let mappings = document
        .get("OHDSI")
        .and_then(Value::as_str)
        .map(|raw| parse_mappings(raw, &code))
        .unwrap_or_default();

    let relationships = document
        .get("REL")
        .and_then(Value::as_array)
        .map(|entries| parse_rel_entries(entries, &code))
        .unwrap_or_default();

    let mut extra = std::collections::BTreeMap::new();
    if let Some(fields) = document.as_object() {
        for (name, value) in fields {
            if matches!(name.as_str(), "CODE" | "STR" | "SAB" | "OHDSI" | "REL" | "id" | "vector")
                || name.starts_with('@')
            {
                continue;
            }
            let empty = matches!(value, Value::Null)
                || value.as_str().is_some_and(str::is_empty);
            if !empty {
                extra.insert(name.clone(), value.clone());
            }
        }
    }

    SourceRecord {
        code,
        label,
        mappings,
        relationships,
        source_abbrev: (!sab.is_empty()).then_some(sab),
        extra,
    }
}

fn parse_mappings(raw: &str, code: &str) -> Vec<VocabularyMapping> {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(code, error = %e, "unparseable vocabulary mapping field");
            return Vec::new();
        }
    };

    let Some(maps) = parsed.get("maps").and_then(Value::as_array) else {
        return Vec::new();
    };

    maps.iter()
        .filter_map(|map| {
            let text = |name: &str| {
                map.get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let concept_code = text("concept_code");
            if concept_code.is_empty() {
                return None;
            }
            let domain = text("domain_id");
            let concept_class = text("concept_class_id");
            Some(VocabularyMapping {
                vocabulary: text("vocabulary_id"),
                concept_code,
                concept_name: text("concept_name"),
                relationship: text("relationship_id"),
                domain: (!domain.is_empty()).then_some(domain),
                concept_class: (!concept_class.is_empty()).then_some(concept_class),
            })
        })
        .collect()
}

fn parse_rel_entries(entries: &[Value], code: &str) -> Vec<RelationshipEdge> {
    entries
        .iter()
        .filter_map(|entry| {
            let raw = entry.as_str()?;
            let rel_obj: Value = match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(e) => {
                    debug!(code, error = %e, "unparseable relationship entry");
                    return None;
                }
            };
            let text = |name: &str| {
                rel_obj
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let rel = match text("REL").as_str() {
                "PAR" => RelKind::Parent,
                "CHD" => RelKind::Child,
                "RO" => RelKind::Related,
                "SY" => RelKind::Synonym,
                "RQ" => RelKind::Required,
                _ => RelKind::Unknown,
            };
            let rela = text("RELA");
            Some(RelationshipEdge {
                rel,
                rela: (!rela.is_empty()).then_some(rela),
                sab: text("SAB"),
                code: text("CODE"),
                label: text("STR"),
            })
        })
        .collect()
}

/// Create the production search service
pub fn create_code_search_service(config: &AppConfig) -> Result<Arc<dyn CodeSearchService>> {
    Ok(Arc::new(HttpCodeSearch::new(config)?))
}
