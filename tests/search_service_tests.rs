// Integration tests for the HTTP code search client, run against a
// local mock of the hosted index.

use medcodex::config::AppConfig;
use medcodex::error::AppError;
use medcodex::search::{CodeSearchService, HttpCodeSearch};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::development();
    config.search.endpoint = server.uri();
    config.search.max_retries = 2;
    config.search.retry_backoff_ms = 1;
    config
}

fn results_body() -> serde_json::Value {
    json!({
        "results": [
            {
                "score": 2.4,
                "document": {
                    "CODE": "I10",
                    "STR": "Essential (primary) hypertension",
                    "SAB": "ICD10CM",
                    "OHDSI": r#"{"maps":[{"vocabulary_id":"SNOMED","concept_code":"59621000","concept_name":"Essential hypertension (disorder)","relationship_id":"Maps to"}]}"#,
                    "REL": [
                        r#"{"REL":"PAR","RELA":"isa","SAB":"ICD10CM","CODE":"I10-I16","STR":"Hypertensive diseases"}"#
                    ]
                }
            },
            {"score": 0.4, "document": {"STR": "document without a code"}}
        ]
    })
}

#[tokio::test]
async fn test_search_sends_semantic_query_and_parses_documents() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .and(header("api-key", "dev-search-key"))
        .and(body_partial_json(json!({
            "query": "hypertension",
            "top": 5,
            "queryType": "semantic",
            "semantic": {"configuration": "defaultSemanticConfig"},
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
        .expect(1)
        .mount(&server)
        .await;

    let search = HttpCodeSearch::new(&config_for(&server)).unwrap();
    let hits = search.search("hypertension", 5).await.unwrap();

    assert_eq!(hits.len(), 1);
    let record = &hits[0].record;
    assert_eq!(record.code, "I10");
    assert_eq!(record.label, "Essential (primary) hypertension");
    assert_eq!(record.mappings[0].concept_code, "59621000");
    assert_eq!(record.relationships[0].code, "I10-I16");
}

#[tokio::test]
async fn test_search_retries_transient_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(results_body()))
        .expect(1)
        .mount(&server)
        .await;

    let search = HttpCodeSearch::new(&config_for(&server)).unwrap();
    let hits = search.search("hypertension", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn test_search_does_not_retry_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let search = HttpCodeSearch::new(&config_for(&server)).unwrap();
    let err = search.search("hypertension", 5).await.unwrap_err();
    assert!(matches!(err, AppError::Search(_)));
}

#[tokio::test]
async fn test_search_exhausts_retries_on_persistent_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(500))
        // initial attempt plus max_retries
        .expect(3)
        .mount(&server)
        .await;

    let search = HttpCodeSearch::new(&config_for(&server)).unwrap();
    let err = search.search("hypertension", 5).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_search_tolerates_empty_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let search = HttpCodeSearch::new(&config_for(&server)).unwrap();
    let hits = search.search("nothing matches", 5).await.unwrap();
    assert!(hits.is_empty());
}
