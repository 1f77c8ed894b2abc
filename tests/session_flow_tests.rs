// End-to-end flow over the HTTP surface: real router, real services,
// mocked search and chat-completion backends.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use medcodex::agent::LookupAgent;
use medcodex::api::{app_state::AppState, create_router};
use medcodex::config::AppConfig;
use medcodex::llm::create_chat_service;
use medcodex::memory::{
    ContextBuilder, EpisodicMemory, MemoryManager, SemanticMemory, TokenCounter,
    create_embedding_service,
};
use medcodex::models::ConversationHistory;
use medcodex::search::create_code_search_service;
use medcodex::session::create_session_store;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mock_backends() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/indexes/pcornet-icd-index/docs/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{
                "score": 2.1,
                "document": {
                    "CODE": "I10",
                    "STR": "Essential (primary) hypertension",
                    "SAB": "ICD10CM",
                    "OHDSI": r#"{"maps":[{"vocabulary_id":"SNOMED","concept_code":"59621000","concept_name":"Essential hypertension (disorder)","relationship_id":"Maps to"}]}"#
                }
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "I10 covers essential hypertension."}}]
        })))
        .mount(&server)
        .await;

    server
}

fn build_app(server: &MockServer, dir: &TempDir) -> axum::Router {
    let mut config = AppConfig::development();
    config.search.endpoint = server.uri();
    config.search.retry_backoff_ms = 1;
    config.llm.endpoint = format!("{}/v1/chat/completions", server.uri());
    config.memory.data_dir = dir.path().to_path_buf();
    // keep turns cheap: no fact extraction
    config.memory.fact_extraction_interval = 0;

    let store = create_session_store();
    let search = create_code_search_service(&config).unwrap();
    let llm = create_chat_service(&config).unwrap();
    let embeddings = create_embedding_service(&config).unwrap();

    let semantic = Arc::new(SemanticMemory::new(config.memory.data_dir.join("facts.json")));
    let episodic = Arc::new(EpisodicMemory::new(
        config.memory.data_dir.join("episodes.json"),
        embeddings,
    ));
    let builder = ContextBuilder::new(
        Arc::clone(&semantic),
        Arc::clone(&episodic),
        Arc::new(TokenCounter::approximate()),
        config.memory.max_context_tokens,
    );
    let memory = Arc::new(MemoryManager::new(
        semantic,
        episodic,
        builder,
        Arc::clone(&llm),
        config.memory.fact_extraction_interval,
    ));
    let history = Arc::new(Mutex::new(ConversationHistory::new(
        config.memory.max_messages,
        config.memory.data_dir.join("history.json"),
    )));
    let agent = Arc::new(LookupAgent::new(
        Arc::clone(&store),
        search,
        llm,
        Arc::clone(&memory),
        history,
        config.search.top,
    ));

    create_router(AppState::new(store, agent, memory, Arc::new(config)))
}

async fn json_response(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_chat_then_modify_then_view_flow() {
    let server = mock_backends().await;
    let dir = TempDir::new().unwrap();
    let app = build_app(&server, &dir);

    // fresh lookup stores results and answers with a citation
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/chat",
            json!({"session_id": "flow", "message": "icd codes for hypertension"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_response(response).await;
    assert!(body["reply"].as_str().unwrap().contains("[I10]"));
    assert_eq!(body["session_stats"]["total_items"], 1);

    // modification turn resolves against the stored working set
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/chat",
            json!({"session_id": "flow", "message": "add snomed codes to these"}),
        ))
        .await
        .unwrap();
    let body = json_response(response).await;
    assert!(body["reply"].as_str().unwrap().contains("SNOMED 59621000"));
    assert_eq!(body["session_stats"]["item_types"]["snomed_code"], 1);

    // rendered views see both items
    let response = app
        .clone()
        .oneshot(get("/api/v1/sessions/flow/view?format=table"))
        .await
        .unwrap();
    let view = json_response(response).await;
    let table = view["content"].as_str().unwrap();
    assert!(table.contains("I10"));
    assert!(table.contains("59621000"));

    let response = app
        .clone()
        .oneshot(get("/api/v1/sessions/flow/view?format=json"))
        .await
        .unwrap();
    let view = json_response(response).await;
    let exported: Value = serde_json::from_str(view["content"].as_str().unwrap()).unwrap();
    assert_eq!(exported["data_count"], 2);

    // removal by explicit code shrinks the set
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/chat",
            json!({"session_id": "flow", "message": "remove I10 from this"}),
        ))
        .await
        .unwrap();
    let body = json_response(response).await;
    assert!(body["reply"].as_str().unwrap().contains("Removed 1 item(s)"));
    assert_eq!(body["session_stats"]["total_items"], 1);

    // clearing leaves an empty but live session
    let response = app
        .clone()
        .oneshot(post("/api/v1/sessions/flow/clear", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/v1/sessions/flow")).await.unwrap();
    let stats = json_response(response).await;
    assert_eq!(stats["total_items"], 0);
}

#[tokio::test]
async fn test_sessions_remain_isolated_over_http() {
    let server = mock_backends().await;
    let dir = TempDir::new().unwrap();
    let app = build_app(&server, &dir);

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/chat",
            json!({"session_id": "a", "message": "icd codes for hypertension"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post("/api/v1/sessions", json!({"session_id": "b"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get("/api/v1/sessions/b")).await.unwrap();
    let stats = json_response(response).await;
    assert_eq!(stats["total_items"], 0);
}
