#[cfg(test)]
mod router_tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::agent::LookupAgent;
    use crate::api::{app_state::AppState, create_router};
    use crate::config::AppConfig;
    use crate::error::Result;
    use crate::llm::{ChatCompletionService, PromptMessage};
    use crate::memory::{
        ContextBuilder, EpisodicMemory, HashEmbedding, MemoryManager, SemanticMemory,
        TokenCounter,
    };
    use crate::models::{ConversationHistory, SourceRecord};
    use crate::search::{CodeSearchService, SearchHit};
    use crate::session::create_session_store;

    struct CannedSearch;

    #[async_trait]
    impl CodeSearchService for CannedSearch {
        async fn search(&self, _query: &str, _top: usize) -> Result<Vec<SearchHit>> {
            Ok(vec![SearchHit {
                score: 1.0,
                record: SourceRecord {
                    code: "I10".to_string(),
                    label: "Essential (primary) hypertension".to_string(),
                    ..Default::default()
                },
            }])
        }
    }

    struct CannedLlm;

    #[async_trait]
    impl ChatCompletionService for CannedLlm {
        async fn complete(&self, _messages: &[PromptMessage]) -> Result<String> {
            Ok("I10 covers essential hypertension.".to_string())
        }
    }

    fn test_router() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = create_session_store();
        let search: Arc<dyn CodeSearchService> = Arc::new(CannedSearch);
        let llm: Arc<dyn ChatCompletionService> = Arc::new(CannedLlm);

        let semantic = Arc::new(SemanticMemory::new(dir.path().join("facts.json")));
        let episodic = Arc::new(EpisodicMemory::new(
            dir.path().join("episodes.json"),
            Arc::new(HashEmbedding::new(64)),
        ));
        let builder = ContextBuilder::new(
            Arc::clone(&semantic),
            Arc::clone(&episodic),
            Arc::new(TokenCounter::approximate()),
            2000,
        );
        let memory = Arc::new(MemoryManager::new(
            semantic,
            episodic,
            builder,
            Arc::clone(&llm),
            0,
        ));
        let history = Arc::new(Mutex::new(ConversationHistory::new(
            20,
            dir.path().join("history.json"),
        )));
        let agent = Arc::new(LookupAgent::new(
            Arc::clone(&store),
            search,
            llm,
            Arc::clone(&memory),
            history,
            10,
        ));
        let state = AppState::new(store, agent, memory, Arc::new(AppConfig::development()));
        (create_router(state), dir)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
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
    async fn test_create_session_generates_id() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(post_json("/api/v1/sessions", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert!(!body["session_id"].as_str().unwrap().is_empty());
        assert!(body["created_at"].is_string());
    }

    #[tokio::test]
    async fn test_item_lifecycle_over_http() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/sessions", json!({"session_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/sessions/s1/items",
                json!({"item_type": "icd_code", "key": "I10", "value": "Essential hypertension"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["total_items"], 1);

        let response = app.clone().oneshot(get("/api/v1/sessions/s1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats = body_json(response).await;
        assert_eq!(stats["total_items"], 1);
        assert_eq!(stats["item_types"]["icd_code"], 1);

        let response = app
            .clone()
            .oneshot(get("/api/v1/sessions/s1/view?format=table"))
            .await
            .unwrap();
        let view = body_json(response).await;
        assert!(view["content"].as_str().unwrap().contains("I10"));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/sessions/s1/items/I10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["removed"], true);

        let response = app.oneshot(get("/api/v1/sessions/s1")).await.unwrap();
        assert_eq!(body_json(response).await["total_items"], 0);
    }

    #[tokio::test]
    async fn test_get_unknown_session_returns_404() {
        let (app, _dir) = test_router();

        let response = app.oneshot(get("/api/v1/sessions/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_view_unknown_session_returns_neutral_body() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(get("/api/v1/sessions/nope/view?format=table"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert!(view["content"].as_str().unwrap().contains("Session not found"));
    }

    #[tokio::test]
    async fn test_view_rejects_unknown_format() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(get("/api/v1/sessions/s1/view?format=xml"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_turn_runs_agent() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/v1/chat",
                json!({"session_id": "s1", "message": "icd codes for hypertension"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["session_id"], "s1");
        assert!(body["reply"].as_str().unwrap().contains("[I10]"));
        assert_eq!(body["data"][0]["code"], "I10");
        assert_eq!(body["session_stats"]["total_items"], 1);
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(post_json("/api/v1/chat", json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_active_sessions() {
        let (app, _dir) = test_router();

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/sessions", json!({"session_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_sessions"], 1);
    }

    #[tokio::test]
    async fn test_memory_stats_endpoint() {
        let (app, _dir) = test_router();

        let response = app.oneshot(get("/api/v1/memory/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["episodic"]["total_episodes"], 0);
        assert_eq!(body["semantic"]["total_facts"], 0);
    }
}
