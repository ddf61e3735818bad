use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::db::{QueryError, ResultSet};
use crate::llm::models::ChatOptions;
use crate::web::error::ApiError;
use crate::web::state::AppState;

// Request / response types

#[derive(Debug, Default, Deserialize)]
pub struct GenerateSqlRequest {
    #[serde(default)]
    pub query: Option<String>,
}

/// A natural-language question, trimmed and known to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

impl Question {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ApiError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateSqlResponse {
    pub generated_sql: String,
    pub query_result: ResultSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateSqlResponse {
    fn executed(generated_sql: String, query_result: ResultSet) -> Self {
        Self {
            generated_sql,
            query_result,
            error: None,
        }
    }

    fn failed(generated_sql: String, error: &QueryError) -> Self {
        Self {
            generated_sql,
            query_result: Vec::new(),
            error: Some(format!("failed to execute SQL: {}", error)),
        }
    }
}

// Anything that is not a JSON object with a string `query` counts as empty
fn extract_question(body: &[u8]) -> Result<Question, ApiError> {
    let payload: GenerateSqlRequest = serde_json::from_slice(body).unwrap_or_default();
    Question::parse(payload.query.as_deref().unwrap_or_default())
}

// API Implementations

/// `POST /generate_sql`: question in, generated SQL and its result rows out.
pub async fn generate_sql(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<GenerateSqlResponse>, ApiError> {
    let question = extract_question(&body)?;
    debug!("NL-query: {}", question.as_str());

    let prompt = state.prompts.build(question.as_str())?;
    let completion = state.chat.complete(&prompt, &ChatOptions::default()).await?;

    // Passed to the database exactly as the model wrote it
    let sql = completion.first_content()?.trim().to_string();
    info!("Generated SQL: {}", sql);

    let start_time = Instant::now();
    match state.executor.execute(&sql).await {
        Ok(rows) => {
            info!(
                "Query executed successfully. Row count: {}, Execution time: {}ms",
                rows.len(),
                start_time.elapsed().as_millis()
            );
            Ok(Json(GenerateSqlResponse::executed(sql, rows)))
        }
        Err(e) => {
            warn!("SQL execution failed: {} - SQL was: {}", e, sql);
            Ok(Json(GenerateSqlResponse::failed(sql, &e)))
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.llm.model,
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::{QueryExecutor, Record};
    use crate::llm::models::ChatCompletion;
    use crate::llm::prompt::{PromptBuilder, DEFAULT_SCHEMA};
    use crate::llm::{ChatCompleter, LlmError};
    use crate::web::routes::build_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct MockChat {
        reply: Result<String, String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl MockChat {
        fn replying(sql: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(sql.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatCompleter for MockChat {
        async fn complete(&self, prompt: &str, _options: &ChatOptions) -> Result<ChatCompletion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(content) => Ok(serde_json::from_value(json!({
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
                }))
                .unwrap()),
                Err(message) => Err(LlmError::ConnectionError(message.clone())),
            }
        }
    }

    struct MockExecutor {
        result: Result<ResultSet, String>,
        calls: AtomicUsize,
        statements: Mutex<Vec<String>>,
    }

    impl MockExecutor {
        fn returning(rows: Value) -> Arc<Self> {
            let rows: Vec<Record> = serde_json::from_value(rows).unwrap();
            Arc::new(Self {
                result: Ok(rows),
                calls: AtomicUsize::new(0),
                statements: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(message.to_string()),
                calls: AtomicUsize::new(0),
                statements: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl QueryExecutor for MockExecutor {
        async fn execute(&self, sql: &str) -> Result<ResultSet, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.statements.lock().unwrap().push(sql.to_string());
            match &self.result {
                Ok(rows) => Ok(rows.clone()),
                Err(message) => Err(QueryError::Database(sqlx::Error::Protocol(message.clone()))),
            }
        }
    }

    fn app(chat: Arc<MockChat>, executor: Arc<MockExecutor>) -> Router {
        let state = AppState::new(
            AppConfig::default(),
            chat,
            executor,
            PromptBuilder::new(DEFAULT_SCHEMA).unwrap(),
        );
        build_router(Arc::new(state))
    }

    async fn post(app: Router, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/generate_sql")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    const COUNT_SQL: &str = "SELECT COUNT(*) AS n FROM employees;";

    #[test]
    fn question_is_trimmed() {
        assert_eq!(Question::parse("  how many?\n").unwrap().as_str(), "how many?");
        assert!(matches!(Question::parse(" \t\n"), Err(ApiError::EmptyQuery)));
    }

    #[tokio::test]
    async fn blank_queries_are_rejected_without_downstream_calls() {
        for body in [
            r#"{"query": ""}"#,
            r#"{"query": "   \n\t"}"#,
            r#"{}"#,
            r#"{"query": null}"#,
            r#"{"query": 42}"#,
            "not json",
            "",
        ] {
            let chat = MockChat::replying(COUNT_SQL);
            let executor = MockExecutor::returning(json!([]));

            let (status, response) = post(app(chat.clone(), executor.clone()), body).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(response, json!({"error": "query must not be empty"}));
            assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
            assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn prompt_carries_schema_and_trimmed_question() {
        let chat = MockChat::replying(COUNT_SQL);
        let executor = MockExecutor::returning(json!([]));

        post(
            app(chat.clone(), executor),
            r#"{"query": "  How many employees are there?  "}"#,
        )
        .await;

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(DEFAULT_SCHEMA));
        assert!(prompts[0].contains("How many employees are there?"));
        assert!(!prompts[0].contains("  How many"));
    }

    #[tokio::test]
    async fn generated_sql_reaches_executor_unmodified() {
        let chat = MockChat::replying(&format!("\n  {}  \n", COUNT_SQL));
        let executor = MockExecutor::returning(json!([{"n": 42}]));

        let (status, response) = post(
            app(chat, executor.clone()),
            r#"{"query": "How many employees are there?"}"#,
        )
        .await;

        assert_eq!(*executor.statements.lock().unwrap(), vec![COUNT_SQL.to_string()]);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            response,
            json!({"generated_sql": COUNT_SQL, "query_result": [{"n": 42}]})
        );
    }

    #[tokio::test]
    async fn execution_failure_is_reported_with_200() {
        let chat = MockChat::replying("SELEC COUNT(*) FROM employees;");
        let executor = MockExecutor::failing("You have an error in your SQL syntax");

        let (status, response) = post(
            app(chat, executor.clone()),
            r#"{"query": "How many employees are there?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["generated_sql"], "SELEC COUNT(*) FROM employees;");
        assert_eq!(response["query_result"], json!([]));
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("failed to execute SQL"));
        assert!(error.contains("You have an error in your SQL syntax"));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn llm_failure_is_a_500_and_skips_execution() {
        let chat = MockChat::failing("connection refused");
        let executor = MockExecutor::returning(json!([]));

        let (status, response) = post(
            app(chat.clone(), executor.clone()),
            r#"{"query": "How many employees are there?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = response["error"].as_str().unwrap();
        assert!(error.starts_with("failed to generate SQL"));
        assert!(error.contains("connection refused"));
        assert_eq!(response.as_object().unwrap().len(), 1);
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reply_without_content_is_a_500() {
        struct EmptyChat;

        #[async_trait]
        impl ChatCompleter for EmptyChat {
            async fn complete(&self, _prompt: &str, _options: &ChatOptions) -> Result<ChatCompletion, LlmError> {
                Ok(serde_json::from_value(json!({"choices": []})).unwrap())
            }
        }

        let executor = MockExecutor::returning(json!([]));
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(EmptyChat),
            executor.clone(),
            PromptBuilder::new(DEFAULT_SCHEMA).unwrap(),
        );

        let (status, _) = post(
            build_router(Arc::new(state)),
            r#"{"query": "How many employees are there?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn placeholder_reply_is_still_executed() {
        let chat = MockChat::replying("NO_RESULT");
        let executor = MockExecutor::failing("syntax error near 'NO_RESULT'");

        let (status, response) = post(
            app(chat, executor.clone()),
            r#"{"query": "What is the weather today?"}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["generated_sql"], "NO_RESULT");
        assert!(response["error"].is_string());
        assert_eq!(*executor.statements.lock().unwrap(), vec!["NO_RESULT".to_string()]);
    }

    #[tokio::test]
    async fn cross_origin_requests_are_allowed() {
        let chat = MockChat::replying(COUNT_SQL);
        let executor = MockExecutor::returning(json!([]));

        let request = Request::builder()
            .method("POST")
            .uri("/generate_sql")
            .header("origin", "http://localhost:8080")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "count"}"#))
            .unwrap();
        let response = app(chat, executor).oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn health_reports_model() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app(MockChat::replying(COUNT_SQL), MockExecutor::returning(json!([])))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "deepseek-chat");
    }
}
