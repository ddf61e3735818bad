use crate::config::AppConfig;
use crate::db::QueryExecutor;
use crate::llm::prompt::PromptBuilder;
use crate::llm::ChatCompleter;
use std::sync::Arc;

/// Shared application state for the web server.
///
/// Everything in here is read-only after startup; each request brings its
/// own database connection through the executor.
pub struct AppState {
    pub config: AppConfig,
    pub chat: Arc<dyn ChatCompleter>,
    pub executor: Arc<dyn QueryExecutor>,
    pub prompts: PromptBuilder,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        chat: Arc<dyn ChatCompleter>,
        executor: Arc<dyn QueryExecutor>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            config,
            chat,
            executor,
            prompts,
        }
    }
}
