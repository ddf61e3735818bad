use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use nl2sql_gateway::config::{AppConfig, CliArgs};
use nl2sql_gateway::db::mysql::MySqlExecutor;
use nl2sql_gateway::llm::prompt::PromptBuilder;
use nl2sql_gateway::llm::providers::remote::RemoteChatClient;
use nl2sql_gateway::util::logging::init_tracing;
use nl2sql_gateway::web;
use nl2sql_gateway::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up DEEPSEEK_API_KEY and friends from .env
    dotenv::dotenv().ok();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_json);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let prompts = PromptBuilder::from_config(&config.llm)?;

    info!("Initializing chat client for model: {}", config.llm.model);
    let chat = RemoteChatClient::new(&config.llm)?;

    let executor = MySqlExecutor::new(&config.database);
    if config.database.read_only {
        info!("Read-only statement guard enabled");
    }

    let app_state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(chat),
        Arc::new(executor),
        prompts,
    ));

    // Start the web server
    info!("Starting nl2sql-gateway on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
