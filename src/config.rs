use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable the LLM API key is read from.
pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    /// 0 opens a fresh connection per query; anything else sizes a pool.
    pub pool_size: u32,
    pub connect_timeout_secs: u64,
    /// Bounds the wait for results only. On expiry the connection is dropped,
    /// but MySQL keeps executing the statement until it finishes; pair this
    /// with `max_execution_time` on the server for a hard limit.
    pub query_timeout_secs: u64,
    /// Reject anything but a single read statement before it reaches MySQL.
    pub read_only: bool,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Replaces the built-in schema descriptor when set.
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Emit logs as newline-delimited JSON
    #[arg(long)]
    pub log_json: bool,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Self::defaults(Config::builder())?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl2sql-gateway/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NL2SQL__DATABASE__HOST=db.internal and friends
        config_builder = config_builder.add_source(
            Environment::with_prefix("NL2SQL")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.llm.api_key = key;
        }

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("web.host", "0.0.0.0")?
            .set_default("web.port", 5678)?
            .set_default("database.host", "127.0.0.1")?
            .set_default("database.port", 3306)?
            .set_default("database.user", "root")?
            .set_default("database.password", "")?
            .set_default("database.name", "hr_data")?
            .set_default("database.pool_size", 0)?
            .set_default("database.connect_timeout_secs", 10)?
            .set_default("database.query_timeout_secs", 30)?
            .set_default("database.read_only", false)?
            .set_default("llm.api_url", "https://api.deepseek.com")?
            .set_default("llm.api_key", "")?
            .set_default("llm.model", "deepseek-chat")?
            .set_default("llm.timeout_secs", 60)
    }

    /// The service refuses to start without an LLM key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::Message(format!(
                "{} is not set; add it to the environment or .env",
                API_KEY_ENV
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: "127.0.0.1".to_string(),
                port: 3306,
                user: "root".to_string(),
                password: String::new(),
                name: "hr_data".to_string(),
                pool_size: 0,
                connect_timeout_secs: 10,
                query_timeout_secs: 30,
                read_only: false,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 5678,
            },
            llm: LlmConfig {
                api_url: "https://api.deepseek.com".to_string(),
                api_key: "test-key".to_string(),
                model: "deepseek-chat".to_string(),
                timeout_secs: 60,
                schema_path: None,
            },
        }
    }
}
