use crate::config::LlmConfig;
use crate::llm::LlmError;
use minijinja::{context, Environment};
use tracing::{debug, info};

/// Schema descriptor used when no `llm.schema_path` is configured.
pub const DEFAULT_SCHEMA: &str = include_str!("../../assets/hr_schema.txt");

/// What the model is told to answer when no table fits the question.
pub const NO_RESULT_PLACEHOLDER: &str = "NO_RESULT";

const TEMPLATE_NAME: &str = "sql_prompt";

const SQL_PROMPT_TEMPLATE: &str = r#"{{ schema }}

You are a SQL generation assistant. Write a MySQL query that answers the user's question using the tables above.
Case 1: reply with exactly one SQL statement on a single line, ending with a semicolon. No explanation, no comments, no line breaks, no code fences.
Case 2: if no table above is relevant to the question, reply with exactly {{ placeholder }}.

User question: {{ question }}"#;

/// Renders the per-request prompt. Holds only immutable data, so one
/// instance is shared by every request.
pub struct PromptBuilder {
    env: Environment<'static>,
    schema: String,
}

impl PromptBuilder {
    pub fn new(schema: impl Into<String>) -> Result<Self, LlmError> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, SQL_PROMPT_TEMPLATE)
            .map_err(|e| LlmError::ConfigError(format!("Invalid prompt template: {}", e)))?;

        Ok(Self {
            env,
            schema: schema.into(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        match &config.schema_path {
            Some(path) => {
                info!("Loading schema descriptor from {}", path.display());
                let schema = std::fs::read_to_string(path).map_err(|e| {
                    LlmError::ConfigError(format!(
                        "Failed to read schema descriptor {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::new(schema)
            }
            None => Self::new(DEFAULT_SCHEMA),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn build(&self, question: &str) -> Result<String, LlmError> {
        let template = self
            .env
            .get_template(TEMPLATE_NAME)
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        let prompt = template
            .render(context! {
                schema => self.schema.as_str(),
                placeholder => NO_RESULT_PLACEHOLDER,
                question => question,
            })
            .map_err(|e| LlmError::ConfigError(format!("Failed to render prompt: {}", e)))?;

        debug!("Prepared LLM prompt: {}", prompt);
        Ok(prompt)
    }
}
