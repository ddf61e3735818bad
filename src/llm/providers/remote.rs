use crate::config::LlmConfig;
use crate::llm::models::{ChatChunk, ChatCompletion, ChatMessage, ChatOptions, Tool};
use crate::llm::stream::sse_chunks;
use crate::llm::{ChatCompleter, LlmError};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Client for an OpenAI-compatible chat-completions API (DeepSeek by default).
pub struct RemoteChatClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

impl ChatRequest {
    fn new(model: String, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            temperature: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            max_tokens: None,
            stream: false,
            stop: None,
            tools: None,
            tool_choice: None,
        }
    }
}

impl RemoteChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError(
                "API key is required for the chat client".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn completions_url(&self, beta: bool) -> String {
        if beta {
            format!("{}/beta/chat/completions", self.api_url)
        } else {
            format!("{}/chat/completions", self.api_url)
        }
    }

    fn resolve_model(&self, model: Option<&str>) -> String {
        model.unwrap_or(&self.model).to_string()
    }

    // system turn, then history, then the current prompt
    fn build_messages(prompt: &str, options: &ChatOptions) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(options.history.len() + 2);
        messages.push(ChatMessage::system(options.system_prompt.clone()));
        messages.extend(options.history.iter().cloned());
        messages.push(ChatMessage::user(prompt));
        messages
    }

    fn chat_request(&self, prompt: &str, options: &ChatOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            temperature: Some(options.temperature),
            top_p: Some(options.top_p),
            frequency_penalty: Some(options.frequency_penalty),
            presence_penalty: Some(options.presence_penalty),
            max_tokens: options.max_tokens,
            stream,
            ..ChatRequest::new(
                self.resolve_model(options.model.as_deref()),
                Self::build_messages(prompt, options),
            )
        }
    }

    async fn send(&self, url: &str, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        info!("Sending chat request with model: {}", request.model);
        debug!("API URL: {}", url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Chat API responded with status code: {} - {}", status, body);
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn complete_request(&self, url: &str, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        let response = self.send(url, request).await?;

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw chat response: {}", response_text);

        serde_json::from_str::<ChatCompletion>(&response_text).map_err(|e| {
            error!("Failed to parse chat response: {} - Response was: {}", e, response_text);
            LlmError::ResponseError(format!(
                "Failed to parse chat response: {} - Response was: {}",
                e, response_text
            ))
        })
    }

    /// Plain chat completion with optional history and sampling parameters.
    pub async fn chat(&self, prompt: &str, options: &ChatOptions) -> Result<ChatCompletion, LlmError> {
        let request = self.chat_request(prompt, options, false);
        self.complete_request(&self.completions_url(false), &request).await
    }

    /// Same request as [`chat`](Self::chat) but delivered incrementally.
    pub async fn chat_stream(
        &self,
        prompt: &str,
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, Result<ChatChunk, LlmError>>, LlmError> {
        let request = self.chat_request(prompt, options, true);
        let response = self.send(&self.completions_url(false), &request).await?;
        Ok(sse_chunks(Box::pin(response.bytes_stream())).boxed())
    }

    /// Prefix completion (beta): the model continues from `prefix`.
    pub async fn chat_prefix(
        &self,
        prompt: &str,
        prefix: &str,
        stop: Option<Vec<String>>,
        model: Option<&str>,
    ) -> Result<ChatCompletion, LlmError> {
        let request = ChatRequest {
            stop,
            ..ChatRequest::new(
                self.resolve_model(model),
                vec![ChatMessage::user(prompt), ChatMessage::assistant_prefix(prefix)],
            )
        };
        self.complete_request(&self.completions_url(true), &request).await
    }

    /// Lets the model decide whether to call one of `tools`.
    pub async fn chat_with_tools(
        &self,
        prompt: &str,
        tools: Vec<Tool>,
        model: Option<&str>,
    ) -> Result<ChatCompletion, LlmError> {
        let request = ChatRequest {
            tools: Some(tools),
            tool_choice: Some("auto"),
            ..ChatRequest::new(self.resolve_model(model), vec![ChatMessage::user(prompt)])
        };
        self.complete_request(&self.completions_url(false), &request).await
    }
}

#[async_trait]
impl ChatCompleter for RemoteChatClient {
    async fn complete(&self, prompt: &str, options: &ChatOptions) -> Result<ChatCompletion, LlmError> {
        self.chat(prompt, options).await
    }
}
