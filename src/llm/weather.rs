use super::{AgentError, ChatMessage};
use crate::config::ChatConfig;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct WeatherAgentConfig {
    pub endpoint: String,
    pub run_id: String,
    pub resource_id: String,
    pub thread_id: String,
    pub max_retries: u32,
    pub max_steps: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&ChatConfig> for WeatherAgentConfig {
    fn from(config: &ChatConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            run_id: config.run_id.clone(),
            resource_id: config.resource_id.clone(),
            thread_id: config.thread_id.clone(),
            max_retries: config.max_retries,
            max_steps: config.max_steps,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    messages: Vec<ChatMessage>,
    run_id: String,
    max_retries: u32,
    max_steps: u32,
    temperature: f32,
    top_p: f32,
    runtime_context: serde_json::Map<String, serde_json::Value>,
    thread_id: String,
    resource_id: String,
}

/// HTTP client for the weather agent's streaming endpoint.
#[derive(Debug, Clone)]
pub struct WeatherAgentClient {
    client: Client,
    config: WeatherAgentConfig,
}

impl WeatherAgentClient {
    pub fn new(config: WeatherAgentConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &WeatherAgentConfig {
        &self.config
    }

    /// The agent only sees the newest user message; it keeps the thread on its side.
    pub fn build_request(&self, content: &str) -> AgentRequest {
        AgentRequest {
            messages: vec![ChatMessage::user(content)],
            run_id: self.config.run_id.clone(),
            max_retries: self.config.max_retries,
            max_steps: self.config.max_steps,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            runtime_context: serde_json::Map::new(),
            thread_id: self.config.thread_id.clone(),
            resource_id: self.config.resource_id.clone(),
        }
    }

    /// Send one user message and return the response once headers arrive.
    ///
    /// The body is left unread for the caller to stream.
    pub async fn open_stream(&self, content: &str) -> Result<Response, AgentError> {
        let body = self.build_request(content);
        info!(endpoint = %self.config.endpoint, "sending message to agent");

        let resp = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", "*/*")
            .header("Accept-Language", "en-GB,en-US;q=0.9,en;q=0.8,fr;q=0.7")
            .header("x-mastra-dev-playground", "true")
            .json(&body)
            .send()
            .await?;

        debug!(status = %resp.status(), "agent responded");

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Api {
                status,
                message: text,
            });
        }

        if resp.status() == StatusCode::NO_CONTENT {
            return Err(AgentError::EmptyBody);
        }

        Ok(resp)
    }
}
