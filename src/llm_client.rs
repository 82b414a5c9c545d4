//! OpenAI-compatible chat-completions client.
//!
//! The turn pipeline only depends on the [`CompletionBackend`] trait so
//! tests can script replies; [`LlmClient`] is the production implementation
//! speaking the `/chat/completions` wire format with JSON-object response
//! forcing and function-calling tool schemas.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::tools::ToolDef;

/// One message on the chat-completions wire. Also the in-memory
/// representation of a conversation turn: history is an append-only
/// sequence of these, never reordered or truncated within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text("assistant", content)
    }

    /// Assistant turn carrying the model's raw tool-invocation request
    /// (no visible text).
    pub fn assistant_tool_request(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Tool turn carrying a tool's string result (or error payload).
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Tool call as requested by the model (OpenAI format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON string; parsed (and error-handled) by the tool registry.
    pub arguments: String,
}

/// The model's answer for one round: either a final content string or a
/// batch of tool-invocation requests to execute and feed back.
#[derive(Debug, Clone, Default)]
pub struct AssistantReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Abstract language-model backend consumed by the turn pipeline.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// One structured model round: full message list in, final text or
    /// tool requests out. The reply content is expected to be a single
    /// JSON object when no tools are requested.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantReply>;
}

/// Production backend speaking the OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for LLM backend")?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<AssistantReply> {
        let url = format!("{}/chat/completions", self.api_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "response_format": { "type": "json_object" },
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }

        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await.context("Failed to send LLM request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, body);
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let message = response_json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .map(|choice| &choice["message"])
            .context("Empty choices in LLM response")?;

        let content = message["content"].as_str().map(String::from);
        let tool_calls: Vec<ToolCallRequest> = message
            .get("tool_calls")
            .and_then(|tc| serde_json::from_value(tc.clone()).ok())
            .unwrap_or_default();

        Ok(AssistantReply {
            content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serialization_omits_tool_fields() {
        let msg = ChatMessage::user("안녕");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "안녕");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn tool_request_message_serialization() {
        let msg = ChatMessage::assistant_tool_request(vec![ToolCallRequest {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "lookup_reference_tools".to_string(),
                arguments: r#"{"category": "협업"}"#.to_string(),
            },
        }]);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(
            json["tool_calls"][0]["function"]["name"],
            "lookup_reference_tools"
        );
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool("call_1", "{\"tools\": []}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn reply_with_tool_calls_requests_tools() {
        let reply = AssistantReply {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_string(),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: "list_reference_categories".to_string(),
                    arguments: "{}".to_string(),
                },
            }],
        };
        assert!(reply.requests_tools());
        assert!(!AssistantReply::default().requests_tools());
    }
}
