//! Model collaborator - OpenAI-compatible chat client with function calling.
//!
//! Tool declarations are supplied once, at client construction. Each reply is
//! an explicit discriminated value: either final text or a function call —
//! callers never probe for missing fields.

use crate::error::{RefineError, Result};
use crate::tools::{ChatMessage, FunctionCall, FunctionDefinition};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

/// One model reply, already discriminated.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Text(String),
    FunctionCall {
        name: String,
        args: serde_json::Map<String, Value>,
    },
}

/// The seam the conversation driver consumes; implemented by `ChatSession`
/// and by scripted mocks in tests.
#[async_trait]
pub trait ChatModel: Send {
    async fn send_message(&mut self, prompt: &str) -> Result<ModelReply>;
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    tools: Vec<FunctionDefinition>,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        tools: Vec<FunctionDefinition>,
    ) -> Self {
        Self {
            api_key,
            base_url,
            model,
            tools,
        }
    }

    pub fn from_env(tools: Vec<FunctionDefinition>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| RefineError::Model("OPENAI_API_KEY is not set".to_string()))?;
        let base_url = std::env::var("LLM_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        Ok(Self::new(api_key, model, base_url, tools))
    }

    /// Start a chat session carrying its own message history.
    pub fn start_chat(&self) -> ChatSession {
        ChatSession {
            config: self.clone(),
            http: reqwest::Client::new(),
            messages: Vec::new(),
        }
    }
}

pub struct ChatSession {
    config: LlmClient,
    http: reqwest::Client,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    fn request_body(&self) -> Value {
        let api_messages: Vec<Value> = self
            .messages
            .iter()
            .map(|m| {
                let mut msg = json!({ "role": m.role });
                if let Some(ref content) = m.content {
                    msg["content"] = json!(content);
                }
                if let Some(ref function_call) = m.function_call {
                    msg["function_call"] = json!({
                        "name": function_call.name,
                        "arguments": function_call.arguments,
                    });
                }
                if let Some(ref name) = m.name {
                    msg["name"] = json!(name);
                }
                msg
            })
            .collect();

        let api_functions: Vec<Value> = self
            .config
            .tools
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "messages": api_messages,
            "functions": api_functions,
            "function_call": "auto",
            "temperature": 0.0,
        });

        // Newer model families take max_completion_tokens; older ones max_tokens.
        if self.config.model.starts_with("gpt-5") || self.config.model.contains("o1") {
            body["max_completion_tokens"] = json!(2000);
        } else if self.config.model.starts_with("gpt-4") {
            body["max_completion_tokens"] = json!(1024);
        } else {
            body["max_tokens"] = json!(1024);
        }
        body
    }

    fn reply_from_message(&mut self, message: &Value) -> Result<ModelReply> {
        if let Some(function_call) = message.get("function_call") {
            let name = function_call["name"]
                .as_str()
                .ok_or_else(|| RefineError::Model("No function name in function_call".to_string()))?
                .to_string();
            let arguments = function_call["arguments"]
                .as_str()
                .ok_or_else(|| RefineError::Model("No arguments in function_call".to_string()))?
                .to_string();
            let args = parse_function_args(&arguments)?;

            self.messages.push(ChatMessage::assistant(
                None,
                Some(FunctionCall {
                    name: name.clone(),
                    arguments,
                }),
            ));
            return Ok(ModelReply::FunctionCall { name, args });
        }

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RefineError::Model("Model returned neither text nor a function call".to_string())
            })?
            .to_string();
        self.messages
            .push(ChatMessage::assistant(Some(content.clone()), None));
        Ok(ModelReply::Text(content))
    }
}

impl ChatSession {
    async fn exchange(&self) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body())
            .send()
            .await
            .map_err(|e| RefineError::Model(format!("LLM API call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RefineError::Model(format!(
                "LLM API error ({status}): {error_text}"
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| RefineError::Model(format!("Failed to parse LLM response: {e}")))?;

        if let Some(error) = response_json.get("error") {
            return Err(RefineError::Model(format!("LLM API error: {error}")));
        }

        let choices = response_json
            .get("choices")
            .and_then(Value::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| RefineError::Model("No choices in LLM response".to_string()))?;

        if let Some(finish_reason) = choices[0].get("finish_reason").and_then(Value::as_str) {
            if finish_reason == "length" {
                warn!("LLM response was truncated due to length limit");
            } else if finish_reason == "content_filter" {
                return Err(RefineError::Model(
                    "LLM response was filtered by content policy".to_string(),
                ));
            }
        }

        Ok(choices[0]["message"].clone())
    }
}

#[async_trait]
impl ChatModel for ChatSession {
    async fn send_message(&mut self, prompt: &str) -> Result<ModelReply> {
        // The user message stays in the history only once a reply is
        // obtained, so a retried turn does not send a duplicated prompt.
        self.messages.push(ChatMessage::user(prompt));
        let outcome = match self.exchange().await {
            Ok(message) => self.reply_from_message(&message),
            Err(e) => Err(e),
        };
        if outcome.is_err() {
            self.messages.pop();
        }
        outcome
    }
}

/// Parse the function-call `arguments` JSON string into a flat argument map.
pub fn parse_function_args(arguments: &str) -> Result<serde_json::Map<String, Value>> {
    let parsed: Value = serde_json::from_str(arguments).map_err(|e| {
        RefineError::Model(format!(
            "Failed to parse function call arguments: {e}. Arguments: {arguments}"
        ))
    })?;
    parsed
        .as_object()
        .cloned()
        .ok_or_else(|| {
            RefineError::Model(format!(
                "Function call arguments are not an object: {arguments}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_argument_objects() {
        let args = parse_function_args(r#"{"query": "SELECT 1"}"#).unwrap();
        assert_eq!(args.get("query").and_then(Value::as_str), Some("SELECT 1"));
    }

    #[test]
    fn rejects_non_object_arguments() {
        assert!(parse_function_args("[1, 2]").is_err());
        assert!(parse_function_args("not json").is_err());
    }

    #[test]
    fn function_call_reply_records_assistant_message() {
        let client = LlmClient::new(
            "key".to_string(),
            "gpt-4o".to_string(),
            "http://localhost".to_string(),
            vec![],
        );
        let mut session = client.start_chat();
        let message = serde_json::json!({
            "function_call": {
                "name": "run_sql",
                "arguments": "{\"query\": \"SELECT 1\"}"
            }
        });
        let reply = session.reply_from_message(&message).unwrap();
        match reply {
            ModelReply::FunctionCall { name, args } => {
                assert_eq!(name, "run_sql");
                assert_eq!(args.get("query").and_then(Value::as_str), Some("SELECT 1"));
            }
            other => panic!("expected function call, got {other:?}"),
        }
        assert_eq!(session.messages.len(), 1);
        assert!(session.messages[0].function_call.is_some());
    }

    #[tokio::test]
    async fn transport_failure_leaves_no_dangling_user_message() {
        let client = LlmClient::new(
            "key".to_string(),
            "gpt-4o".to_string(),
            // Nothing listens here; the call fails before any reply.
            "http://127.0.0.1:9".to_string(),
            vec![],
        );
        let mut session = client.start_chat();
        let err = session.send_message("hello").await.unwrap_err();
        assert!(matches!(err, RefineError::Model(_)));
        assert!(session.messages.is_empty());

        // A retry after the failure sends the prompt exactly once.
        session.messages.push(ChatMessage::user("hello"));
        assert_eq!(
            session
                .messages
                .iter()
                .filter(|m| m.content.as_deref() == Some("hello"))
                .count(),
            1
        );
    }

    #[test]
    fn text_reply_is_discriminated_as_text() {
        let client = LlmClient::new(
            "key".to_string(),
            "gpt-4o".to_string(),
            "http://localhost".to_string(),
            vec![],
        );
        let mut session = client.start_chat();
        let message = serde_json::json!({ "content": "There are 10 rows." });
        let reply = session.reply_from_message(&message).unwrap();
        assert_eq!(reply, ModelReply::Text("There are 10 rows.".to_string()));
    }
}
