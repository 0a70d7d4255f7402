//! OpenAI-compatible chat completion client (`{base_url}/chat/completions`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolCall, ToolSchema, Usage};
use crate::config::LlmConfig;

/// Client for any endpoint implementing the chat-completions API.
///
/// `reqwest::Client` is reference counted, so this is cheap to clone.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    completions_url: String,
    api_key: String,
    temperature: Option<f32>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            completions_url: completions_url(&config.base_url),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }
}

fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse, LlmError> {
        let payload = ChatCompletionRequest {
            model,
            messages,
            tools: tools.filter(|t| !t.is_empty()),
            temperature: self.temperature,
        };

        tracing::debug!(
            model = %model,
            messages = messages.len(),
            tools = tools.map(|t| t.len()).unwrap_or(0),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|env| env.error.message)
                .unwrap_or(body);
            tracing::warn!(status = %status, "Chat completion returned an error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        Ok(ChatResponse {
            content: choice.message.content.filter(|c| !c.trim().is_empty()),
            tool_calls: choice.message.tool_calls.filter(|c| !c.is_empty()),
            usage: parsed.usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn client(base_url: String) -> OpenAiCompatibleClient {
        OpenAiCompatibleClient::new(&LlmConfig {
            base_url,
            api_key: "sk-test".to_string(),
            model: "test-model".to_string(),
            timeout_secs: 5,
            temperature: None,
        })
        .unwrap()
    }

    #[test]
    fn completions_url_is_normalized() {
        assert_eq!(
            completions_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://x/v1/chat/completions"),
            "http://x/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn parses_tool_calls_and_sends_tools() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["tools"][0]["function"]["name"], "calculate");
                assert!(body.get("temperature").is_none());
                Json(json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_9",
                                "type": "function",
                                "function": {"name": "calculate", "arguments": "{\"expression\":\"2+2\"}"}
                            }]
                        }
                    }],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 3}
                }))
            }),
        );
        let base = spawn(router).await;

        let tools = vec![ToolSchema {
            schema_type: "function".to_string(),
            function: super::super::FunctionSchema {
                name: "calculate".to_string(),
                description: "math".to_string(),
                parameters: json!({"type": "object"}),
            },
        }];
        let response = client(base)
            .chat_completion("test-model", &[ChatMessage::user("2+2?")], Some(&tools))
            .await
            .expect("completion");

        assert_eq!(response.content, None);
        let calls = response.tool_calls.expect("tool calls");
        assert_eq!(calls[0].id, "call_9");
        assert_eq!(calls[0].function.name, "calculate");
        assert_eq!(
            response.usage,
            Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 3
            })
        );
    }

    #[tokio::test]
    async fn surfaces_provider_error_message() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "bad key", "type": "auth"}})),
                )
            }),
        );
        let base = spawn(router).await;

        let err = client(base)
            .chat_completion("test-model", &[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        match err {
            LlmError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
