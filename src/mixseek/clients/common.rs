//! Shared utilities used across provider client implementations.
//!
//! Every provider wrapper in this crate speaks an OpenAI-compatible HTTP
//! surface, so the helpers here carry the common logic: a tuned [`reqwest`]
//! client with persistent connection pooling, a plain chat-completions path
//! via `openai-rust2`, a native function-calling path speaking the `tools`
//! wire format directly, and the error classification the orchestrator's
//! retry policy depends on.

use crate::mixseek::client_wrapper::{Message, NativeToolCall, Role, TokenUsage, ToolDefinition};
use lazy_static::lazy_static;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use std::error::Error;
use std::time::Duration;
use tokio::sync::Mutex;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling.
    ///
    /// The single client instance keeps TLS sessions and DNS lookups warm,
    /// which matters when several teams issue concurrent requests to the same
    /// provider.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = {
        reqwest::ClientBuilder::new()
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build shared HTTP client")
    };
}

/// Borrow the lazily initialised shared [`reqwest::Client`].
pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

fn role_string(role: &Role) -> String {
    match role {
        Role::System => "system".to_owned(),
        Role::User => "user".to_owned(),
        Role::Assistant => "assistant".to_owned(),
        Role::Tool { .. } => "tool".to_owned(),
    }
}

/// Send a plain chat completion request, persist token usage, and surface the
/// assistant content.
///
/// Used for requests without native tools; shared by every OpenAI-compatible
/// endpoint (OpenAI, Anthropic via the compatibility surface, Gemini, xAI
/// Grok).
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    messages: &[Message],
    url_path: Option<String>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let formatted: Vec<chat::Message> = messages
        .iter()
        .map(|msg| chat::Message {
            role: role_string(&msg.role),
            content: msg.content.to_string(),
        })
        .collect();

    let chat_arguments = chat::ChatArguments::new(model, formatted);
    let response = api.create_chat(chat_arguments, url_path).await;

    match response {
        Ok(response) => {
            let usage = TokenUsage {
                input_tokens: response.usage.prompt_tokens as usize,
                output_tokens: response.usage.completion_tokens as usize,
                total_tokens: response.usage.total_tokens as usize,
            };
            *usage_slot.lock().await = Some(usage);
            Ok(response.choices[0].message.content.clone())
        }
        Err(err) => {
            if log::log_enabled!(log::Level::Error) {
                log::error!("clients::common::send_and_track: API error: {}", err);
            }
            Err(format!("{}", err).into())
        }
    }
}

/// Sampling parameters applied to a chat request.
///
/// These come out of configuration (per-member or per-metric with the
/// default fallback chain) and ride the direct wire path.
#[derive(Debug, Clone, Default)]
pub struct ClientSampling {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
    pub stop_sequences: Option<Vec<String>>,
}

impl ClientSampling {
    /// Whether any parameter is set; unset sampling falls back to the plain
    /// SDK path.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.max_tokens.is_none()
            && self.top_p.is_none()
            && self.seed.is_none()
            && self.stop_sequences.is_none()
    }
}

/// Send a chat completion request carrying native tool definitions and/or
/// sampling parameters.
///
/// `openai-rust2` does not expose the `tools` array, so this path speaks the
/// wire format directly through the shared HTTP client. The response may
/// carry `tool_calls` instead of (or alongside) text content; both are
/// surfaced on the returned [`Message`].
pub async fn send_chat_direct(
    api_key: &str,
    base_url: &str,
    model: &str,
    messages: &[Message],
    tools: Option<&[ToolDefinition]>,
    sampling: Option<&ClientSampling>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<Message, Box<dyn Error + Send + Sync>> {
    let wire_messages: Vec<serde_json::Value> = messages
        .iter()
        .map(|msg| match &msg.role {
            Role::Tool { call_id } => serde_json::json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": msg.content.as_ref(),
            }),
            Role::Assistant if !msg.tool_calls.is_empty() => serde_json::json!({
                "role": "assistant",
                "content": msg.content.as_ref(),
                "tool_calls": msg.tool_calls.iter().map(|tc| serde_json::json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.name,
                        "arguments": tc.arguments.to_string(),
                    }
                })).collect::<Vec<_>>(),
            }),
            role => serde_json::json!({
                "role": role_string(role),
                "content": msg.content.as_ref(),
            }),
        })
        .collect();

    let mut request_body = serde_json::json!({
        "model": model,
        "messages": wire_messages,
    });

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        let wire_tools: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect();
        request_body["tools"] = serde_json::Value::Array(wire_tools);
    }

    if let Some(sampling) = sampling {
        if let Some(temperature) = sampling.temperature {
            request_body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = sampling.max_tokens {
            request_body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(top_p) = sampling.top_p {
            request_body["top_p"] = serde_json::json!(top_p);
        }
        if let Some(seed) = sampling.seed {
            request_body["seed"] = serde_json::json!(seed);
        }
        if let Some(stop) = &sampling.stop_sequences {
            request_body["stop"] = serde_json::json!(stop);
        }
    }

    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let response = get_shared_http_client()
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&request_body)
        .send()
        .await
        .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;

    let response_text = response
        .text()
        .await
        .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
    let response_json: serde_json::Value = serde_json::from_str(&response_text)
        .map_err(|e| format!("malformed provider response: {}", e))?;

    if let Some(error) = response_json.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("provider returned an error");
        return Err(message.to_string().into());
    }

    if let Some(usage) = response_json.get("usage") {
        let input = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let output = usage
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        *usage_slot.lock().await = Some(TokenUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        });
    }

    let message = response_json
        .pointer("/choices/0/message")
        .ok_or("no choices in provider response")?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        for call in calls {
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let name = call
                .pointer("/function/name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let raw_args = call
                .pointer("/function/arguments")
                .and_then(|v| v.as_str())
                .unwrap_or("{}");
            let arguments = serde_json::from_str(raw_args)
                .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
            tool_calls.push(NativeToolCall {
                id,
                name,
                arguments,
            });
        }
    }

    Ok(Message {
        role: Role::Assistant,
        content: std::sync::Arc::from(content.as_str()),
        tool_calls,
    })
}

/// Whether an error anywhere in the source chain is a transient HTTP fault
/// (read timeout, connect failure, interrupted request body).
///
/// This drives the orchestrator's exponential-backoff retry path; anything
/// not recognised here is treated as final on first occurrence.
pub fn is_transient_error(err: &(dyn Error + 'static)) -> bool {
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(re) = e.downcast_ref::<reqwest::Error>() {
            return re.is_timeout() || re.is_connect() || re.is_request();
        }
        current = e.source();
    }
    // Error chains that crossed a string boundary keep a recognisable marker.
    let text = err.to_string();
    text.contains("ReadError") || text.contains("connection reset") || text.contains("timed out")
}

/// Whether a provider error message indicates the model's token limit was
/// exceeded. These are terminal: never retried.
pub fn is_token_limit_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("maximum context length")
        || lower.contains("context window")
        || lower.contains("token limit")
}
