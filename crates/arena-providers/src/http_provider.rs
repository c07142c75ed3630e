//! Generic HTTP adapter speaking the common OpenAI-compatible chat wire
//! format, reused across vendors through `vendor_tag`/`base_url` rather
//! than vendor-specific request/response codecs (concrete per-vendor
//! codecs are out of scope; this is the single concrete backend).

use std::time::Instant;

use arena_domain::message::{Role, ToolCall};
use arena_domain::provider::{BoxStream, ChatRequest, ChatResponse, FinishReason, StreamChunk, Usage};
use arena_domain::scenario::ModelPricing;
use arena_domain::{Error, Result};
use serde_json::Value;

use crate::auth::AuthRotator;
use crate::traits::LlmProvider;

pub struct HttpProvider {
    id: String,
    base_url: String,
    auth: AuthRotator,
    pricing: ModelPricing,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, auth_env_key: &str, pricing: ModelPricing) -> Result<Self> {
        let id = id.into();
        let auth = AuthRotator::from_env_key(&id, auth_env_key)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Provider {
                provider: id.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            id,
            auth,
            pricing,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(message_to_json).collect();
        let mut body = serde_json::json!({
            "model": req.model,
            "messages": messages,
            "stream": stream,
        });
        if let Some(tools) = &req.tools {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            if !tools.is_empty() {
                body["tools"] = Value::Array(tools);
            }
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        for (k, v) in &req.parameters {
            body[k] = v.clone();
        }
        body
    }

    async fn send(&self, req: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let entry = self.auth.next_key();
        let body = self.build_body(req, stream);
        let resp = self
            .client
            .post(self.chat_url())
            .bearer_auth(&entry.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(&self.id, e))?;
        Ok(resp)
    }
}

fn message_to_json(msg: &arena_domain::message::Message) -> Value {
    match msg.role {
        Role::Tool => {
            let tool_result = msg.tool_result.as_ref();
            serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_result.map(|t| t.id.as_str()).unwrap_or(""),
                "content": msg.content,
            })
        }
        Role::Assistant => {
            let mut obj = serde_json::json!({"role": "assistant", "content": msg.content});
            if let Some(calls) = &msg.tool_calls {
                if !calls.is_empty() {
                    obj["tool_calls"] = Value::Array(
                        calls
                            .iter()
                            .map(|tc| {
                                serde_json::json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {"name": tc.name, "arguments": tc.args.to_string()},
                                })
                            })
                            .collect(),
                    );
                }
            }
            obj
        }
        Role::System => serde_json::json!({"role": "system", "content": msg.content}),
        Role::User => serde_json::json!({"role": "user", "content": msg.content}),
    }
}

fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{provider}: {e}"))
    } else {
        Error::Provider {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

fn parse_finish_reason(s: Option<&str>) -> FinishReason {
    match s {
        Some("length") => FinishReason::Length,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let args_str = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                    let args = serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
                    Some(ToolCall { id, name, args })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_usage(v: &Value) -> Usage {
    Usage {
        prompt_tokens: v.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: v.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        cached_prompt_tokens: v
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    }
}

#[async_trait::async_trait]
impl LlmProvider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let started = Instant::now();
        let resp = self.send(req, false).await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| from_reqwest(&self.id, e))?;

        if !status.is_success() {
            return Err(classify_http_error(&self.id, status.as_u16(), &text));
        }

        let body: Value = serde_json::from_str(&text)?;
        let choice = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .ok_or_else(|| Error::ProviderBadResponse {
                provider: self.id.clone(),
                message: "no choices in response".into(),
            })?;
        let message = choice.get("message").ok_or_else(|| Error::ProviderBadResponse {
            provider: self.id.clone(),
            message: "no message in choice".into(),
        })?;

        let content = message.get("content").and_then(Value::as_str).unwrap_or("").to_string();
        let tool_calls = parse_tool_calls(message);
        let finish_reason = parse_finish_reason(choice.get("finish_reason").and_then(Value::as_str));
        let usage = body.get("usage").map(parse_usage).unwrap_or_default();
        let cost = self.calculate_cost(usage.prompt_tokens, usage.completion_tokens, usage.cached_prompt_tokens);

        Ok(ChatResponse {
            content,
            tool_calls,
            cost,
            latency_ms: started.elapsed().as_millis() as u64,
            finish_reason,
            usage,
        })
    }

    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        // No SSE parser in this crate; non-streaming vendors (and this
        // generic adapter's test double) fall back to a single-chunk
        // stream built from the full response.
        let response = self.chat(req).await?;
        let chunk = StreamChunk {
            delta: Some(response.content.clone()),
            content: Some(response.content),
            tool_calls: if response.tool_calls.is_empty() { None } else { Some(response.tool_calls) },
            media_delta: None,
            tool_call_done: None,
            finish_reason: Some(response.finish_reason),
            usage: Some(response.usage),
        };
        Ok(Box::pin(futures_util::stream::iter(vec![Ok(chunk)])))
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn calculate_cost(&self, input_tokens: u32, output_tokens: u32, cached_tokens: u32) -> f64 {
        self.pricing.calculate_cost(input_tokens, output_tokens, cached_tokens)
    }

    async fn close(&self) {}
}

fn classify_http_error(provider: &str, status: u16, body: &str) -> Error {
    match status {
        429 => Error::ProviderRateLimited {
            provider: provider.to_string(),
            message: body.to_string(),
        },
        401 | 403 => Error::ProviderAuth {
            provider: provider.to_string(),
            message: body.to_string(),
        },
        _ => Error::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {body}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_defaults_to_stop() {
        assert_eq!(parse_finish_reason(None), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("tool_calls")), FinishReason::ToolCalls);
    }

    #[test]
    fn classify_http_error_maps_status_codes() {
        assert!(matches!(
            classify_http_error("p", 429, "slow down"),
            Error::ProviderRateLimited { .. }
        ));
        assert!(matches!(classify_http_error("p", 401, "nope"), Error::ProviderAuth { .. }));
        assert!(matches!(classify_http_error("p", 500, "oops"), Error::Provider { .. }));
    }

    #[test]
    fn calculate_cost_delegates_to_pricing_table() {
        std::env::set_var("ARENA_TEST_HTTP_PROVIDER_KEY", "sk-test");
        let pricing = ModelPricing {
            input_per_1m: 1.0,
            output_per_1m: 2.0,
            cached_input_per_1m: 0.0,
        };
        let provider = HttpProvider::new("p1", "http://localhost", "ARENA_TEST_HTTP_PROVIDER_KEY", pricing).unwrap();
        let cost = provider.calculate_cost(1_000_000, 0, 0);
        assert!((cost - 1.0).abs() < 1e-9);
        std::env::remove_var("ARENA_TEST_HTTP_PROVIDER_KEY");
    }
}
