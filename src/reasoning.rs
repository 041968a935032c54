//! Reasoning engines and the JSON action protocol.
//!
//! A [`ReasoningEngine`] sees the conversation history, the tool
//! descriptors, the current question and the turn's scratchpad, and answers
//! with raw text. That text must contain one JSON object:
//!
//! ```json
//! {"action": "query_order", "action_input": {"order_id": "12345"}}
//! {"action": "Final Answer", "action_input": "您的订单已签收。"}
//! ```
//!
//! [`parse_action`] turns the text into an [`Action`]; the orchestrator owns
//! the loop around it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use shopdesk_core::conversation::Turn;

use crate::config::ReasoningConfig;
use crate::embedding::post_with_retry;
use crate::tools::ToolDescriptor;

/// Action name that ends a turn.
pub const FINAL_ANSWER: &str = "Final Answer";

/// One tool call (or rejected output) earlier in the current turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchpadStep {
    /// Raw engine output for this step.
    pub action: String,
    /// Tool result, or the parse error fed back to the engine.
    pub observation: String,
}

/// Everything an engine may look at for one decision.
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub question: &'a str,
    /// Completed turns, oldest first.
    pub history: &'a [Turn],
    pub tools: &'a [ToolDescriptor],
    pub scratchpad: &'a [ScratchpadStep],
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Produce the next action as raw text.
    async fn next_action(&self, request: &ReasoningRequest<'_>) -> Result<String>;
}

/// A parsed engine decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Tool { name: String, input: Value },
    Final(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ActionParseError {
    #[error("no JSON object found in the output")]
    NoJson,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing string field \"action\"")]
    MissingAction,
    #[error("final answer has no \"action_input\"")]
    EmptyFinalAnswer,
}

/// Locate the JSON object in free-form model output.
///
/// Prefers a fenced ```` ```json ```` block; otherwise takes the span from
/// the first `{` to the last `}`.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        if let Some(end) = body.find("```") {
            let inner = body[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn parse_action(raw: &str) -> Result<Action, ActionParseError> {
    let body = extract_json(raw).ok_or(ActionParseError::NoJson)?;
    let value: Value =
        serde_json::from_str(body).map_err(|e| ActionParseError::InvalidJson(e.to_string()))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or(ActionParseError::MissingAction)?;
    let input = value.get("action_input").cloned().unwrap_or(Value::Null);

    if action.eq_ignore_ascii_case(FINAL_ANSWER) {
        let answer = match input {
            Value::String(s) => s,
            Value::Null => return Err(ActionParseError::EmptyFinalAnswer),
            other => other.to_string(),
        };
        if answer.trim().is_empty() {
            return Err(ActionParseError::EmptyFinalAnswer);
        }
        return Ok(Action::Final(answer.trim().to_string()));
    }

    Ok(Action::Tool {
        name: action.to_string(),
        input,
    })
}

// ============ Disabled ============

pub struct DisabledReasoningEngine;

#[async_trait]
impl ReasoningEngine for DisabledReasoningEngine {
    async fn next_action(&self, _request: &ReasoningRequest<'_>) -> Result<String> {
        Err(anyhow!("Reasoning provider is disabled"))
    }
}

// ============ OpenAI-compatible chat ============

/// Chat-completions client for any OpenAI-compatible endpoint.
///
/// Stops calling the model once a turn's scratchpad reaches `max_steps`
/// and answers with a fixed final answer instead.
pub struct ChatReasoningEngine {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    max_steps: usize,
}

const STEP_LIMIT_ANSWER: &str = "抱歉，这个问题需要的查询步骤过多，请尝试换一种更具体的问法。";

impl ChatReasoningEngine {
    pub fn new(config: &ReasoningConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("reasoning.model required for openai provider"))?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "no API key in environment, sending unauthenticated requests"
            );
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            max_steps: config.max_steps,
        })
    }
}

fn system_prompt(tools: &[ToolDescriptor]) -> String {
    let mut prompt = String::from(
        "你是一个电商平台的智能客服助手，负责回答顾客关于订单和商品的问题。\n\
         你可以使用以下工具：\n\n",
    );
    for t in tools {
        prompt.push_str(&format!("> {}: {}\n  参数: {}\n", t.name, t.description, t.parameters));
    }
    prompt.push_str(
        "\n每次回复必须且只能是一个 JSON 对象，格式如下：\n\
         {\"action\": \"<工具名称>\", \"action_input\": {<参数>}}\n\
         当你已经可以回答顾客时，使用：\n\
         {\"action\": \"Final Answer\", \"action_input\": \"<给顾客的最终回复>\"}\n\
         不要编造订单或商品信息，所有事实都必须来自工具返回的结果。",
    );
    prompt
}

/// Assemble the chat transcript for one decision.
pub fn build_messages(request: &ReasoningRequest<'_>) -> Vec<Value> {
    let mut messages = vec![json!({"role": "system", "content": system_prompt(request.tools)})];
    for turn in request.history {
        messages.push(json!({"role": "user", "content": turn.question}));
        messages.push(json!({"role": "assistant", "content": turn.answer}));
    }
    messages.push(json!({"role": "user", "content": request.question}));
    for step in request.scratchpad {
        messages.push(json!({"role": "assistant", "content": step.action}));
        messages.push(json!({
            "role": "user",
            "content": format!(
                "工具返回结果：\n{}\n\n请根据以上结果继续，仍然只输出一个 JSON 对象。",
                step.observation
            )
        }));
    }
    messages
}

#[async_trait]
impl ReasoningEngine for ChatReasoningEngine {
    async fn next_action(&self, request: &ReasoningRequest<'_>) -> Result<String> {
        if request.scratchpad.len() >= self.max_steps {
            warn!(steps = request.scratchpad.len(), "step limit reached, ending turn");
            return Ok(json!({"action": FINAL_ANSWER, "action_input": STEP_LIMIT_ANSWER}).to_string());
        }

        let body = json!({
            "model": self.model,
            "messages": build_messages(request),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let http = || {
            let builder = self.client.post(&self.endpoint).json(&body);
            match &self.api_key {
                Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
                None => builder,
            }
        };

        let json = post_with_retry("Chat", http, self.max_retries).await?;
        let content = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Invalid chat response: missing choices[0].message.content"))?;
        debug!(content, "reasoning output");
        Ok(content.to_string())
    }
}

/// Create the configured reasoning engine.
pub fn create_engine(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningEngine>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledReasoningEngine)),
        "openai" => Ok(Arc::new(ChatReasoningEngine::new(config)?)),
        other => anyhow::bail!("Unknown reasoning provider: {}", other),
    }
}
