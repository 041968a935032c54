//! Turn orchestration.
//!
//! One [`Session`] per conversation holds the bounded history window. The
//! [`Orchestrator`] is shared by all sessions and runs a single turn:
//!
//! ```text
//! Idle ──question──▶ Dispatching ──Final Answer──▶ Composing ──▶ Idle
//!                     │   ▲                                      (turn appended)
//!                     ▼   │
//!                  tool invocation
//! ```
//!
//! Taking `&mut Session` keeps a session to one in-flight turn; callers that
//! share sessions across tasks wrap them in a mutex.

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use shopdesk_core::conversation::{ConversationWindow, Turn};

use crate::reasoning::{parse_action, Action, ReasoningEngine, ReasoningRequest, ScratchpadStep};
use crate::tools::{ToolContext, ToolDescriptor, ToolRegistry};

pub const INTERNAL_ERROR_MESSAGE: &str = "处理您的问题时发生了内部错误，请检查后端日志。";
pub const UNPARSABLE_MESSAGE: &str = "抱歉，我暂时无法理解该如何处理这个问题，请换一种方式描述。";
pub const EMPTY_QUESTION_MESSAGE: &str = "请输入您的问题。";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Dispatching,
    Composing,
}

/// Per-conversation state.
#[derive(Debug)]
pub struct Session {
    id: String,
    window: ConversationWindow,
    phase: TurnPhase,
}

impl Session {
    pub fn new(id: impl Into<String>, history_window: usize) -> Self {
        Self {
            id: id.into(),
            window: ConversationWindow::new(history_window),
            phase: TurnPhase::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn history(&self) -> &ConversationWindow {
        &self.window
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }
}

/// Answer to one question.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    /// `false` when the answer is a fallback message; history was not updated.
    pub success: bool,
    pub tool_calls: usize,
}

impl TurnOutcome {
    fn failed(answer: &str, tool_calls: usize) -> Self {
        Self {
            answer: answer.to_string(),
            success: false,
            tool_calls,
        }
    }
}

pub struct Orchestrator {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolRegistry>,
    descriptors: Vec<ToolDescriptor>,
    ctx: ToolContext,
    max_parse_retries: usize,
}

impl Orchestrator {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<ToolRegistry>,
        ctx: ToolContext,
        max_parse_retries: usize,
    ) -> Self {
        let descriptors = tools.descriptors();
        Self {
            engine,
            tools,
            descriptors,
            ctx,
            max_parse_retries,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn tool_context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Answer one question in `session`.
    ///
    /// Never fails: engine errors, unparsable output and a panicking tool
    /// become fallback text with `success = false`. Only a successful turn
    /// is appended to the session's history.
    #[instrument(skip(self, session), fields(session = %session.id))]
    pub async fn handle_question(&self, session: &mut Session, question: &str) -> TurnOutcome {
        let question = question.trim();
        if question.is_empty() {
            return TurnOutcome::failed(EMPTY_QUESTION_MESSAGE, 0);
        }

        session.phase = TurnPhase::Dispatching;
        let outcome = AssertUnwindSafe(self.dispatch(session, question))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                error!("turn panicked");
                TurnOutcome::failed(INTERNAL_ERROR_MESSAGE, 0)
            });
        if outcome.success {
            session.phase = TurnPhase::Composing;
            session.window.push(Turn::new(question, outcome.answer.clone()));
        }
        session.phase = TurnPhase::Idle;

        info!(
            success = outcome.success,
            tool_calls = outcome.tool_calls,
            history = session.window.len(),
            "turn finished"
        );
        outcome
    }

    async fn dispatch(&self, session: &Session, question: &str) -> TurnOutcome {
        let history: Vec<Turn> = session.window.turns().cloned().collect();
        let mut scratchpad: Vec<ScratchpadStep> = Vec::new();
        let mut tool_calls = 0;
        let mut parse_failures = 0;

        loop {
            let request = ReasoningRequest {
                question,
                history: &history,
                tools: &self.descriptors,
                scratchpad: &scratchpad,
            };

            let raw = match self.engine.next_action(&request).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!(error = %e, "reasoning engine failed");
                    return TurnOutcome::failed(INTERNAL_ERROR_MESSAGE, tool_calls);
                }
            };

            match parse_action(&raw) {
                Ok(Action::Final(answer)) => {
                    return TurnOutcome {
                        answer,
                        success: true,
                        tool_calls,
                    };
                }
                Ok(Action::Tool { name, input }) => {
                    parse_failures = 0;
                    tool_calls += 1;
                    info!(tool = %name, input = %compact(&input), "dispatching tool");
                    let observation = self.tools.invoke(&name, &input, &self.ctx).await;
                    scratchpad.push(ScratchpadStep {
                        action: raw,
                        observation,
                    });
                }
                Err(e) => {
                    parse_failures += 1;
                    warn!(error = %e, attempt = parse_failures, "unparsable reasoning output");
                    if parse_failures > self.max_parse_retries {
                        return TurnOutcome::failed(UNPARSABLE_MESSAGE, tool_calls);
                    }
                    scratchpad.push(ScratchpadStep {
                        action: raw,
                        observation: format!(
                            "输出格式错误（{}）。请只输出一个包含 \"action\" 和 \"action_input\" 字段的 JSON 对象。",
                            e
                        ),
                    });
                }
            }
        }
    }
}

fn compact(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > 200 {
        let cut: String = s.chars().take(200).collect();
        format!("{}…", cut)
    } else {
        s
    }
}
