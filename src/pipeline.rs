//! The turn-processing pipeline.
//!
//! One user utterance in, one classified assistant reply out. The pipeline
//! drives the structured exchange with the model backend — including the
//! bounded tool-invocation loop — then commits history, transcript, and
//! counters as one logical step. A backend failure before commit leaves the
//! stored conversation exactly as it was, so the client can safely resend;
//! a log or counter failure after commit degrades to diagnostics and never
//! takes the conversation down with it.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::{ChatMessage, CompletionBackend};
use crate::log_store::{LogEntry, LogStore, UserLogPaths};
use crate::scaffolding::ScaffoldingType;
use crate::session::SessionStore;
use crate::tools::ToolRegistry;

/// Shown when the model's final answer is not a valid JSON object.
pub const FALLBACK_PARSE_TEXT: &str = "AI 응답 형식에 오류가 발생했어. 잠시 후 다시 시도해 봐.";
/// Shown when the JSON object lacks a `response_text` field.
pub const FALLBACK_MISSING_TEXT: &str = "AI 응답 생성에 실패했습니다.";
/// Transcript-only label for unparseable replies; normalized to
/// `Unclassified` before counting.
const PARSE_FAILURE_LABEL: &str = "JSON 파싱 실패";

const NUDGE_FALLBACK_TEXT: &str = "다시 시도해 주세요.";
const NUDGE_PROMPT: &str = "5분 동안 사용자로부터 응답이 없습니다. 프롬프트 규칙 1번(침묵 감지 및 재촉)에 따라, \
    '지금 어디까지 생각해봤거나 어디까지 진행되었어? 하면서 어떤 부분이 어렵니?'와 같은 내용으로 \
    사용자의 대화를 재촉하는 메시지를 생성하세요.";

/// Closed failure set of one turn. Display strings are what the caller may
/// show to the participant; internals only ever reach tracing and the
/// `System_Error` transcript channel.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("세션 오류. 다시 로그인해주세요.")]
    Session,
    #[error("AI 클라이언트 초기화 실패. API 키 설정 오류일 수 있습니다.")]
    BackendUnavailable,
    #[error("AI 응답을 가져오는 데 실패했습니다. 다시 시도해 주세요.")]
    Backend(#[source] anyhow::Error),
    #[error("도구 호출 횟수가 한도({0}회)를 초과했습니다. 다시 시도해 주세요.")]
    ToolLoopExceeded(usize),
}

/// A final model reply after classification and sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedReply {
    pub response_text: String,
    /// Category charged to the counters; always one of the closed six.
    pub counted: ScaffoldingType,
    /// Label written to the transcript; may be the reporting-only
    /// parse-failure marker.
    pub transcript_label: String,
}

pub struct TurnPipeline {
    backend: Option<Arc<dyn CompletionBackend>>,
    tools: Arc<ToolRegistry>,
    system_context: String,
    sessions: Arc<SessionStore>,
    log_store: Arc<LogStore>,
    max_tool_rounds: usize,
}

impl TurnPipeline {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        tools: Arc<ToolRegistry>,
        system_context: String,
        sessions: Arc<SessionStore>,
        log_store: Arc<LogStore>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            backend,
            tools,
            system_context,
            sessions,
            log_store,
            max_tool_rounds,
        }
    }

    /// Process one user turn to completion.
    pub async fn process_turn(
        &self,
        session_id: Uuid,
        user_text: &str,
    ) -> Result<String, TurnError> {
        let snapshot = self
            .sessions
            .snapshot(session_id)
            .await
            .ok_or(TurnError::Session)?;
        let backend = self.backend.as_deref().ok_or(TurnError::BackendUnavailable)?;

        // Tentative: the stored history is only replaced at commit, so an
        // aborted turn leaves it untouched.
        let mut working = snapshot.history;
        working.push(ChatMessage::user(user_text));

        let final_content = match self.run_model_rounds(backend, &mut working).await {
            Ok(content) => content,
            Err(err) => {
                self.log_turn_failure(&snapshot.paths, &err);
                return Err(err);
            }
        };

        let reply = classify_final_reply(final_content.as_deref());

        working.push(ChatMessage::assistant(reply.response_text.clone()));
        if !self.sessions.commit_history(session_id, working).await {
            tracing::warn!("Session {} vanished before commit; reply still logged", session_id);
        }

        self.record_committed_turn(&snapshot.paths, Some(user_text), &reply);
        Ok(reply.response_text)
    }

    /// Generate a nudge after client-detected inactivity.
    ///
    /// The synthetic prompt is injected ahead of the stored history and is
    /// never persisted as a user turn; only the resulting assistant turn is
    /// appended, logged, and counted. Tool calling is disabled for nudges.
    pub async fn process_idle_nudge(&self, session_id: Uuid) -> Result<String, TurnError> {
        let snapshot = self
            .sessions
            .snapshot(session_id)
            .await
            .ok_or(TurnError::Session)?;
        let backend = self.backend.as_deref().ok_or(TurnError::BackendUnavailable)?;

        let mut messages = vec![
            ChatMessage::system(self.system_context.clone()),
            ChatMessage::user(NUDGE_PROMPT),
        ];
        messages.extend(snapshot.history.iter().cloned());

        let model_reply = match backend.complete(&messages, &[]).await {
            Ok(reply) => reply,
            Err(e) => {
                let err = TurnError::Backend(e);
                self.log_turn_failure(&snapshot.paths, &err);
                return Err(err);
            }
        };

        let reply = classify_nudge_reply(model_reply.content.as_deref());

        let mut working = snapshot.history;
        working.push(ChatMessage::assistant(reply.response_text.clone()));
        if !self.sessions.commit_history(session_id, working).await {
            tracing::warn!("Session {} vanished before commit; reply still logged", session_id);
        }

        self.record_committed_turn(&snapshot.paths, None, &reply);
        Ok(reply.response_text)
    }

    /// Run model rounds until a final answer, the round cap, or a backend
    /// failure. Tool requests append the raw assistant turn plus one tool
    /// turn per requested call; tool-level failures become error payloads
    /// fed back to the model, never pipeline failures.
    async fn run_model_rounds(
        &self,
        backend: &dyn CompletionBackend,
        working: &mut Vec<ChatMessage>,
    ) -> Result<Option<String>, TurnError> {
        let tool_defs = self.tools.definitions();

        for round in 0..self.max_tool_rounds {
            let mut messages = Vec::with_capacity(working.len() + 1);
            messages.push(ChatMessage::system(self.system_context.clone()));
            messages.extend_from_slice(working);

            let reply = backend
                .complete(&messages, &tool_defs)
                .await
                .map_err(TurnError::Backend)?;

            if !reply.requests_tools() {
                tracing::debug!("Turn completed after {} model round(s)", round + 1);
                return Ok(reply.content);
            }

            tracing::debug!(
                "Model requested {} tool call(s) in round {}",
                reply.tool_calls.len(),
                round + 1
            );
            working.push(ChatMessage::assistant_tool_request(reply.tool_calls.clone()));
            for call in &reply.tool_calls {
                let payload = self
                    .tools
                    .dispatch(&call.function.name, &call.function.arguments);
                working.push(ChatMessage::tool(call.id.clone(), payload));
            }
        }

        Err(TurnError::ToolLoopExceeded(self.max_tool_rounds))
    }

    /// Step-4 commit of the durable record. Failures here are degraded
    /// mode: the conversation already holds the reply, so we report and
    /// carry on instead of failing the turn.
    fn record_committed_turn(
        &self,
        paths: &UserLogPaths,
        user_text: Option<&str>,
        reply: &ClassifiedReply,
    ) {
        if let Some(text) = user_text {
            if let Err(e) = self.log_store.append(paths, &LogEntry::user(text)) {
                self.report_store_failure(paths, "대화 로그 기록 실패", &e);
            }
        }

        let ai_entry = LogEntry::ai(reply.response_text.clone(), reply.transcript_label.clone());
        if let Err(e) = self.log_store.append(paths, &ai_entry) {
            self.report_store_failure(paths, "대화 로그 기록 실패", &e);
        }

        if let Err(e) = self.log_store.increment_counter(paths, reply.counted) {
            self.report_store_failure(paths, "스캐폴딩 카운트 기록 실패", &e);
        }
    }

    fn report_store_failure(&self, paths: &UserLogPaths, what: &str, error: &anyhow::Error) {
        tracing::error!("{}: {:#}", what, error);
        let entry = LogEntry::system_error(format!("{}: {:#}", what, error));
        if let Err(e) = self.log_store.append(paths, &entry) {
            tracing::error!("System_Error entry could not be written either: {:#}", e);
        }
    }

    fn log_turn_failure(&self, paths: &UserLogPaths, err: &TurnError) {
        let detail = match err {
            TurnError::Backend(source) => format!("API 호출 오류 발생: {:#}", source),
            TurnError::ToolLoopExceeded(max) => {
                format!("도구 호출 한도 초과 (최대 {}회)", max)
            }
            other => format!("턴 처리 실패: {}", other),
        };
        tracing::error!("{}", detail);
        if let Err(e) = self.log_store.append(paths, &LogEntry::system_error(detail)) {
            tracing::error!("Failed to write System_Error entry: {:#}", e);
        }
    }
}

/// Parse and sanitize the model's final structured answer for a regular
/// turn. Total: every input maps to a reply, a counted category, and a
/// transcript label.
pub fn classify_final_reply(content: Option<&str>) -> ClassifiedReply {
    let Some(raw) = content else {
        return parse_failure_reply();
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return parse_failure_reply();
    };

    let counted = value
        .get("scaffolding_type")
        .and_then(|v| v.as_str())
        .map(ScaffoldingType::from_label)
        .unwrap_or(ScaffoldingType::Unclassified);

    let response_text = value
        .get("response_text")
        .and_then(|v| v.as_str())
        .unwrap_or(FALLBACK_MISSING_TEXT)
        .to_string();

    ClassifiedReply {
        response_text,
        counted,
        transcript_label: counted.as_label().to_string(),
    }
}

fn parse_failure_reply() -> ClassifiedReply {
    ClassifiedReply {
        response_text: FALLBACK_PARSE_TEXT.to_string(),
        counted: ScaffoldingType::Unclassified,
        transcript_label: PARSE_FAILURE_LABEL.to_string(),
    }
}

/// Nudge replies default to `Motivational` wherever a regular turn would
/// fall back to `Unclassified`.
pub fn classify_nudge_reply(content: Option<&str>) -> ClassifiedReply {
    let mut reply = classify_final_reply(content);
    if reply.counted == ScaffoldingType::Unclassified {
        reply.counted = ScaffoldingType::Motivational;
        reply.transcript_label = ScaffoldingType::Motivational.as_label().to_string();
    }
    if reply.response_text == FALLBACK_PARSE_TEXT || reply.response_text == FALLBACK_MISSING_TEXT {
        reply.response_text = NUDGE_FALLBACK_TEXT.to_string();
    }
    reply
}
