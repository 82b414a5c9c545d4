//! HTTP surface.
//!
//! Thin by intent: handlers validate, delegate to the pipeline or stores,
//! and map the closed `TurnError` set onto HTTP statuses. All conversation
//! semantics live in `pipeline.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm_client::ChatMessage;
use crate::log_store::{LogEntry, LogStore};
use crate::pipeline::{TurnError, TurnPipeline};
use crate::prompt::AssembledPrompts;
use crate::scaffolding::ScaffoldingType;
use crate::session::SessionStore;
use crate::users::UserRegistry;

/// Scripted opening line; logged with the `일반` label but never counted,
/// since no turn has been committed yet.
const GREETING: &str = "안녕, 만나서 반가워! 나는 이번 과제를 너랑 같이 고민해 볼 동료 학습자야. \
    과제 내용은 요약 페이지에서 확인했지? 준비됐으면 어디서부터 시작할지 같이 얘기해 보자!";

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<UserRegistry>,
    pub prompts: Arc<AssembledPrompts>,
    pub sessions: Arc<SessionStore>,
    pub log_store: Arc<LogStore>,
    pub pipeline: Arc<TurnPipeline>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    student_id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
    name: String,
    greeting: String,
}

#[derive(Debug, Deserialize)]
struct ConsentRequest {
    agreed: bool,
}

#[derive(Debug, Serialize)]
struct ConsentResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct BriefingResponse {
    name: String,
    situation: String,
    rules: String,
    task: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct HistoryTurn {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct TurnRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct TurnResponse {
    response: String,
}

pub async fn serve(state: AppState, bind_addr: &str) -> Result<()> {
    let addr = bind_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address '{}'", bind_addr))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind server to {}", addr))?;
    tracing::info!("peerlearn listening on http://{}", addr);
    axum::serve(listener, router(state))
        .await
        .context("Server failed")?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/:id/consent", post(record_consent))
        .route("/sessions/:id/briefing", get(get_briefing))
        .route("/sessions/:id/history", get(get_history))
        .route("/sessions/:id/turns", post(post_turn))
        .route("/sessions/:id/nudge", post(post_nudge))
        .route("/sessions/:id/export", get(export_log))
        .with_state(state);

    Router::new().nest("/v1", api)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, (StatusCode, String)> {
    let user = state
        .registry
        .authenticate(&body.student_id, &body.name)
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "등록되지 않은 사용자입니다. 학번과 이름을 확인해 주세요.".to_string(),
            )
        })?;

    let paths = state.log_store.user_paths(&user, Local::now());

    // Session-start marker and greeting go to the transcript; the greeting
    // does not touch the counters.
    let start_entry = LogEntry::system(format!("세션 시작 (학번: {})", user.student_id));
    if let Err(e) = state.log_store.append(&paths, &start_entry) {
        tracing::error!("Failed to log session start: {:#}", e);
    }
    let greeting_entry = LogEntry::ai(GREETING, ScaffoldingType::General.as_label());
    if let Err(e) = state.log_store.append(&paths, &greeting_entry) {
        tracing::error!("Failed to log greeting: {:#}", e);
    }

    let session_id = state
        .sessions
        .create(user.clone(), paths, ChatMessage::assistant(GREETING))
        .await;
    tracing::info!("Session {} created for student {}", session_id, user.student_id);

    Ok(Json(CreateSessionResponse {
        session_id,
        name: user.name,
        greeting: GREETING.to_string(),
    }))
}

async fn record_consent(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<ConsentRequest>,
) -> Result<Json<ConsentResponse>, (StatusCode, String)> {
    let snapshot = state
        .sessions
        .snapshot(session_id)
        .await
        .ok_or_else(session_unauthorized)?;

    state.sessions.record_consent(session_id, body.agreed).await;

    let note = if body.agreed {
        "연구 참여에 동의했습니다."
    } else {
        "연구 참여에 동의하지 않아 세션을 종료합니다."
    };
    if let Err(e) = state.log_store.append(&snapshot.paths, &LogEntry::system(note)) {
        tracing::error!("Failed to log consent decision: {:#}", e);
    }

    if body.agreed {
        Ok(Json(ConsentResponse { status: "ok" }))
    } else {
        state.sessions.remove(session_id).await;
        Ok(Json(ConsentResponse { status: "ended" }))
    }
}

async fn get_briefing(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BriefingResponse>, (StatusCode, String)> {
    let snapshot = state
        .sessions
        .snapshot(session_id)
        .await
        .ok_or_else(session_unauthorized)?;

    Ok(Json(BriefingResponse {
        name: snapshot.user.name,
        situation: state.prompts.situation.clone(),
        rules: state.prompts.rules.clone(),
        task: state.prompts.task.clone(),
    }))
}

async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Vec<HistoryTurn>>, (StatusCode, String)> {
    let snapshot = state
        .sessions
        .snapshot(session_id)
        .await
        .ok_or_else(session_unauthorized)?;

    Ok(Json(visible_turns(&snapshot.history)))
}

async fn post_turn(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "메시지를 입력해 주세요.".to_string(),
        ));
    }

    let response = state
        .pipeline
        .process_turn(session_id, message)
        .await
        .map_err(map_turn_error)?;
    Ok(Json(TurnResponse { response }))
}

async fn post_nudge(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    let response = state
        .pipeline
        .process_idle_nudge(session_id)
        .await
        .map_err(map_turn_error)?;
    Ok(Json(TurnResponse { response }))
}

/// Download packaging: transcript plus counter summary as one plain-text
/// attachment. The session stays alive afterwards.
async fn export_log(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<([(header::HeaderName, String); 2], String), (StatusCode, String)> {
    let snapshot = state
        .sessions
        .snapshot(session_id)
        .await
        .ok_or_else(session_unauthorized)?;

    let document = state
        .log_store
        .export_document(&snapshot.paths)
        .map_err(|e| {
            tracing::error!("Failed to assemble export document: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "대화 기록을 내보내지 못했습니다.".to_string(),
            )
        })?;

    let headers = [
        (
            header::CONTENT_TYPE,
            "text/plain; charset=utf-8".to_string(),
        ),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}_log.txt\"",
                snapshot.user.student_id
            ),
        ),
    ];
    Ok((headers, document))
}

/// Only user/assistant text turns are visible to the browser; tool plumbing
/// turns stay internal.
fn visible_turns(history: &[ChatMessage]) -> Vec<HistoryTurn> {
    history
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .filter(|m| m.content.as_deref().is_some_and(|c| !c.is_empty()))
        .map(|m| HistoryTurn {
            role: m.role.clone(),
            content: m.content_str().to_string(),
        })
        .collect()
}

fn session_unauthorized() -> (StatusCode, String) {
    (StatusCode::UNAUTHORIZED, TurnError::Session.to_string())
}

fn map_turn_error(err: TurnError) -> (StatusCode, String) {
    let status = match err {
        TurnError::Session => StatusCode::UNAUTHORIZED,
        TurnError::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        TurnError::Backend(_) | TurnError::ToolLoopExceeded(_) => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}
