use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use saralytics_agent::{AgentRuntime, ChatReply, ReplyOutcome};
use saralytics_core::domain::conversation::ConversationTurn;
use saralytics_core::domain::specialist::SpecialistId;
use saralytics_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{info, warn};

pub const SPECIALIST_HEADER: &str = "x-saralytics-specialist";
pub const ROUTING_FALLBACK_HEADER: &str = "x-saralytics-routing-fallback";
pub const CORRELATION_HEADER: &str = "x-saralytics-correlation-id";

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
struct AgentChatRequest {
    question: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

#[derive(Debug, Deserialize)]
struct SpecialistChatRequest {
    question: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
    agent: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    correlation_id: String,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/agent_chat/", post(agent_chat))
        .route("/api/specialist_chat/", post(specialist_chat))
        .with_state(ChatState { runtime })
}

async fn agent_chat(State(state): State<ChatState>, body: Bytes) -> Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let request: AgentChatRequest = match decode(&body) {
        Ok(request) => request,
        Err(error) => return error_response(error, correlation_id),
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let reply = state.runtime.ask(&request.question, &request.history, &cancel).await;

    match reply {
        Ok(reply) => stream_response(reply, correlation_id, guard),
        Err(error) => error_response(error.into(), correlation_id),
    }
}

async fn specialist_chat(State(state): State<ChatState>, body: Bytes) -> Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let request: SpecialistChatRequest = match decode(&body) {
        Ok(request) => request,
        Err(error) => return error_response(error, correlation_id),
    };
    let Some(specialist) = SpecialistId::from_wire(request.agent.trim()) else {
        return error_response(
            ApplicationError::InvalidRequest(format!("unknown specialist `{}`", request.agent)),
            correlation_id,
        );
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let reply =
        state.runtime.ask_specialist(&request.question, &request.history, specialist, &cancel).await;

    match reply {
        Ok(reply) => stream_response(reply, correlation_id, guard),
        Err(error) => error_response(error.into(), correlation_id),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApplicationError> {
    serde_json::from_slice(body)
        .map_err(|error| ApplicationError::InvalidRequest(format!("invalid JSON body: {error}")))
}

/// Fragments are written to the body as they arrive. A reply that never reached
/// a specialist takes its status from the setup error and carries its single
/// error fragment.
///
/// `guard` lives as long as the body: when the client disconnects the body is
/// dropped and the request's cancellation token fires.
fn stream_response(reply: ChatReply, correlation_id: String, guard: DropGuard) -> Response {
    let status = match reply.outcome {
        ReplyOutcome::Streaming => StatusCode::OK,
        ReplyOutcome::SetupFailed(error) => {
            let detail = error.to_string();
            let status = interface_status(&error.into_interface(correlation_id.as_str()));
            warn!(
                event_name = "http.chat.setup_failed",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %detail,
                "chat request could not reach a specialist"
            );
            status
        }
    };
    info!(
        event_name = "http.chat.responding",
        correlation_id = %correlation_id,
        status = status.as_u16(),
        specialist = reply.specialist.map(|id| id.as_str()).unwrap_or("none"),
        "streaming chat reply"
    );

    let body = Body::from_stream(reply.fragments.map(move |fragment| {
        let _request_scope = &guard;
        Ok::<_, Infallible>(Bytes::from(fragment.text))
    }));
    let mut response =
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response();

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        headers.insert(HeaderName::from_static(CORRELATION_HEADER), value);
    }
    if let Some(specialist) = reply.specialist {
        headers.insert(
            HeaderName::from_static(SPECIALIST_HEADER),
            HeaderValue::from_static(specialist.as_str()),
        );
    }
    if let Some(routing) = reply.routing {
        headers.insert(
            HeaderName::from_static(ROUTING_FALLBACK_HEADER),
            HeaderValue::from_static(if routing.fallback_applied { "true" } else { "false" }),
        );
    }
    response
}

fn error_response(error: ApplicationError, correlation_id: String) -> Response {
    let detail = error.to_string();
    let interface = error.into_interface(correlation_id);
    let status = interface_status(&interface);
    warn!(
        event_name = "http.chat.rejected",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %detail,
        "chat request rejected"
    );

    let message = match &interface {
        InterfaceError::BadRequest { message, .. } => message.clone(),
        other => other.user_message().to_string(),
    };
    let body = ErrorBody { error: message, correlation_id: interface.correlation_id().to_string() };
    (status, Json(body)).into_response()
}

fn interface_status(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
