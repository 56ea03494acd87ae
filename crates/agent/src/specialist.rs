//! Specialist decision loop.
//!
//! Every request walks `Start → SamplingData → Deciding`, then either
//! `DirectAnswer` or `ToolDispatch`, then `Streaming` until the relay closes. A
//! failure at any step lands in `Error`, which answers with a single readable
//! error fragment naming the cause.
//!
//! The decision call is non-streaming so a tool-call payload can be intercepted
//! before anything reaches the caller. When the model does not ask for a usable
//! tool, the initial prompt is sent again as a stream.

use std::fmt;
use std::sync::Arc;

use saralytics_core::data::{DataSample, TabularDataSource, SAMPLE_ROW_LIMIT};
use saralytics_core::domain::conversation::{transcript, ConversationTurn};
use saralytics_core::domain::specialist::{SpecialistCatalog, SpecialistId, SpecialistProfile};
use saralytics_core::domain::tool::{ToolInvocationRequest, ToolResult};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::llm::{
    CompletionOptions, CompletionService, FragmentStream, LlmError, StreamingCompletionService,
};
use crate::stream::{FragmentReceiver, StreamTransport};
use crate::tools::ToolRegistry;

pub const SPECIALIST_UNAVAILABLE_MESSAGE: &str =
    "Error: Could not connect to the specialist model service. Please ensure it is running.";
pub const CANCELLED_MESSAGE: &str = "Error: The request was cancelled.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialistPhase {
    Start,
    SamplingData,
    Deciding,
    DirectAnswer,
    ToolDispatch,
    Streaming,
    Error,
}

impl fmt::Display for SpecialistPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::SamplingData => "sampling_data",
            Self::Deciding => "deciding",
            Self::DirectAnswer => "direct_answer",
            Self::ToolDispatch => "tool_dispatch",
            Self::Streaming => "streaming",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum SpecialistError {
    #[error("no profile registered for specialist `{0}`")]
    UnknownSpecialist(SpecialistId),
    #[error("decision call failed: {0}")]
    Decision(LlmError),
    #[error("generation failed to start during {phase}: {source}")]
    Generation { phase: SpecialistPhase, source: LlmError },
}

impl SpecialistError {
    /// Phase the request was in when it failed.
    pub fn phase(&self) -> SpecialistPhase {
        match self {
            Self::UnknownSpecialist(_) => SpecialistPhase::Start,
            Self::Decision(_) => SpecialistPhase::Deciding,
            Self::Generation { phase, .. } => *phase,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownSpecialist(id) => {
                format!("Error: No specialist is configured for '{id}'.")
            }
            Self::Decision(LlmError::Cancelled)
            | Self::Generation { source: LlmError::Cancelled, .. } => CANCELLED_MESSAGE.to_string(),
            Self::Decision(source) | Self::Generation { source, .. } => {
                source.wrapped_in(SPECIALIST_UNAVAILABLE_MESSAGE)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Direct,
    Tool(ToolInvocationRequest),
}

pub struct SpecialistAgent {
    catalog: Arc<SpecialistCatalog>,
    data_source: Arc<dyn TabularDataSource>,
    tools: Arc<ToolRegistry>,
    decider: Arc<dyn CompletionService>,
    generator: Arc<dyn StreamingCompletionService>,
    transport: StreamTransport,
}

impl SpecialistAgent {
    pub fn new(
        catalog: Arc<SpecialistCatalog>,
        data_source: Arc<dyn TabularDataSource>,
        tools: Arc<ToolRegistry>,
        decider: Arc<dyn CompletionService>,
        generator: Arc<dyn StreamingCompletionService>,
        transport: StreamTransport,
    ) -> Self {
        Self { catalog, data_source, tools, decider, generator, transport }
    }

    pub fn catalog(&self) -> &SpecialistCatalog {
        &self.catalog
    }

    /// Answers `question` as specialist `id`. Always returns a terminating
    /// sequence; failures become one error fragment.
    pub async fn handle(
        &self,
        question: &str,
        history: &[ConversationTurn],
        id: SpecialistId,
        cancel: &CancellationToken,
    ) -> FragmentReceiver {
        match self.open_answer_stream(question, history, id, cancel).await {
            Ok(stream) => {
                debug!(
                    event_name = "agent.specialist.phase",
                    specialist = %id,
                    phase = %SpecialistPhase::Streaming,
                    "streaming answer"
                );
                self.transport.relay(stream, SPECIALIST_UNAVAILABLE_MESSAGE, cancel.clone())
            }
            Err(failure) => {
                error!(
                    event_name = "agent.specialist.failed",
                    specialist = %id,
                    phase = %SpecialistPhase::Error,
                    failed_during = %failure.phase(),
                    error = %failure,
                    "specialist request failed"
                );
                self.transport.failure(failure.user_message())
            }
        }
    }

    async fn open_answer_stream(
        &self,
        question: &str,
        history: &[ConversationTurn],
        id: SpecialistId,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream, SpecialistError> {
        let profile = self.catalog.get(id).ok_or(SpecialistError::UnknownSpecialist(id))?;

        let rows = self.data_source.query(&profile.data_query, &[]).await;
        let sample = DataSample::draw(rows, SAMPLE_ROW_LIMIT);
        debug!(
            event_name = "agent.specialist.phase",
            specialist = %id,
            phase = %SpecialistPhase::SamplingData,
            sampled_rows = sample.rows().len(),
            "data sample drawn"
        );

        let prompt = initial_prompt(profile, history, &sample, question);
        let raw_decision = self
            .decider
            .complete(&prompt, CompletionOptions::structured(), cancel)
            .await
            .map_err(SpecialistError::Decision)?;

        match self.decide(profile, &raw_decision) {
            Decision::Tool(request) => {
                info!(
                    event_name = "agent.specialist.phase",
                    specialist = %id,
                    phase = %SpecialistPhase::ToolDispatch,
                    tool_name = %request.tool_name,
                    "dispatching tool call"
                );
                let result = self.tools.invoke(&request.tool_name, &request.parameters).await;
                let synthesis = synthesis_prompt(profile, question, &result);
                self.generator.stream(&synthesis, cancel).await.map_err(|source| {
                    SpecialistError::Generation { phase: SpecialistPhase::ToolDispatch, source }
                })
            }
            Decision::Direct => {
                debug!(
                    event_name = "agent.specialist.phase",
                    specialist = %id,
                    phase = %SpecialistPhase::DirectAnswer,
                    "answering directly"
                );
                self.generator.stream(&prompt, cancel).await.map_err(|source| {
                    SpecialistError::Generation { phase: SpecialistPhase::DirectAnswer, source }
                })
            }
        }
    }

    /// Interprets the decision response. Anything other than an allowed,
    /// registered, fully-parameterised tool call is a direct answer.
    pub fn decide(&self, profile: &SpecialistProfile, raw: &str) -> Decision {
        let Some(request) = ToolInvocationRequest::parse(raw) else {
            return Decision::Direct;
        };

        if profile.allows_tool(&request.tool_name) && self.tools.accepts(&request) {
            Decision::Tool(request)
        } else {
            info!(
                event_name = "agent.specialist.tool_rejected",
                specialist = %profile.id,
                tool_name = %request.tool_name,
                "tool call not permitted for specialist; answering directly"
            );
            Decision::Direct
        }
    }
}

pub fn initial_prompt(
    profile: &SpecialistProfile,
    history: &[ConversationTurn],
    sample: &DataSample,
    question: &str,
) -> String {
    let history_block = if history.is_empty() {
        "(no previous conversation)".to_string()
    } else {
        transcript(history)
    };
    let instruction = if profile.allowed_tools.is_empty() {
        "Answer the user's question using the data sample and the conversation history."
    } else {
        "Answer the user's question using the data sample and the conversation history. \
If one of your tools can answer it exactly, respond with ONLY the JSON tool call and nothing else."
    };

    format!(
        "{persona}\n\n\
CONVERSATION HISTORY:\n{history_block}\n\n\
DATA SAMPLE ({rows} rows):\n{table}\n\n\
INSTRUCTIONS:\n{instruction}\n\n\
USER QUESTION: {question}",
        persona = profile.persona,
        rows = sample.rows().len(),
        table = sample.to_markdown(),
    )
}

pub fn synthesis_prompt(profile: &SpecialistProfile, question: &str, result: &ToolResult) -> String {
    let rendered =
        serde_json::to_string_pretty(result).unwrap_or_else(|_| format!("{result:?}"));

    format!(
        "{persona}\n\n\
The user asked: \"{question}\"\n\n\
Your tool `{tool}` returned:\n{rendered}\n\n\
INSTRUCTIONS:\nWrite the final answer for the user from this result. Quote figures exactly \
as given, preferring the `formatted` values. If the tool reported no data or an error, say so \
plainly. Do not mention tools or JSON.",
        persona = profile.persona,
        tool = result.tool_name,
    )
}
