use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use saralytics_agent::{AgentRuntime, ChatRequestError, ReplyOutcome};
use saralytics_core::config::{AppConfig, LoadOptions};
use saralytics_core::domain::specialist::SpecialistId;
use saralytics_db::SqliteDataSource;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::commands::{command_runtime, CommandResult};

/// Asks `question` through the manager, or straight to `agent` when given, and
/// writes answer fragments to `out` as they arrive.
pub fn run(question: &str, agent: Option<&str>, out: &mut impl Write) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let specialist = match agent {
        Some(name) => match SpecialistId::from_wire(name) {
            Some(id) => Some(id),
            None => {
                return CommandResult::failure(
                    "ask",
                    "invalid_request",
                    format!("unknown agent `{name}` (expected sales, inventory or finance)"),
                    2,
                );
            }
        },
        None => None,
    };

    let data_source =
        match SqliteDataSource::new(&config.database.url, config.database.timeout_secs) {
            Ok(source) => Arc::new(source),
            Err(error) => {
                return CommandResult::failure(
                    "ask",
                    "db_connectivity",
                    format!("invalid database url: {error}"),
                    4,
                );
            }
        };

    let runtime = match command_runtime("ask") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let agents = AgentRuntime::from_config(&config, data_source);
        let cancel = CancellationToken::new();

        let reply = match specialist {
            Some(id) => agents.ask_specialist(question, &[], id, &cancel).await,
            None => agents.ask(question, &[], &cancel).await,
        }
        .map_err(|error: ChatRequestError| ("invalid_request", error.to_string(), 2u8))?;

        let mut fragments = reply.fragments;
        let mut failure = None;
        while let Some(fragment) = fragments.next().await {
            if fragment.is_error {
                failure = Some(fragment.text);
                continue;
            }
            write!(out, "{}", fragment.text)
                .and_then(|()| out.flush())
                .map_err(|error| ("output", error.to_string(), 1u8))?;
        }
        writeln!(out).map_err(|error| ("output", error.to_string(), 1u8))?;

        match (reply.outcome, failure) {
            (ReplyOutcome::SetupFailed(_), message) => Err((
                "routing",
                message.unwrap_or_else(|| "question could not be routed".to_string()),
                7u8,
            )),
            (ReplyOutcome::Streaming, Some(message)) => Err(("specialist", message, 8u8)),
            (ReplyOutcome::Streaming, None) => {
                Ok((reply.specialist, reply.routing.is_some_and(|routing| routing.fallback_applied)))
            }
        }
    });

    match result {
        Ok((specialist, fallback_applied)) => {
            let answered_by = specialist.map(|id| id.as_str()).unwrap_or("unknown");
            CommandResult::success_with(
                "ask",
                format!("answered by the {answered_by} specialist"),
                Some(json!({
                    "specialist": answered_by,
                    "routing_fallback": fallback_applied,
                })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}
