//! Abstract text-generation capabilities used by the agents.
//!
//! The manager needs a single-shot [`CompletionService`]; specialists additionally
//! need a [`StreamingCompletionService`] whose fragments arrive lazily as the
//! model produces them.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    /// `message` followed by this error, for text shown to the caller.
    pub fn wrapped_in(&self, message: &str) -> String {
        format!("{message} Details: {self}")
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// Ask the model for machine-parseable (JSON) output.
    pub structured_output: bool,
}

impl CompletionOptions {
    pub fn structured() -> Self {
        Self { structured_output: true }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError>;
}

#[async_trait]
pub trait StreamingCompletionService: Send + Sync {
    /// Starts a generation. Connection and status failures surface here; failures
    /// after the first byte surface as an `Err` item of the returned stream.
    async fn stream(&self, prompt: &str, cancel: &CancellationToken)
        -> Result<FragmentStream, LlmError>;
}

/// Runs `call` under a time budget, abandoning it early when `cancel` fires.
pub async fn guarded<T, F>(
    service: &str,
    budget: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        outcome = tokio::time::timeout(budget, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(LlmError::ServiceUnavailable(format!(
                "{service} did not respond within {}s",
                budget.as_secs()
            ))),
        },
    }
}
