//! Scripted collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use saralytics_core::data::{Row, ScalarValue, TabularDataSource};
use tokio_util::sync::CancellationToken;

use crate::llm::{
    CompletionOptions, CompletionService, FragmentStream, LlmError, StreamingCompletionService,
};

pub fn sale(item: &str, size: &str, quantity: i64, value: f64, profit: f64) -> Row {
    Row::new(vec![
        ("DOCDT".to_string(), ScalarValue::from("2024-01-15")),
        ("ITEMNAME".to_string(), ScalarValue::from(item)),
        ("ITEMSIZE".to_string(), ScalarValue::from(size)),
        ("QUANTITY".to_string(), ScalarValue::Integer(quantity)),
        ("TOTALITEMVALUE".to_string(), ScalarValue::Real(value)),
        ("MCODE".to_string(), ScalarValue::Real(profit)),
    ])
}

/// In-memory sales table. A bound text parameter filters on `ITEMNAME`.
pub struct StaticDataSource {
    rows: Vec<Row>,
    calls: Mutex<Vec<(String, Vec<ScalarValue>)>>,
}

impl StaticDataSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<(String, Vec<ScalarValue>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl TabularDataSource for StaticDataSource {
    async fn query(&self, sql: &str, params: &[ScalarValue]) -> Vec<Row> {
        self.calls.lock().expect("calls lock").push((sql.to_string(), params.to_vec()));
        match params.first().and_then(ScalarValue::as_text) {
            Some(item) => self
                .rows
                .iter()
                .filter(|row| row.get("ITEMNAME").and_then(ScalarValue::as_text) == Some(item))
                .cloned()
                .collect(),
            None => self.rows.clone(),
        }
    }

    async fn ping(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Replays canned completions in order and records every prompt.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<(String, CompletionOptions)>>,
}

impl ScriptedCompletion {
    pub fn new(responses: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses.into_iter().collect()), prompts: Mutex::default() }
    }

    pub fn replying(text: &str) -> Self {
        Self::new([Ok(text.to_string())])
    }

    pub fn prompts(&self) -> Vec<(String, CompletionOptions)> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
        _cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        self.prompts.lock().expect("prompts lock").push((prompt.to_string(), options));
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }
}

/// Streams fixed fragments, optionally ending with an error item, or refuses to
/// open at all.
#[derive(Default)]
pub struct ScriptedStream {
    fragments: Vec<String>,
    trailing_error: Option<LlmError>,
    open_error: Option<LlmError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedStream {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self { fragments: fragments.iter().map(|f| f.to_string()).collect(), ..Self::default() }
    }

    pub fn failing_after(fragments: &[&str], error: LlmError) -> Self {
        Self { trailing_error: Some(error), ..Self::fragments(fragments) }
    }

    pub fn unavailable(error: LlmError) -> Self {
        Self { open_error: Some(error), ..Self::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl StreamingCompletionService for ScriptedStream {
    async fn stream(
        &self,
        prompt: &str,
        _cancel: &CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        let items = self
            .fragments
            .iter()
            .cloned()
            .map(Ok)
            .chain(self.trailing_error.clone().map(Err))
            .collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(items)))
    }
}
