use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::{
    guarded, CompletionOptions, CompletionService, FragmentStream, LlmError,
    StreamingCompletionService,
};

const SERVICE: &str = "specialist model service";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Client for an Ollama-compatible `/api/generate` endpoint. Serves both the
/// specialist's structured decision call and its answer streams.
#[derive(Clone, Debug)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    budget: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            budget: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn send(&self, request: &GenerateRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response =
            self.client.post(self.endpoint()).json(request).send().await.map_err(|error| {
                if error.is_connect() {
                    LlmError::ServiceUnavailable(format!(
                        "could not connect to the {SERVICE} at {}",
                        self.base_url
                    ))
                } else {
                    LlmError::ServiceUnavailable(format!("{SERVICE} request failed: {error}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ServiceUnavailable(format!("{SERVICE} returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionService for OllamaClient {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.structured_output.then_some("json"),
        };

        guarded(SERVICE, self.budget, cancel, async {
            let chunk = self
                .send(&request)
                .await?
                .json::<GenerateChunk>()
                .await
                .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;
            match chunk.error {
                Some(message) => Err(LlmError::ServiceUnavailable(message)),
                None => Ok(chunk.response),
            }
        })
        .await
    }
}

#[async_trait]
impl StreamingCompletionService for OllamaClient {
    async fn stream(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        let request = GenerateRequest { model: &self.model, prompt, stream: true, format: None };
        let response = guarded(SERVICE, self.budget, cancel, self.send(&request)).await?;
        debug!(event_name = "agent.llm.stream_opened", model = %self.model, "generation stream opened");
        Ok(ndjson_fragments(Box::pin(response.bytes_stream()), self.budget))
    }
}

/// Decodes a newline-delimited JSON generation body into text fragments.
///
/// Ends after the chunk marked `done`, after the body closes, or after the first
/// error item. Each wait for the next body chunk is bounded by `idle`.
pub fn ndjson_fragments<S, B, E>(body: S, idle: Duration) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = NdjsonState { body, idle, buffer: Vec::new(), pending: VecDeque::new(), finished: false };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match tokio::time::timeout(state.idle, state.body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_complete_lines();
                }
                Ok(Some(Err(error))) => {
                    state.fail(LlmError::ServiceUnavailable(format!("{SERVICE} stream broke: {error}")));
                }
                Ok(None) => {
                    let remainder = std::mem::take(&mut state.buffer);
                    state.decode_line(&remainder);
                    state.finished = true;
                }
                Err(_) => state.fail(LlmError::ServiceUnavailable(format!(
                    "{SERVICE} stream stalled for {}s",
                    state.idle.as_secs()
                ))),
            }
        }
    }))
}

struct NdjsonState<S> {
    body: S,
    idle: Duration,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

impl<S> NdjsonState<S> {
    fn drain_complete_lines(&mut self) {
        while !self.finished {
            let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') else {
                break;
            };
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            self.decode_line(&line);
        }
    }

    fn decode_line(&mut self, line: &[u8]) {
        if self.finished || line.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        match serde_json::from_slice::<GenerateChunk>(line) {
            Ok(GenerateChunk { error: Some(message), .. }) => {
                self.fail(LlmError::ServiceUnavailable(message));
            }
            Ok(chunk) => {
                if !chunk.response.is_empty() {
                    self.pending.push_back(Ok(chunk.response));
                }
                self.finished = chunk.done;
            }
            Err(error) => self.fail(LlmError::InvalidResponse(format!("malformed stream chunk: {error}"))),
        }
    }

    fn fail(&mut self, error: LlmError) {
        self.pending.push_back(Err(error));
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use futures::{stream, StreamExt};

    use super::ndjson_fragments;
    use crate::llm::LlmError;

    async fn collect(chunks: Vec<&'static str>) -> Vec<Result<String, LlmError>> {
        let body = stream::iter(chunks.into_iter().map(|chunk| Ok::<_, Infallible>(chunk.as_bytes())));
        ndjson_fragments(body, Duration::from_secs(1)).collect().await
    }

    #[tokio::test]
    async fn fragments_follow_line_order_across_chunk_boundaries() {
        let items = collect(vec![
            "{\"response\":\"Hello\",\"done\":false}\n{\"resp",
            "onse\":\" world\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        ])
        .await;

        assert_eq!(items, vec![Ok("Hello".to_string()), Ok(" world".to_string())]);
    }

    #[tokio::test]
    async fn lines_after_done_are_ignored() {
        let items = collect(vec![
            "{\"response\":\"a\",\"done\":true}\n{\"response\":\"b\",\"done\":false}\n",
        ])
        .await;
        assert_eq!(items, vec![Ok("a".to_string())]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_decoded() {
        let items = collect(vec!["{\"response\":\"tail\"}"]).await;
        assert_eq!(items, vec![Ok("tail".to_string())]);
    }

    #[tokio::test]
    async fn error_chunk_terminates_with_error_item() {
        let items = collect(vec![
            "{\"response\":\"partial\"}\n{\"error\":\"model crashed\"}\n{\"response\":\"never\"}\n",
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("partial".to_string()));
        assert_eq!(items[1], Err(LlmError::ServiceUnavailable("model crashed".to_string())));
    }

    #[tokio::test]
    async fn malformed_line_is_an_invalid_response() {
        let items = collect(vec!["not json\n"]).await;
        assert!(matches!(items.as_slice(), [Err(LlmError::InvalidResponse(_))]));
    }

    #[tokio::test]
    async fn body_errors_surface_as_service_unavailable() {
        let body = stream::iter(vec![Ok(b"{\"response\":\"x\"}\n".to_vec()), Err("connection reset")]);
        let items: Vec<_> = ndjson_fragments(body, Duration::from_secs(1)).collect().await;

        assert_eq!(items[0], Ok("x".to_string()));
        assert!(matches!(&items[1], Err(LlmError::ServiceUnavailable(message)) if message.contains("connection reset")));
    }
}
