use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::llm::{guarded, CompletionOptions, CompletionService, LlmError};

const SERVICE: &str = "manager model service";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Single-shot client for a Gemini `generateContent` endpoint, used for intent
/// classification.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    budget: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            budget: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, prompt: &str, options: CompletionOptions) -> Result<String, LlmError> {
        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts: vec![Part { text: prompt }] }],
            generation_config: options
                .structured_output
                .then_some(GenerationConfig { response_mime_type: "application/json" }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_connect() {
                    LlmError::ServiceUnavailable(format!("could not connect to the {SERVICE}"))
                } else {
                    LlmError::ServiceUnavailable(format!("{SERVICE} request failed: {error}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::ServiceUnavailable(format!("{SERVICE} returned {status}: {body}")));
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|error| LlmError::InvalidResponse(error.to_string()))?;
        candidate_text(payload)
    }
}

fn candidate_text(payload: GenerateContentResponse) -> Result<String, LlmError> {
    payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().map(|part| part.text).collect::<String>())
        .ok_or_else(|| LlmError::InvalidResponse(format!("{SERVICE} returned no candidates")))
}

#[async_trait]
impl CompletionService for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        options: CompletionOptions,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        guarded(SERVICE, self.budget, cancel, self.generate(prompt, options)).await
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{candidate_text, GeminiClient, GenerateContentResponse};
    use crate::llm::LlmError;

    #[test]
    fn candidate_parts_are_concatenated() {
        let payload: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"fin"},{"text":"ance"}]}}]}"#,
        )
        .expect("payload");
        assert_eq!(candidate_text(payload), Ok("finance".to_string()));
    }

    #[test]
    fn empty_candidates_are_invalid() {
        let payload: GenerateContentResponse = serde_json::from_str("{}").expect("payload");
        assert!(matches!(candidate_text(payload), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let client = GeminiClient::new(
            "https://example.invalid/",
            "gemini-2.5-flash",
            SecretString::from("top-secret".to_string()),
            30,
        );
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("top-secret"));
        assert_eq!(
            client.endpoint(),
            "https://example.invalid/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
