use std::sync::Arc;

use saralytics_core::domain::conversation::ConversationTurn;
use saralytics_core::domain::specialist::SpecialistId;
use saralytics_core::errors::ApplicationError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::llm::{CompletionOptions, CompletionService, LlmError};

pub const MANAGER_NOT_CONFIGURED_MESSAGE: &str =
    "Error: The Manager Agent is not configured on the server.";
pub const MANAGER_UNAVAILABLE_MESSAGE: &str =
    "Error: The Manager Agent could not reach its model service.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub specialist: SpecialistId,
    /// Set when the model's answer was not a known specialist and the default
    /// was used instead.
    pub fallback_applied: bool,
    pub raw_choice: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("question must not be empty")]
    EmptyQuestion,
    #[error("manager classifier is not configured")]
    NotConfigured,
    #[error("manager classifier failed: {0}")]
    Upstream(LlmError),
}

impl RoutingError {
    pub fn user_message(&self) -> String {
        match self {
            Self::EmptyQuestion => "Error: Please enter a question.".to_string(),
            Self::NotConfigured => MANAGER_NOT_CONFIGURED_MESSAGE.to_string(),
            Self::Upstream(source) => source.wrapped_in(MANAGER_UNAVAILABLE_MESSAGE),
        }
    }
}

impl From<RoutingError> for ApplicationError {
    fn from(value: RoutingError) -> Self {
        match value {
            RoutingError::EmptyQuestion => Self::InvalidRequest(value.to_string()),
            RoutingError::NotConfigured => Self::Configuration(value.to_string()),
            RoutingError::Upstream(_) => Self::Upstream(value.to_string()),
        }
    }
}

/// Intent classifier that picks one specialist per question.
///
/// Without a classifier the manager is *disabled*: every routing attempt fails
/// with [`RoutingError::NotConfigured`] instead of erroring somewhere deeper.
pub struct ManagerAgent {
    classifier: Option<Arc<dyn CompletionService>>,
}

impl ManagerAgent {
    pub fn new(classifier: Arc<dyn CompletionService>) -> Self {
        Self { classifier: Some(classifier) }
    }

    pub fn disabled() -> Self {
        Self { classifier: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn route(
        &self,
        question: &str,
        history: &[ConversationTurn],
        cancel: &CancellationToken,
    ) -> Result<RoutingDecision, RoutingError> {
        if question.trim().is_empty() {
            return Err(RoutingError::EmptyQuestion);
        }
        let classifier = self.classifier.as_ref().ok_or(RoutingError::NotConfigured)?;

        let prompt = classification_prompt(question, history);
        let raw_choice = classifier
            .complete(&prompt, CompletionOptions::default(), cancel)
            .await
            .map_err(RoutingError::Upstream)?;

        let decision = resolve_choice(&raw_choice);
        if decision.fallback_applied {
            warn!(
                event_name = "agent.manager.routing_fallback",
                raw_choice = %decision.raw_choice,
                specialist = %decision.specialist,
                "classifier returned an unknown specialist; using default"
            );
        } else {
            info!(
                event_name = "agent.manager.routed",
                specialist = %decision.specialist,
                "question routed"
            );
        }
        Ok(decision)
    }
}

pub fn classification_prompt(question: &str, history: &[ConversationTurn]) -> String {
    let history_json = serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string());
    let choices = SpecialistId::ALL.map(|id| id.as_str()).join(", ");

    format!(
        "You are a manager agent for a business analytics assistant. Route the user's question \
to the right specialist.\n\n\
- sales: revenue, sales trends, best-selling items, performance over time.\n\
- inventory: stock movement, product sizes, unit quantities.\n\
- finance: profit, margins, costs, financial summaries.\n\n\
Use the conversation history to resolve follow-up questions.\n\n\
CONVERSATION HISTORY: {history_json}\n\n\
USER QUESTION: \"{question}\"\n\n\
Respond with exactly one of {{{choices}}} and nothing else."
    )
}

/// Trims, lowercases and strips quote characters.
pub fn normalize_choice(raw: &str) -> String {
    raw.trim().to_lowercase().chars().filter(|c| !matches!(c, '"' | '\'' | '`')).collect()
}

pub fn resolve_choice(raw: &str) -> RoutingDecision {
    let normalized = normalize_choice(raw);
    match SpecialistId::from_wire(normalized.trim()) {
        Some(specialist) => {
            RoutingDecision { specialist, fallback_applied: false, raw_choice: raw.to_string() }
        }
        None => RoutingDecision {
            specialist: SpecialistId::FALLBACK,
            fallback_applied: true,
            raw_choice: raw.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use saralytics_core::domain::conversation::ConversationTurn;
    use saralytics_core::domain::specialist::SpecialistId;
    use saralytics_core::errors::ApplicationError;
    use tokio_util::sync::CancellationToken;

    use super::{classification_prompt, normalize_choice, resolve_choice, ManagerAgent, RoutingError};
    use crate::llm::LlmError;
    use crate::testing::ScriptedCompletion;

    #[tokio::test]
    async fn blank_questions_are_rejected_before_classification() {
        let classifier = Arc::new(ScriptedCompletion::replying("finance"));
        let manager = ManagerAgent::new(classifier.clone());

        for question in ["", "   ", "\n\t"] {
            let outcome = manager.route(question, &[], &CancellationToken::new()).await;
            assert_eq!(outcome, Err(RoutingError::EmptyQuestion));
        }
        assert!(classifier.prompts().is_empty());
    }

    #[tokio::test]
    async fn known_choices_route_regardless_of_case_and_quotes() {
        for (raw, expected) in [
            ("finance", SpecialistId::Finance),
            ("  Inventory\n", SpecialistId::Inventory),
            ("\"SALES\"", SpecialistId::Sales),
            ("'finance'", SpecialistId::Finance),
        ] {
            let manager = ManagerAgent::new(Arc::new(ScriptedCompletion::replying(raw)));
            let decision = manager
                .route("What is the total profit for ItemX?", &[], &CancellationToken::new())
                .await
                .expect("routing should succeed");
            assert_eq!(decision.specialist, expected, "raw choice {raw:?}");
            assert!(!decision.fallback_applied);
        }
    }

    #[tokio::test]
    async fn unknown_choices_fall_back_to_sales() {
        for raw in ["marketing", "", "finance or sales", "I think finance"] {
            let manager = ManagerAgent::new(Arc::new(ScriptedCompletion::replying(raw)));
            let decision =
                manager.route("Hello?", &[], &CancellationToken::new()).await.expect("routing");
            assert_eq!(decision.specialist, SpecialistId::Sales);
            assert!(decision.fallback_applied);
            assert_eq!(decision.raw_choice, raw);
        }
    }

    #[tokio::test]
    async fn classifier_failure_is_surfaced() {
        let manager = ManagerAgent::new(Arc::new(ScriptedCompletion::new([Err(
            LlmError::ServiceUnavailable("timeout".to_string()),
        )])));
        let outcome = manager.route("Sales?", &[], &CancellationToken::new()).await;

        let error = outcome.expect_err("upstream failure must not fall back");
        assert!(matches!(error, RoutingError::Upstream(_)));
        assert_eq!(
            error.user_message(),
            "Error: The Manager Agent could not reach its model service. Details: service unavailable: timeout"
        );
        assert!(matches!(ApplicationError::from(error), ApplicationError::Upstream(_)));
    }

    #[tokio::test]
    async fn disabled_manager_reports_configuration_state() {
        let manager = ManagerAgent::disabled();
        assert!(!manager.is_enabled());

        let error = manager.route("Sales?", &[], &CancellationToken::new()).await.expect_err("disabled");
        assert_eq!(error, RoutingError::NotConfigured);
        assert_eq!(error.user_message(), "Error: The Manager Agent is not configured on the server.");
    }

    #[tokio::test]
    async fn prompt_carries_history_question_and_choices() {
        let classifier = Arc::new(ScriptedCompletion::replying("finance"));
        let manager = ManagerAgent::new(classifier.clone());
        let history = vec![ConversationTurn::user("Profit for ItemX?"), ConversationTurn::assistant("20%")];

        manager.route("And for ItemY?", &history, &CancellationToken::new()).await.expect("routing");

        let (prompt, options) = classifier.prompts().remove(0);
        assert!(!options.structured_output);
        assert_eq!(prompt, classification_prompt("And for ItemY?", &history));
        assert!(prompt.contains(r#"[{"role":"user","content":"Profit for ItemX?"},{"role":"assistant","content":"20%"}]"#));
        assert!(prompt.contains("{sales, inventory, finance}"));
    }

    #[test]
    fn normalization_strips_quotes_and_case() {
        assert_eq!(normalize_choice("  `Finance`  "), "finance");
        assert!(resolve_choice("INVENTORY").specialist == SpecialistId::Inventory);
    }
}
